//! # Opened Files
//!
//! [`OpenedFile`] owns one raw byte stream and moves exact byte counts in and
//! out of it. Positions are logical: when the handle has been narrowed to a
//! fork window (a resource fork embedded in an AppleSingle or MacBinary file)
//! every offset is relative to the start of that fork and the reported length
//! is the fork's length.
//!
//! Extending a file with [`OpenedFile::set_len`] zero-fills on every platform
//! backed by `std::fs::File`; other [`RawFile`] implementations define their
//! own extension contents.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{FileError, LastError, Result};

/// The platform primitive underneath an [`OpenedFile`].
pub trait RawFile: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Pushes written data down to the device.
    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl RawFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl RawFile for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// Byte range of a fork inside its container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkWindow {
    pub offset: u64,
    pub length: u64,
}

/// A live handle over one byte stream; closed automatically on drop.
pub struct OpenedFile {
    raw: Option<Box<dyn RawFile>>,
    fork: Option<ForkWindow>,
    origin: PathBuf,
    last_error: LastError,
}

impl Default for OpenedFile {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OpenedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedFile")
            .field("open", &self.raw.is_some())
            .field("fork", &self.fork)
            .field("origin", &self.origin)
            .finish()
    }
}

impl OpenedFile {
    /// A closed handle.
    pub fn new() -> Self {
        Self { raw: None, fork: None, origin: PathBuf::new(), last_error: LastError::default() }
    }

    /// Wraps an already-open primitive. `origin` is only used in diagnostics.
    pub fn from_raw(raw: Box<dyn RawFile>, origin: impl Into<PathBuf>) -> Self {
        Self { raw: Some(raw), fork: None, origin: origin.into(), last_error: LastError::default() }
    }

    pub fn from_file(file: File, origin: &Path) -> Self {
        Self::from_raw(Box::new(file), origin)
    }

    /// An in-memory stream, handy for synthesized containers.
    pub fn in_memory(bytes: Vec<u8>) -> Self {
        Self::from_raw(Box::new(Cursor::new(bytes)), "<memory>")
    }

    pub fn is_open(&self) -> bool {
        self.raw.is_some()
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn last_error(&self) -> LastError {
        self.last_error
    }

    pub fn fork_window(&self) -> Option<ForkWindow> {
        self.fork
    }

    /// Narrows the handle to one fork. Subsequent positions are relative to
    /// `window.offset`, and the cursor is moved to the fork's start.
    pub(crate) fn set_fork_window(&mut self, window: Option<ForkWindow>) -> Result<()> {
        self.fork = window;
        self.set_position(0)
    }

    /// Releases the descriptor. Always leaves the handle closed, even when the
    /// final flush reports an error.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut raw) = self.raw.take() else {
            return Ok(());
        };
        self.fork = None;
        debug!(path = %self.origin.display(), "closing file");
        let result = raw.flush().map_err(|e| {
            warn!(path = %self.origin.display(), error = %e, "flush failed while closing");
            FileError::from_io(e, &self.origin)
        });
        self.last_error.track(result)
    }

    pub fn position(&mut self) -> Result<u64> {
        let result = self.position_inner();
        self.last_error.track(result)
    }

    fn position_inner(&mut self) -> Result<u64> {
        let bias = self.fork.map_or(0, |w| w.offset);
        let raw = self.raw.as_mut().ok_or(FileError::InvalidState("file is closed"))?;
        let pos = raw.stream_position().map_err(|e| FileError::from_io(e, &self.origin))?;
        Ok(pos.saturating_sub(bias))
    }

    pub fn set_position(&mut self, position: u64) -> Result<()> {
        let bias = self.fork.map_or(0, |w| w.offset);
        let result = match (self.raw.as_mut(), bias.checked_add(position)) {
            (None, _) => Err(FileError::InvalidState("file is closed")),
            (Some(_), None) => Err(FileError::from_io(
                io::Error::new(io::ErrorKind::InvalidInput, "position past the end of the address space"),
                &self.origin,
            )),
            (Some(raw), Some(absolute)) => raw
                .seek(SeekFrom::Start(absolute))
                .map(|_| ())
                .map_err(|e| FileError::from_io(e, &self.origin)),
        };
        self.last_error.track(result)
    }

    /// Logical length: the fork's length when windowed, else the stream's.
    pub fn len(&mut self) -> Result<u64> {
        let result = self.len_inner();
        self.last_error.track(result)
    }

    fn len_inner(&mut self) -> Result<u64> {
        let raw = self.raw.as_mut().ok_or(FileError::InvalidState("file is closed"))?;
        if let Some(window) = self.fork {
            return Ok(window.length);
        }
        let io_err = |e| FileError::from_io(e, &self.origin);
        let here = raw.stream_position().map_err(io_err)?;
        let end = raw.seek(SeekFrom::End(0)).map_err(io_err)?;
        raw.seek(SeekFrom::Start(here)).map_err(io_err)?;
        Ok(end)
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        self.len().map(|l| l == 0)
    }

    /// Truncates or extends the stream. Fork windows have a fixed size.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        let result = match (self.raw.as_mut(), self.fork) {
            (None, _) => Err(FileError::InvalidState("file is closed")),
            (Some(_), Some(_)) => Err(FileError::InvalidState("fork windows cannot be resized")),
            (Some(raw), None) => raw.set_len(len).map_err(|e| FileError::from_io(e, &self.origin)),
        };
        self.last_error.track(result)
    }

    /// Fills `buf` completely or fails. After a short read the position is
    /// wherever the primitive left it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.read_inner(buf);
        self.last_error.track(result)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<()> {
        let limit = self.remaining_in_fork(buf.len())?;
        let raw = self.raw.as_mut().ok_or(FileError::InvalidState("file is closed"))?;
        let mut done = 0;
        while done < limit {
            match raw.read(&mut buf[done..limit]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileError::from_io(e, &self.origin)),
            }
        }
        if done < buf.len() {
            return Err(FileError::ShortTransfer { requested: buf.len(), transferred: done });
        }
        Ok(())
    }

    /// Writes all of `buf` or fails.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let result = self.write_inner(buf);
        self.last_error.track(result)
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<()> {
        let limit = self.remaining_in_fork(buf.len())?;
        let raw = self.raw.as_mut().ok_or(FileError::InvalidState("file is closed"))?;
        let mut done = 0;
        while done < limit {
            match raw.write(&buf[done..limit]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileError::from_io(e, &self.origin)),
            }
        }
        if done < buf.len() {
            return Err(FileError::ShortTransfer { requested: buf.len(), transferred: done });
        }
        Ok(())
    }

    /// Flushes and syncs written data to the device.
    pub fn sync(&mut self) -> Result<()> {
        let result = match self.raw.as_mut() {
            None => Err(FileError::InvalidState("file is closed")),
            Some(raw) => raw
                .flush()
                .and_then(|_| raw.sync())
                .map_err(|e| FileError::from_io(e, &self.origin)),
        };
        self.last_error.track(result)
    }

    /// Reads the whole logical stream from the start.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        let len = usize::try_from(len).map_err(|_| FileError::InvalidState("stream too large for memory"))?;
        self.set_position(0)?;
        let mut buf = vec![0u8; len];
        self.read(&mut buf)?;
        Ok(buf)
    }

    /// How many of `wanted` bytes fit before the end of the fork window.
    fn remaining_in_fork(&mut self, wanted: usize) -> Result<usize> {
        let Some(window) = self.fork else {
            return Ok(wanted);
        };
        let pos = self.position_inner()?;
        let left = window.length.saturating_sub(pos);
        Ok(wanted.min(usize::try_from(left).unwrap_or(usize::MAX)))
    }
}

impl Drop for OpenedFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;

    /// Accepts `budget` bytes, then reports zero-length writes.
    pub(crate) struct ShortWriter<W> {
        pub inner: W,
        pub budget: usize,
    }

    impl<W: Write> Write for ShortWriter<W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.budget);
            let n = self.inner.write(&buf[..n])?;
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl<W: Read> Read for ShortWriter<W> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<W: Seek> Seek for ShortWriter<W> {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl<W: RawFile> RawFile for ShortWriter<W> {
        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.inner.set_len(len)
        }
    }

    #[test]
    fn read_write_exact_counts() {
        let mut f = OpenedFile::in_memory(Vec::new());
        f.write(b"hello world").unwrap();
        assert_eq!(f.position().unwrap(), 11);
        assert_eq!(f.len().unwrap(), 11);
        f.set_position(6).unwrap();
        let mut buf = [0u8; 5];
        f.read(&mut buf).unwrap();
        assert_eq!(&buf, b"world");
    }

    #[test]
    fn short_read_is_reported() {
        let mut f = OpenedFile::in_memory(b"abc".to_vec());
        let mut buf = [0u8; 8];
        let err = f.read(&mut buf).unwrap_err();
        assert!(matches!(err, FileError::ShortTransfer { requested: 8, transferred: 3 }));
        assert_eq!(f.last_error().code(), Some(ErrorCode::ShortTransfer));
        assert_eq!(f.position().unwrap(), 3);
    }

    #[test]
    fn short_write_is_reported() {
        let raw = ShortWriter { inner: Cursor::new(Vec::new()), budget: 4 };
        let mut f = OpenedFile::from_raw(Box::new(raw), "short");
        let err = f.write(b"0123456789").unwrap_err();
        assert!(matches!(err, FileError::ShortTransfer { requested: 10, transferred: 4 }));
    }

    #[test]
    fn fork_window_biases_offsets() {
        let mut f = OpenedFile::in_memory(b"HEADERforkdataTRAILER".to_vec());
        f.set_fork_window(Some(ForkWindow { offset: 6, length: 8 })).unwrap();
        assert_eq!(f.position().unwrap(), 0);
        assert_eq!(f.len().unwrap(), 8);
        let mut buf = [0u8; 4];
        f.set_position(4).unwrap();
        f.read(&mut buf).unwrap();
        assert_eq!(&buf, b"data");
        // reads never run past the fork's end
        f.set_position(6).unwrap();
        assert!(matches!(f.read(&mut buf), Err(FileError::ShortTransfer { transferred: 2, .. })));
        assert!(f.set_len(2).is_err());
    }

    #[test]
    fn huge_position_in_fork_is_an_error() {
        let mut f = OpenedFile::in_memory(b"HEADERforkdataTRAILER".to_vec());
        f.set_fork_window(Some(ForkWindow { offset: 6, length: 8 })).unwrap();
        let err = f.set_position(u64::MAX).unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
        assert_eq!(f.last_error().code(), Some(ErrorCode::IoFailure));
        // the cursor did not move
        assert_eq!(f.position().unwrap(), 0);
    }

    #[test]
    fn close_is_idempotent_and_invalidates() {
        let mut f = OpenedFile::in_memory(vec![1, 2, 3]);
        f.close().unwrap();
        f.close().unwrap();
        assert!(!f.is_open());
        assert!(matches!(f.position(), Err(FileError::InvalidState(_))));
        assert_eq!(f.last_error().code(), Some(ErrorCode::InvalidState));
    }

    #[test]
    fn set_len_extends_with_zeros() {
        let mut f = OpenedFile::in_memory(b"ab".to_vec());
        f.set_len(4).unwrap();
        assert_eq!(f.read_all().unwrap(), vec![b'a', b'b', 0, 0]);
        f.set_len(1).unwrap();
        assert_eq!(f.read_all().unwrap(), b"a");
    }
}
