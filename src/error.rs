use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::ResType;

/// Coarse classification of a failure, retrievable from any handle after a
/// failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    CreateFailed,
    InvalidFormat,
    NotPresent,
    ShortTransfer,
    IoFailure,
    InvalidState,
    PermissionDenied,
}

/// The primary error type for all operations in the `dualfork` crate.
#[derive(Debug, Error)]
pub enum FileError {
    /// The identity does not resolve to an existing file or directory.
    #[error("'{}' does not exist", path.display())]
    NotFound { path: PathBuf },

    /// Creation was requested on an occupied identity.
    #[error("'{}' already exists", path.display())]
    AlreadyExists { path: PathBuf },

    /// Opening for write could not create the file.
    #[error("cannot create '{}': {source}", path.display())]
    CreateFailed { path: PathBuf, source: io::Error },

    /// Bytes are present but are not a parseable resource container.
    #[error("invalid resource container: {0}")]
    InvalidFormat(String),

    /// The resource directory is valid but holds no such entry.
    #[error("resource '{kind}' #{id} not present")]
    NotPresent { kind: ResType, id: i16 },

    /// Fewer bytes were transferred than requested.
    #[error("short transfer: {transferred} of {requested} bytes")]
    ShortTransfer { requested: usize, transferred: usize },

    /// An I/O error occurred, with the path where it happened when known.
    #[error("I/O error on path '{}': {source}", path.display())]
    Io { source: io::Error, path: PathBuf },

    /// Operation on a closed handle, an unloaded resource or an unbound identity.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("permission denied on '{}'", path.display())]
    PermissionDenied { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, FileError>;

impl FileError {
    /// Normalises a platform error into the taxonomy.
    pub fn from_io(source: io::Error, path: &Path) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => FileError::NotFound { path },
            io::ErrorKind::AlreadyExists => FileError::AlreadyExists { path },
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied { path },
            _ => FileError::Io { source, path },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FileError::NotFound { .. } => ErrorCode::NotFound,
            FileError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            FileError::CreateFailed { .. } => ErrorCode::CreateFailed,
            FileError::InvalidFormat(_) => ErrorCode::InvalidFormat,
            FileError::NotPresent { .. } => ErrorCode::NotPresent,
            FileError::ShortTransfer { .. } => ErrorCode::ShortTransfer,
            FileError::Io { .. } => ErrorCode::IoFailure,
            FileError::InvalidState(_) => ErrorCode::InvalidState,
            FileError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
        }
    }

    /// The platform errno behind this failure, for diagnostics.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            FileError::Io { source, .. } | FileError::CreateFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<io::Error> for FileError {
    fn from(err: io::Error) -> Self {
        FileError::from_io(err, Path::new(""))
    }
}

/// Sticky record of the last failure seen by a handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastError {
    code: Option<ErrorCode>,
    os_code: Option<i32>,
}

impl LastError {
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    pub fn os_code(&self) -> Option<i32> {
        self.os_code
    }

    pub(crate) fn clear(&mut self) {
        *self = LastError::default();
    }

    /// Records the outcome of an operation and hands it back unchanged.
    pub(crate) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.clear(),
            Err(e) => {
                self.code = Some(e.code());
                self.os_code = e.os_code();
            }
        }
        result
    }
}
