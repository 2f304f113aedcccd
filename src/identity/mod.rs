//! # File and Directory Identities
//!
//! An identity names a location that may or may not exist yet. Two
//! representations exist:
//!
//! - [`path`]: a canonical path string, with `/` as the only separator.
//! - [`triplet`]: a volume reference, a parent directory id and a leaf name.
//!
//! The crate root exports exactly one of them as `FileSpecifier` (the
//! `triplet` cargo feature selects the second). Everything an identity can do
//! once it names a concrete file lives in the [`Location`] trait, implemented
//! once on top of [`Location::native_path`].

pub mod path;
pub mod triplet;

use std::cmp::Ordering;
use std::fs::{self, File, OpenOptions, Permissions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::codec::{looks_like_resource_container, ResourceBuilder};
use crate::dialog::{DialogOutcome, DialogRequest, FileChooser};
use crate::error::{FileError, Result};
use crate::fsx;
use crate::opened_file::{OpenedFile, RawFile};
use crate::resource_file::OpenedResourceFile;

const COPY_CHUNK: usize = 64 * 1024;

/// Classification of an application file.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Map,
    SavedGame,
    Recording,
    Physics,
    Shapes,
    Sounds,
    Images,
    Music,
    Preferences,
    Patch,
    ResourceContainer,
}

impl FileKind {
    pub const ALL: [FileKind; 11] = [
        FileKind::Map,
        FileKind::SavedGame,
        FileKind::Recording,
        FileKind::Physics,
        FileKind::Shapes,
        FileKind::Sounds,
        FileKind::Images,
        FileKind::Music,
        FileKind::Preferences,
        FileKind::Patch,
        FileKind::ResourceContainer,
    ];

    /// Recognised extensions; the first one is used when a suffix is added.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Map => &["map", "sceA"],
            FileKind::SavedGame => &["sav", "sgaA"],
            FileKind::Recording => &["rec", "filA"],
            FileKind::Physics => &["phy", "phyA"],
            FileKind::Shapes => &["shp", "shpA"],
            FileKind::Sounds => &["snd", "sndA"],
            FileKind::Images => &["img", "imgA"],
            FileKind::Music => &["mus"],
            FileKind::Preferences => &["prefs"],
            FileKind::Patch => &["patch", "ShPa"],
            FileKind::ResourceContainer => &["rsrc", "pack"],
        }
    }

    pub fn suffix(self) -> &'static str {
        self.extensions()[0]
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Extension first, then "does it hold a resource fork". `None` when
    /// neither says anything.
    pub fn classify(path: &Path) -> Option<Self> {
        if let Some(kind) = path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension) {
            return Some(kind);
        }
        if !path.is_file() {
            return None;
        }
        let file = File::open(path).ok()?;
        let mut opened = OpenedFile::from_file(file, path);
        looks_like_resource_container(&mut opened).then_some(FileKind::ResourceContainer)
    }
}

/// One entry returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    /// Only meaningful for files.
    pub size: u64,
    pub is_directory: bool,
    /// Volumes also have `is_directory` set.
    pub is_volume: bool,
}

impl Ord for DirEntry {
    // directories before files, then by name
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .is_directory
            .cmp(&self.is_directory)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.is_volume.cmp(&other.is_volume))
    }
}

impl PartialOrd for DirEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(crate) fn read_dir_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| FileError::from_io(e, dir))? {
        let entry = entry.map_err(|e| FileError::from_io(e, dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata().map_err(|e| FileError::from_io(e, &entry.path()))?;
        let is_directory = meta.is_dir();
        entries.push(DirEntry { name, size: if is_directory { 0 } else { meta.len() }, is_directory, is_volume: false });
    }
    entries.sort();
    Ok(entries)
}

/// Writes a new version of `dest` through a temporary sibling and renames it
/// into place only once `fill` has succeeded and every byte is synced. On any
/// failure the temporary file is removed and `dest` is untouched. `wrap`
/// supplies the primitive the new contents are written through.
pub(crate) fn replace_through<W, F>(dest: &Path, permissions: Option<Permissions>, wrap: W, fill: F) -> Result<()>
where
    W: FnOnce(File) -> Box<dyn RawFile>,
    F: FnOnce(&mut OpenedFile) -> Result<()>,
{
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let (file, temp_path) = NamedTempFile::new_in(&dir).map_err(|e| FileError::from_io(e, &dir))?.into_parts();
    let mut output = OpenedFile::from_raw(wrap(file), temp_path.to_path_buf());
    fill(&mut output)?;
    output.sync()?;
    output.close()?;

    if let Some(permissions) = permissions {
        fs::set_permissions(&temp_path, permissions).map_err(|e| FileError::from_io(e, &temp_path))?;
    }
    temp_path.persist(dest).map_err(|e| FileError::from_io(e.error, dest))?;
    Ok(())
}

/// Copies `src` over `dest` with [`replace_through`].
pub(crate) fn copy_file_through<F>(src: &Path, dest: &Path, wrap: F) -> Result<()>
where
    F: FnOnce(File) -> Box<dyn RawFile>,
{
    let source = File::open(src).map_err(|e| FileError::from_io(e, src))?;
    let permissions = source.metadata().map_err(|e| FileError::from_io(e, src))?.permissions();
    let mut input = OpenedFile::from_file(source, src);

    replace_through(dest, Some(permissions), wrap, |output| {
        let mut left = input.len()?;
        let mut buf = vec![0u8; COPY_CHUNK];
        while left > 0 {
            let n = left.min(COPY_CHUNK as u64) as usize;
            input.read(&mut buf[..n])?;
            output.write(&buf[..n])?;
            left -= n as u64;
        }
        Ok(())
    })?;
    debug!(from = %src.display(), to = %dest.display(), "copied file contents");
    Ok(())
}

/// Operations shared by both identity representations.
pub trait Location: Sized {
    /// The native path this identity currently names. Fails with
    /// `InvalidState` when the identity is unbound.
    fn native_path(&self) -> Result<PathBuf>;

    /// Rebinds the identity to `path` (used when a chooser hands one back).
    fn bind_native(&mut self, path: &Path) -> Result<()>;

    fn exists(&self) -> bool {
        self.native_path().is_ok_and(|p| p.exists())
    }

    /// `None` when no type can be determined.
    fn get_type(&self) -> Option<FileKind> {
        self.native_path().ok().and_then(|p| FileKind::classify(&p))
    }

    /// Modification time.
    fn get_date(&self) -> Result<DateTime<Utc>> {
        let path = self.native_path()?;
        fsx::modified(&path).map(DateTime::<Utc>::from).map_err(|e| FileError::from_io(e, &path))
    }

    /// Creates an empty file of `kind`. An empty resource container is a
    /// valid fork with no entries. Fails if anything exists at the identity.
    fn create(&self, kind: FileKind) -> Result<()> {
        let path = self.native_path()?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| FileError::from_io(e, &path))?;
        if kind == FileKind::ResourceContainer {
            let mut opened = OpenedFile::from_file(file, &path);
            ResourceBuilder::new().write_to(&mut opened)?;
            opened.close()?;
        }
        debug!(path = %path.display(), ?kind, "created file");
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        let path = self.native_path()?;
        let result = if path.is_dir() { fs::remove_dir(&path) } else { fs::remove_file(&path) };
        result.map_err(|e| FileError::from_io(e, &path))
    }

    /// Byte-for-byte copy into `dest`; `dest` is either fully replaced or untouched.
    fn copy_contents(&self, dest: &Self) -> Result<()> {
        let src = self.native_path()?;
        let dst = dest.native_path()?;
        copy_file_through(&src, &dst, |f| Box::new(f))
    }

    /// Atomically swaps the contents of two existing identities. Writing new
    /// content to a temporary identity and exchanging it with the target is
    /// the safe-save path.
    fn exchange(&self, other: &Self) -> Result<()> {
        let a = self.native_path()?;
        let b = other.native_path()?;
        if !a.exists() {
            return Err(FileError::NotFound { path: a });
        }
        if !b.exists() {
            return Err(FileError::NotFound { path: b });
        }
        fsx::exchange(&a, &b).map_err(|e| FileError::from_io(e, &a))
    }

    /// Bytes available on the filesystem backing this identity.
    fn free_space(&self) -> Result<u64> {
        let path = self.native_path()?;
        fsx::free_space(&path).map_err(|e| FileError::from_io(e, &path))
    }

    /// Opens the data stream. Reading requires an existing file; writing
    /// creates or truncates it.
    fn open(&self, writable: bool) -> Result<OpenedFile> {
        let path = self.native_path()?;
        let file = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|source| FileError::CreateFailed { path: path.clone(), source })?
        } else {
            File::open(&path).map_err(|e| FileError::from_io(e, &path))?
        };
        debug!(path = %path.display(), writable, "opened file");
        Ok(OpenedFile::from_file(file, &path))
    }

    /// Opens the resource fork. For writing, a missing or empty file becomes
    /// an empty container first; existing contents are kept.
    fn open_resource_file(&self, writable: bool) -> Result<OpenedResourceFile> {
        let path = self.native_path()?;
        let file = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|source| FileError::CreateFailed { path: path.clone(), source })?
        } else {
            File::open(&path).map_err(|e| FileError::from_io(e, &path))?
        };
        let mut opened = OpenedFile::from_file(file, &path);
        if writable && opened.is_empty()? {
            ResourceBuilder::new().write_to(&mut opened)?;
        }
        match OpenedResourceFile::from_opened_file(opened) {
            Err(FileError::InvalidFormat(reason)) => native_fork(&path, writable).unwrap_or(Err(FileError::InvalidFormat(reason))),
            other => other,
        }
    }

    fn read_dialog(&mut self, chooser: &mut dyn FileChooser, purpose: FileKind, prompt: Option<&str>) -> Result<bool> {
        let request = DialogRequest { purpose, prompt: prompt.map(str::to_string), default_name: None };
        match chooser.choose_for_read(&request) {
            DialogOutcome::Chosen(path) => self.bind_native(&path).map(|_| true),
            DialogOutcome::Cancelled => Ok(false),
        }
    }

    fn write_dialog(
        &mut self,
        chooser: &mut dyn FileChooser,
        purpose: FileKind,
        prompt: Option<&str>,
        default_name: Option<&str>,
    ) -> Result<bool> {
        let request = DialogRequest {
            purpose,
            prompt: prompt.map(str::to_string),
            default_name: default_name.map(str::to_string),
        };
        match chooser.choose_for_write(&request) {
            DialogOutcome::Chosen(path) => self.bind_native(&path).map(|_| true),
            DialogOutcome::Cancelled => Ok(false),
        }
    }

    /// Non-blocking save dialog. `on_done` receives a copy of this identity
    /// bound to the choice, or `None` on cancel.
    fn write_dialog_async<F>(
        &self,
        chooser: &mut dyn FileChooser,
        request: DialogRequest,
        on_done: F,
    ) where
        Self: Clone + 'static,
        F: FnOnce(Result<Option<Self>>) + 'static,
    {
        let mut target = self.clone();
        chooser.choose_for_write_async(
            request,
            Box::new(move |outcome| {
                let bound = match outcome {
                    DialogOutcome::Cancelled => Ok(None),
                    DialogOutcome::Chosen(path) => target.bind_native(&path).map(|_| Some(target)),
                };
                on_done(bound);
            }),
        );
    }
}

/// The native resource fork of `path`, where the platform has one.
#[cfg(target_os = "macos")]
fn native_fork(path: &Path, writable: bool) -> Option<Result<OpenedResourceFile>> {
    let fork = path.join("..namedfork").join("rsrc");
    let file = OpenOptions::new().read(true).write(writable).open(&fork).ok()?;
    Some(OpenedResourceFile::from_opened_file(OpenedFile::from_file(file, &fork)))
}

#[cfg(not(target_os = "macos"))]
fn native_fork(_path: &Path, _writable: bool) -> Option<Result<OpenedResourceFile>> {
    None
}
