//! Volume / directory-id / name identities.
//!
//! Directories are named by a `(vref, dir_id)` pair issued by a process-wide
//! catalog, in the style of HFS: volume references count down from -1, the
//! root directory of every volume has id 2 and other directories are numbered
//! from 16 in the order they are first seen. A file is its parent pair plus a
//! leaf name.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::debug;

use super::{read_dir_entries, DirEntry, FileKind, Location};
use crate::config;
use crate::error::{FileError, Result};

pub const ROOT_DIR_ID: i32 = 2;
pub const FIRST_USER_DIR_ID: i32 = 16;

#[derive(Debug, Default)]
struct Catalog {
    volumes: Vec<PathBuf>,
    paths: HashMap<(i16, i32), PathBuf>,
    ids: HashMap<PathBuf, (i16, i32)>,
    next_id: i32,
}

impl Catalog {
    /// `dir` must already be absolute and lexically normalised.
    fn register(&mut self, dir: &Path) -> (i16, i32) {
        if let Some(&key) = self.ids.get(dir) {
            return key;
        }
        let root = dir.ancestors().last().unwrap_or(dir);
        let vref = match self.volumes.iter().position(|v| v == root) {
            Some(i) => -(i as i16) - 1,
            None => {
                self.volumes.push(root.to_path_buf());
                -(self.volumes.len() as i16)
            }
        };
        let dir_id = if dir == root {
            ROOT_DIR_ID
        } else {
            let id = self.next_id.max(FIRST_USER_DIR_ID);
            self.next_id = id + 1;
            id
        };
        self.paths.insert((vref, dir_id), dir.to_path_buf());
        self.ids.insert(dir.to_path_buf(), (vref, dir_id));
        debug!(dir = %dir.display(), vref, dir_id, "catalogued directory");
        (vref, dir_id)
    }

    fn resolve(&self, vref: i16, dir_id: i32) -> Option<PathBuf> {
        self.paths.get(&(vref, dir_id)).cloned()
    }
}

static CATALOG: OnceLock<Mutex<Catalog>> = OnceLock::new();

fn with_catalog<R>(f: impl FnOnce(&mut Catalog) -> R) -> R {
    let mut guard = CATALOG
        .get_or_init(|| Mutex::new(Catalog::default()))
        .lock()
        .unwrap_or_else(|p| p.into_inner());
    f(&mut guard)
}

/// Absolute form of `path` with `.` and `..` folded away, without touching the disk.
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(|e| FileError::from_io(e, path))?.join(path)
    };
    let mut out = PathBuf::new();
    for c in joined.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// Walks `relative` (slash separated) down from `base`, requiring every level
/// to be an existing directory.
fn walk_directories(base: &Path, relative: &str) -> Result<PathBuf> {
    let mut cur = base.to_path_buf();
    for seg in relative.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if seg == ".." {
            cur.pop();
            continue;
        }
        cur.push(seg);
        if !cur.is_dir() {
            return Err(FileError::NotFound { path: cur });
        }
    }
    Ok(cur)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DirectorySpecifier {
    vref: i16,
    dir_id: i32,
}

impl DirectorySpecifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(vref: i16, dir_id: i32) -> Self {
        Self { vref, dir_id }
    }

    /// Catalogues `path` (which need not exist yet) and names it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let dir = absolute(path)?;
        let (vref, dir_id) = with_catalog(|c| c.register(&dir));
        Ok(Self { vref, dir_id })
    }

    pub fn vref(&self) -> i16 {
        self.vref
    }

    pub fn dir_id(&self) -> i32 {
        self.dir_id
    }

    pub fn set_vref(&mut self, vref: i16) {
        self.vref = vref;
    }

    pub fn set_dir_id(&mut self, dir_id: i32) {
        self.dir_id = dir_id;
    }

    pub fn is_bound(&self) -> bool {
        self.vref != 0
    }

    pub fn native_path(&self) -> Result<PathBuf> {
        if !self.is_bound() {
            return Err(FileError::InvalidState("identity is unbound"));
        }
        with_catalog(|c| c.resolve(self.vref, self.dir_id)).ok_or(FileError::InvalidState("unknown directory id"))
    }

    pub fn exists(&self) -> bool {
        self.native_path().is_ok_and(|p| p.is_dir())
    }

    /// Moves down `relative` one level at a time. Every level must be an
    /// existing directory; on failure nothing changes.
    pub fn set_to_subdirectory(&mut self, relative: &str) -> Result<()> {
        let base = self.native_path()?;
        let target = walk_directories(&base, relative)?;
        *self = Self::from_path(&target)?;
        Ok(())
    }

    /// The directory holding the running executable.
    pub fn set_to_app_parent(&mut self) -> Result<()> {
        let exe = std::env::current_exe().map_err(|e| FileError::from_io(e, Path::new("")))?;
        let parent = exe.parent().ok_or(FileError::InvalidState("executable has no parent"))?;
        *self = Self::from_path(parent)?;
        Ok(())
    }

    /// The per-user preferences directory, created if missing.
    pub fn set_to_preferences_parent(&mut self) -> Result<()> {
        let dir = config::current().preferences_dir();
        std::fs::create_dir_all(&dir).map_err(|e| FileError::from_io(e, &dir))?;
        *self = Self::from_path(&dir)?;
        Ok(())
    }

    pub fn read_directory(&self) -> Result<Vec<DirEntry>> {
        read_dir_entries(&self.native_path()?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FileSpecifier {
    vref: i16,
    parent_id: i32,
    name: String,
}

impl FileSpecifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(parent: DirectorySpecifier, name: &str) -> Self {
        Self { vref: parent.vref, parent_id: parent.dir_id, name: name.to_string() }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let full = absolute(path)?;
        match (full.parent(), full.file_name()) {
            (Some(parent), Some(leaf)) => {
                let dir = DirectorySpecifier::from_path(parent)?;
                Ok(Self::from_parts(dir, &leaf.to_string_lossy()))
            }
            // the root names itself
            _ => Ok(Self::from_parts(DirectorySpecifier::from_path(&full)?, "")),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.vref != 0
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> DirectorySpecifier {
        DirectorySpecifier::from_parts(self.vref, self.parent_id)
    }

    /// Replaces the leaf name, appending the suffix of `kind` when given and
    /// not already present.
    pub fn set_name(&mut self, name: &str, kind: Option<FileKind>) {
        self.name = match kind {
            Some(k) if !name.to_ascii_lowercase().ends_with(&format!(".{}", k.suffix().to_ascii_lowercase())) => {
                format!("{name}.{}", k.suffix())
            }
            _ => name.to_string(),
        };
    }

    /// Resolves `relative` against the current parent directory. `:` is
    /// accepted as a separator. The target must exist; on failure nothing
    /// changes.
    pub fn set_name_with_path(&mut self, relative: &str) -> Result<()> {
        let relative = relative.replace(':', "/");
        let base = self.directory().native_path()?;
        let (dirs, leaf) = match relative.trim_end_matches('/').rsplit_once('/') {
            Some((d, l)) => (d, l),
            None => ("", relative.trim_end_matches('/')),
        };
        let parent = walk_directories(&base, dirs)?;
        let target = if leaf.is_empty() { parent } else { parent.join(leaf) };
        if !target.exists() {
            return Err(FileError::NotFound { path: target });
        }
        *self = Self::from_path(&target)?;
        Ok(())
    }

    /// This identity, read as a directory.
    pub fn to_directory(&self) -> Result<DirectorySpecifier> {
        DirectorySpecifier::from_path(&self.native_path()?)
    }

    /// Names the directory `dir` itself as a file identity.
    pub fn from_directory(&mut self, dir: &DirectorySpecifier) -> Result<()> {
        *self = Self::from_path(&dir.native_path()?)?;
        Ok(())
    }

    /// The running executable.
    pub fn set_to_app(&mut self) -> Result<()> {
        let exe = std::env::current_exe().map_err(|e| FileError::from_io(e, Path::new("")))?;
        *self = Self::from_path(&exe)?;
        Ok(())
    }

    /// Keeps the leaf name and moves it into the preferences directory.
    pub fn set_parent_to_preferences(&mut self) -> Result<()> {
        let mut dir = DirectorySpecifier::new();
        dir.set_to_preferences_parent()?;
        self.vref = dir.vref;
        self.parent_id = dir.dir_id;
        Ok(())
    }

    pub fn read_directory(&self) -> Result<Vec<DirEntry>> {
        read_dir_entries(&self.native_path()?)
    }
}

impl Location for FileSpecifier {
    fn native_path(&self) -> Result<PathBuf> {
        let parent = self.directory().native_path()?;
        Ok(if self.name.is_empty() { parent } else { parent.join(&self.name) })
    }

    fn bind_native(&mut self, path: &Path) -> Result<()> {
        *self = Self::from_path(path)?;
        Ok(())
    }
}

impl fmt::Display for FileSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {:?})", self.vref, self.parent_id, self.name)
    }
}
