//! Path-string identities.
//!
//! A [`FileSpecifier`] here is a canonical path string: `/` is the only
//! separator, runs of separators are collapsed and there is no trailing
//! separator except on the root. Directories are identified the same way,
//! so [`DirectorySpecifier`] is simply another name for the same type.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;

use super::{read_dir_entries, DirEntry, Location};
use crate::config;
use crate::error::{FileError, Result};

/// Converts platform separators to `/` and removes redundant ones.
/// Example: `"./dir1//dir2/file.txt/"` becomes `"dir1/dir2/file.txt"`.
pub fn canonicalize_path(raw: &str) -> String {
    let s = if MAIN_SEPARATOR == '/' { raw.to_string() } else { raw.replace(MAIN_SEPARATOR, "/") };
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    // separators are already collapsed, so this never exposes a leading '/'
    while out.len() > 2 && out.starts_with("./") {
        out.drain(..2);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FileSpecifier {
    name: String,
}

pub type DirectorySpecifier = FileSpecifier;

impl FileSpecifier {
    /// An unbound identity.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        !self.name.is_empty()
    }

    /// The canonical path string.
    pub fn path(&self) -> &str {
        &self.name
    }

    /// The final path element.
    pub fn get_name(&self) -> &str {
        self.split_at_leaf().1
    }

    fn split_at_leaf(&self) -> (&str, &str) {
        match self.name.rfind('/') {
            None => ("", &self.name),
            Some(0) => ("/", &self.name[1..]),
            Some(i) => (&self.name[..i], &self.name[i + 1..]),
        }
    }

    /// Looks for `name_with_path` under each configured search directory in
    /// turn and binds to the first hit.
    pub fn set_name_with_path(&mut self, name_with_path: &str) -> Result<()> {
        self.set_name_with_path_in(name_with_path, &config::current().search_path)
    }

    /// Same as [`set_name_with_path`](Self::set_name_with_path) with an
    /// explicit search path. On failure the identity is unchanged.
    pub fn set_name_with_path_in(&mut self, name_with_path: &str, search_path: &[PathBuf]) -> Result<()> {
        let relative = canonicalize_path(name_with_path);
        if relative.is_empty() {
            return Err(FileError::NotFound { path: PathBuf::new() });
        }
        for base in search_path {
            let candidate = FileSpecifier::from(base.as_path()) + relative.as_str();
            if Path::new(&candidate.name).exists() {
                debug!(relative = %relative, resolved = %candidate, "resolved through search path");
                *self = candidate;
                return Ok(());
            }
        }
        Err(FileError::NotFound { path: PathBuf::from(relative) })
    }

    /// Per-user directory for temporary and cached files.
    pub fn set_to_local_data_dir(&mut self) {
        *self = Self::from(config::current().local_data_dir().as_path());
    }

    pub fn set_to_preferences_dir(&mut self) {
        *self = Self::from(config::current().preferences_dir().as_path());
    }

    pub fn set_to_saved_games_dir(&mut self) {
        *self = Self::from(config::current().saved_games_dir().as_path());
    }

    pub fn set_to_recordings_dir(&mut self) {
        *self = Self::from(config::current().recordings_dir().as_path());
    }

    /// Appends one or more segments with exactly one separator at the join.
    pub fn add_part(&mut self, part: &str) {
        let part = canonicalize_path(part);
        if part.is_empty() {
            return;
        }
        if self.name.is_empty() {
            self.name = part;
            return;
        }
        if !self.name.ends_with('/') {
            self.name.push('/');
        }
        self.name.push_str(part.trim_start_matches('/'));
        self.name = canonicalize_path(&self.name);
    }

    /// Splits into (parent directory, leaf). Appending the leaf to the parent
    /// gives back this identity.
    pub fn split_path(&self) -> (DirectorySpecifier, String) {
        let (base, leaf) = self.split_at_leaf();
        (Self { name: base.to_string() }, leaf.to_string())
    }

    pub fn create_directory(&self) -> Result<()> {
        let path = self.native_path()?;
        std::fs::create_dir(&path).map_err(|e| FileError::from_io(e, &path))
    }

    /// Entries of this directory, directories first, hidden entries skipped.
    pub fn read_directory(&self) -> Result<Vec<DirEntry>> {
        read_dir_entries(&self.native_path()?)
    }
}

impl Location for FileSpecifier {
    fn native_path(&self) -> Result<PathBuf> {
        if self.name.is_empty() {
            return Err(FileError::InvalidState("identity is unbound"));
        }
        Ok(PathBuf::from(&self.name))
    }

    fn bind_native(&mut self, path: &Path) -> Result<()> {
        *self = Self::from(path);
        Ok(())
    }
}

impl From<&str> for FileSpecifier {
    fn from(s: &str) -> Self {
        Self { name: canonicalize_path(s) }
    }
}

impl From<String> for FileSpecifier {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&Path> for FileSpecifier {
    fn from(p: &Path) -> Self {
        Self::from(p.to_string_lossy().as_ref())
    }
}

impl fmt::Display for FileSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AddAssign<&str> for FileSpecifier {
    fn add_assign(&mut self, part: &str) {
        self.add_part(part);
    }
}

impl AddAssign<&FileSpecifier> for FileSpecifier {
    fn add_assign(&mut self, other: &FileSpecifier) {
        self.add_part(&other.name);
    }
}

impl Add<&str> for FileSpecifier {
    type Output = FileSpecifier;

    fn add(mut self, part: &str) -> FileSpecifier {
        self.add_part(part);
        self
    }
}

impl Add<&str> for &FileSpecifier {
    type Output = FileSpecifier;

    fn add(self, part: &str) -> FileSpecifier {
        self.clone() + part
    }
}

impl Add<&FileSpecifier> for &FileSpecifier {
    type Output = FileSpecifier;

    fn add(self, other: &FileSpecifier) -> FileSpecifier {
        self.clone() + other.name.as_str()
    }
}
