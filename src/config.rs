//! Host configuration: the data search path and the per-user directories.
//!
//! The hosting application either installs a [`Config`] explicitly or lets the
//! first use build one from the environment:
//!
//! - `DUALFORK_SEARCH_PATH`: base directories in platform path-list syntax.
//! - `DUALFORK_DATA_DIR`: overrides the per-user local data directory.

use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{FileError, Result};

pub const SEARCH_PATH_ENV: &str = "DUALFORK_SEARCH_PATH";
pub const DATA_DIR_ENV: &str = "DUALFORK_DATA_DIR";
/// Folder created under the platform's per-user directories.
pub const APP_DIR_NAME: &str = "dualfork";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Ordered base directories searched by `set_name_with_path`.
    pub search_path: Vec<PathBuf>,
    pub local_data_dir: Option<PathBuf>,
    pub preferences_dir: Option<PathBuf>,
    pub saved_games_dir: Option<PathBuf>,
    pub recordings_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let search_path = std::env::var_os(SEARCH_PATH_ENV)
            .map(|v| std::env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or_default();
        Self {
            search_path,
            local_data_dir: std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| FileError::from_io(e, path))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FileError::InvalidFormat(format!("config '{}': {e}", path.display())))
    }

    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn local_data_dir(&self) -> PathBuf {
        self.local_data_dir.clone().unwrap_or_else(|| user_dir(dirs::data_local_dir()))
    }

    pub fn preferences_dir(&self) -> PathBuf {
        self.preferences_dir.clone().unwrap_or_else(|| user_dir(dirs::config_dir()))
    }

    pub fn saved_games_dir(&self) -> PathBuf {
        self.saved_games_dir.clone().unwrap_or_else(|| self.local_data_dir().join("Saved Games"))
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.recordings_dir.clone().unwrap_or_else(|| self.local_data_dir().join("Recordings"))
    }
}

fn user_dir(base: Option<PathBuf>) -> PathBuf {
    match base {
        Some(base) => base.join(APP_DIR_NAME),
        None => PathBuf::from(".").join(format!(".{APP_DIR_NAME}")),
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

fn slot() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| RwLock::new(Config::from_env()))
}

/// Replaces the process-wide configuration.
pub fn install(config: Config) {
    let mut guard = slot().write().unwrap_or_else(|p| p.into_inner());
    *guard = config;
}

/// A snapshot of the process-wide configuration.
pub fn current() -> Config {
    slot().read().unwrap_or_else(|p| p.into_inner()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, r#"{{ "search_path": ["/game/data", "/home/user/.game/data"] }}"#).unwrap();
        let cfg = Config::from_json_file(f.path()).unwrap();
        assert_eq!(cfg.search_path, vec![PathBuf::from("/game/data"), PathBuf::from("/home/user/.game/data")]);
        assert!(cfg.local_data_dir.is_none());
        assert!(cfg.preferences_dir().to_string_lossy().contains(APP_DIR_NAME));
    }

    #[test]
    fn bad_json_is_invalid_format() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(matches!(Config::from_json_file(f.path()), Err(FileError::InvalidFormat(_))));
    }

    #[test]
    fn derived_directories_follow_local_data_dir() {
        let cfg = Config { local_data_dir: Some(PathBuf::from("/tmp/df")), ..Config::default() };
        assert_eq!(cfg.saved_games_dir(), PathBuf::from("/tmp/df/Saved Games"));
        assert_eq!(cfg.recordings_dir(), PathBuf::from("/tmp/df/Recordings"));
    }
}
