//! Where uttfeed keeps its own files.
//!
//! Everything lives under a `.uttfeed` folder in the OS local data directory,
//! or under `$UTTFEED_HOME` when that is set.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".uttfeed";
pub const HOME_ENV: &str = "UTTFEED_HOME";

static BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No home or data directory available for uttfeed files")]
    NoBaseDir,
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Root `.uttfeed` directory, created on demand.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let base = base_dir().ok_or(AppDirError::NoBaseDir)?;
    ensure_dir(base.join(APP_DIR_NAME))
}

/// `logs/` under the root directory, created on demand.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    ensure_dir(app_root_dir()?.join("logs"))
}

fn ensure_dir(path: PathBuf) -> Result<PathBuf, AppDirError> {
    std::fs::create_dir_all(&path).map_err(|source| AppDirError::CreateDir {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn base_dir() -> Option<PathBuf> {
    let forced = BASE_OVERRIDE.lock().ok().and_then(|guard| guard.clone());
    forced
        .or_else(|| std::env::var_os(HOME_ENV).map(PathBuf::from))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf()))
}

#[cfg(test)]
fn set_base_dir(path: PathBuf) {
    if let Ok(mut guard) = BASE_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

#[cfg(test)]
fn clear_base_dir() {
    if let Ok(mut guard) = BASE_OVERRIDE.lock() {
        *guard = None;
    }
}
