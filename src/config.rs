//! Settings file and data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::runtime::{SessionOptions, SETTLE_WINDOW};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not resolve a data directory")]
    NoDataDir,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Visual-completion window of a move, in milliseconds.
    pub settle_ms: u64,
    /// Fixed RNG seed; entropy when absent.
    pub seed: Option<u64>,
    /// Player identity for score submission.
    pub identity: Option<String>,
    pub cloud_latency_ms: u64,
    pub server_latency_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            settle_ms: SETTLE_WINDOW.as_millis() as u64,
            seed: None,
            identity: None,
            cloud_latency_ms: 40,
            server_latency_ms: 120,
        }
    }
}

impl Settings {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            settle: Duration::from_millis(self.settle_ms),
            identity: self.identity.clone().filter(|id| !id.is_empty()),
        }
    }

    pub fn cloud_latency(&self) -> Duration {
        Duration::from_millis(self.cloud_latency_ms)
    }

    pub fn server_latency(&self) -> Duration {
        Duration::from_millis(self.server_latency_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub settings_path: PathBuf,
}

/// Resolve the data directory, creating it if needed. `data_dir` overrides
/// the platform default.
pub fn project_paths(data_dir: Option<PathBuf>) -> Result<Paths, ConfigError> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => ProjectDirs::from("org", "tg2048", "tg2048")
            .ok_or(ConfigError::NoDataDir)?
            .data_local_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir)?;
    Ok(Paths { settings_path: dir.join(SETTINGS_FILE), data_dir: dir })
}

/// Missing file gives defaults; an unreadable one is reported and ignored.
pub fn load_settings(path: &Path) -> Settings {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return Settings::default(),
    };
    match serde_json::from_str(&text) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            Settings::default()
        }
    }
}

/// Like [`load_settings`], but on first run writes the defaults out so there
/// is a file to edit.
pub fn load_or_init_settings(path: &Path) -> Settings {
    if path.exists() {
        return load_settings(path);
    }
    let settings = Settings::default();
    if let Err(e) = save_settings(path, &settings) {
        warn!(path = %path.display(), error = %e, "could not write default settings");
    }
    settings
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(settings)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
