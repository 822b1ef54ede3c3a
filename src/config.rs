use std::{env, fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const STORAGE_DIR_NAME: &str = ".octowatch";
const SETTINGS_FILE: &str = "config.json";
const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// User settings, read-only to the engine. Every field has a default so a
/// partial or absent config file still yields a working setup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub personal_access_token: Option<String>,
    pub poll_interval_minutes: u64,
    pub show_only_direct_participation: bool,
    pub mark_read_on_dismiss: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            personal_access_token: None,
            poll_interval_minutes: 1,
            show_only_direct_participation: false,
            mark_read_on_dismiss: false,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let home = env::var("HOME").map_err(|_| SettingsError::HomeDirMissing)?;
        Self::load_from(PathBuf::from(home).join(STORAGE_DIR_NAME).join(SETTINGS_FILE))
    }

    fn load_from(path: PathBuf) -> Result<Self, SettingsError> {
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Layered token resolution, evaluated once per fetch cycle: the
    /// settings file wins, the `GITHUB_TOKEN` environment variable is the
    /// fallback.
    pub fn resolve_token(&self) -> Option<String> {
        resolve_token_layered(self.personal_access_token.as_deref(), env::var(TOKEN_ENV_VAR).ok())
    }
}

fn resolve_token_layered(configured: Option<&str>, from_env: Option<String>) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .or_else(|| from_env.filter(|token| !token.trim().is_empty()))
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("HOME environment variable is not set; cannot read ~/.octowatch/config.json")]
    HomeDirMissing,
    #[error("I/O error while reading settings: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
