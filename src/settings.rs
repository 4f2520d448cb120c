//! Operator settings persistence.
//!
//! Stores console preferences in `~/.siren-console/settings.json`.
//! Settings are loaded with env var > settings.json > default priority;
//! the env-var side of that ladder lives in `config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Dashboard panels the console can land on.
///
/// The last-viewed panel is remembered across restarts. Logout does not
/// clear it; only the session token is security-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    #[default]
    Idle,
    Metrics,
    Prompt,
    Image,
}

impl Panel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Metrics => "metrics",
            Self::Prompt => "prompt",
            Self::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "idle" | "home" => Some(Self::Idle),
            "metrics" | "performance" => Some(Self::Metrics),
            "prompt" | "ai" => Some(Self::Prompt),
            "image" | "sd" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Operator settings persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Last-viewed dashboard panel, restored on startup.
    #[serde(default, alias = "page_state")]
    pub last_panel: Panel,

    /// Backend base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Transaction count above which a client is rated excellent.
    #[serde(default)]
    pub excellent_over: Option<u64>,

    /// Transaction count above which a client is rated steady.
    #[serde(default)]
    pub steady_over: Option<u64>,

    /// Directory generated images are written to.
    #[serde(default)]
    pub images_dir: Option<String>,
}

/// Default settings file path: `~/.siren-console/settings.json`.
pub fn default_settings_path() -> PathBuf {
    crate::bootstrap::siren_home().join("settings.json")
}

impl Settings {
    /// Load settings from `path`, returning defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                serde_json::from_str(&data).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Persist settings to `path`, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
