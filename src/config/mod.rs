//! Runtime configuration for siren-console.
//!
//! Settings are loaded with priority: env var > settings.json > default.
//! `SIREN_BASE_URL` may live in `~/.siren-console/.env` (loaded via dotenvy
//! early in startup); everything else comes from env vars or the settings
//! file.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::settings::Settings;

/// Default backend base URL behind the reverse proxy.
const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Facade-wide HTTP client timeout. Indefinite hangs are bounded here, not
/// per call.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How long an auth banner stays visible before auto-dismissing.
const DEFAULT_BANNER_TTL_SECS: u64 = 8;

/// Main configuration for the console.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub metrics: MetricsConfig,
    pub images: ImagesConfig,
}

/// Backend connection settings consumed by the API facade.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

/// Session persistence settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the token file (e.g. `~/.siren-console/session.json`).
    pub session_path: PathBuf,
    pub banner_ttl: Duration,
}

/// Engagement-status banding thresholds.
///
/// A client with more than `excellent_over` transactions is rated excellent,
/// more than `steady_over` steady, anything else dormant. The split is a
/// product knob, not a constant; the observed default is `>1 -> excellent`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    pub excellent_over: u64,
    pub steady_over: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            excellent_over: 1,
            steady_over: 0,
        }
    }
}

/// Where generated images land.
#[derive(Debug, Clone)]
pub struct ImagesConfig {
    pub output_dir: PathBuf,
}

/// Get the default session file path (`~/.siren-console/session.json`).
pub fn default_session_path() -> PathBuf {
    crate::bootstrap::siren_home().join("session.json")
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u64(key: &str, fallback: u64) -> Result<u64, ConfigError> {
    optional_env(key)
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be a non-negative integer: {e}"),
        })
        .map(|v| v.unwrap_or(fallback))
}

/// Validate and parse a backend base URL.
///
/// Only http/https schemes with a real host are accepted, and userinfo is
/// rejected so a pasted URL cannot smuggle credentials into logs.
pub fn validate_base_url(raw: &str, key: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("URL parse failed: {e}"),
    })?;

    let scheme = parsed.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("scheme '{scheme}' is not allowed (expected http or https)"),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "URL is missing host".to_string(),
        });
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "URL contains userinfo (@), which is not allowed".to_string(),
        });
    }

    Ok(parsed)
}

impl Config {
    /// Resolve the runtime configuration from env vars and settings.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw_base = optional_env("SIREN_BASE_URL")
            .or_else(|| settings.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = validate_base_url(&raw_base, "SIREN_BASE_URL")?;

        let timeout_secs = parse_env_u64("SIREN_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SIREN_TIMEOUT_SECS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let session_path = optional_env("SIREN_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_session_path);
        let banner_ttl_secs = parse_env_u64("SIREN_BANNER_TTL_SECS", DEFAULT_BANNER_TTL_SECS)?;

        let defaults = MetricsConfig::default();
        let excellent_over = parse_env_u64(
            "SIREN_EXCELLENT_OVER",
            settings.excellent_over.unwrap_or(defaults.excellent_over),
        )?;
        let steady_over = parse_env_u64(
            "SIREN_STEADY_OVER",
            settings.steady_over.unwrap_or(defaults.steady_over),
        )?;
        if excellent_over < steady_over {
            return Err(ConfigError::InvalidValue {
                key: "SIREN_EXCELLENT_OVER".to_string(),
                message: format!(
                    "must be >= SIREN_STEADY_OVER for a monotonic split ({excellent_over} < {steady_over})"
                ),
            });
        }

        let output_dir = optional_env("SIREN_IMAGES_DIR")
            .or_else(|| settings.images_dir.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| crate::bootstrap::siren_home().join("images"));

        Ok(Self {
            api: ApiConfig {
                base_url,
                timeout: Duration::from_secs(timeout_secs),
            },
            session: SessionConfig {
                session_path,
                banner_ttl: Duration::from_secs(banner_ttl_secs),
            },
            metrics: MetricsConfig {
                excellent_over,
                steady_over,
            },
            images: ImagesConfig { output_dir },
        })
    }
}
