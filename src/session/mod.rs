//! Session store for backend authentication.
//!
//! Single source of truth for "is there a usable credential" and the only
//! writer of it. Tokens are persisted to `~/.siren-console/session.json`
//! and rehydrated on startup without re-validation; proving the token is
//! still accepted is the route guard's job, not the store's.

pub mod guard;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::config::{ApiConfig, SessionConfig};
use crate::error::AuthError;

/// Session data persisted to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Login form contents.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Registration form contents, mirroring `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterDetails {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Result of a login attempt. Failures never throw out of the store; the
/// shell observes the outcome plus the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    Rejected,
    /// Transport-level failure; prior session state is retained unchanged.
    Unreachable,
}

/// Result of a registration attempt. Registration never authenticates; a
/// rejection hands the attempted credentials back so the shell can prefill
/// the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    Rejected { prefill: Credentials },
    Unreachable,
}

/// Dismissible auth banner with an auto-dismiss deadline.
#[derive(Debug)]
struct Banner {
    message: String,
    opened_at: Instant,
}

/// Wire shape of the auth endpoints: `{token}` or `{error}`.
#[derive(Debug, Default, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Holds the current credential and runs the auth flows against the backend.
pub struct SessionStore {
    http: Client,
    base_url: Url,
    session_path: PathBuf,
    banner_ttl: Duration,
    /// Current token in memory. Written only by login, logout, rehydration.
    token: RwLock<Option<SecretString>>,
    banner: RwLock<Option<Banner>>,
}

impl SessionStore {
    /// Create the store and rehydrate any persisted token.
    pub async fn open(api: &ApiConfig, session: &SessionConfig) -> Self {
        let store = Self {
            http: Client::builder()
                .timeout(api.timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: api.base_url.clone(),
            session_path: session.session_path.clone(),
            banner_ttl: session.banner_ttl,
            token: RwLock::new(None),
            banner: RwLock::new(None),
        };

        if let Err(e) = store.load_session().await {
            tracing::debug!("No existing session found: {}", e);
        }

        store
    }

    /// Get the current session token, if any.
    pub async fn token(&self) -> Option<SecretString> {
        self.token.read().await.clone()
    }

    /// Check whether a token is held (does not verify it with the backend).
    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Post credentials to `/auth/login` and adopt the returned token.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        let response = match self
            .http
            .post(self.auth_endpoint("auth/login"))
            .json(credentials)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Login request failed: {}", redact_sensitive_detail(&e.to_string()));
                return LoginOutcome::Unreachable;
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: AuthResponse = serde_json::from_str(&body).unwrap_or_default();

        let token = parsed
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if status.is_success()
            && let Some(token) = token
        {
            if let Err(e) = self.save_session(token).await {
                // Memory still wins: the operator is authenticated for this
                // run even when the token file cannot be written.
                tracing::warn!("Failed to persist session: {}", e);
            }
            *self.token.write().await = Some(SecretString::from(token.to_string()));
            tracing::info!("Authenticated against {}", self.base_url);
            return LoginOutcome::Authenticated;
        }

        let raw = parsed.error.unwrap_or_else(|| "login failed".to_string());
        self.open_banner(&raw).await;
        LoginOutcome::Rejected
    }

    /// Post details to `/auth/register`. Success does not authenticate.
    pub async fn register(&self, details: &RegisterDetails) -> RegisterOutcome {
        let response = match self
            .http
            .post(self.auth_endpoint("auth/register"))
            .json(details)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    "Register request failed: {}",
                    redact_sensitive_detail(&e.to_string())
                );
                return RegisterOutcome::Unreachable;
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            return RegisterOutcome::Registered;
        }

        let parsed: AuthResponse = serde_json::from_str(&body).unwrap_or_default();
        let raw = parsed
            .error
            .unwrap_or_else(|| "registration failed".to_string());
        self.open_banner(&raw).await;
        RegisterOutcome::Rejected {
            prefill: Credentials {
                username: details.username.clone(),
                password: details.password.clone(),
            },
        }
    }

    /// Clear the persisted and in-memory token. Idempotent.
    pub async fn logout(&self) {
        *self.token.write().await = None;
        match tokio::fs::remove_file(&self.session_path).await {
            Ok(()) => tracing::info!("Session cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove session file {}: {}",
                self.session_path.display(),
                e
            ),
        }
    }

    /// The current banner message, or `None` once it has auto-dismissed.
    pub async fn banner(&self) -> Option<String> {
        {
            let guard = self.banner.read().await;
            match guard.as_ref() {
                Some(banner) if banner.opened_at.elapsed() < self.banner_ttl => {
                    return Some(banner.message.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it so the shell stops rendering it.
        self.banner.write().await.take();
        None
    }

    /// Dismiss the banner explicitly.
    pub async fn dismiss_banner(&self) {
        self.banner.write().await.take();
    }

    async fn open_banner(&self, raw: &str) {
        let message = banner_message(raw);
        tracing::debug!("Auth banner: {}", message);
        *self.banner.write().await = Some(Banner {
            message,
            opened_at: Instant::now(),
        });
    }

    fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Save session data to disk with restrictive permissions.
    async fn save_session(&self, token: &str) -> Result<(), AuthError> {
        let session = SessionData {
            token: token.to_string(),
            created_at: Utc::now(),
        };

        if let Some(parent) = self.session_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&session)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        tokio::fs::write(&self.session_path, json).await?;

        // Restrictive permissions: the file contains a bearer token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.session_path, perms).await?;
        }

        tracing::debug!("Session saved to {}", self.session_path.display());
        Ok(())
    }

    /// Load session data from disk, tolerating legacy bare-string files.
    async fn load_session(&self) -> Result<(), AuthError> {
        let data = tokio::fs::read_to_string(&self.session_path).await?;

        let session = parse_session_data(&data).map_err(AuthError::Malformed)?;
        *self.token.write().await = Some(SecretString::from(session.token));

        tracing::info!(
            "Loaded session from {} (created: {})",
            self.session_path.display(),
            session.created_at
        );
        Ok(())
    }

    /// Set the token directly (useful for tests).
    pub async fn set_token(&self, token: SecretString) {
        *self.token.write().await = Some(token);
    }
}

/// Derive the banner text from a backend error: first letter uppercased,
/// period suffixed.
fn banner_message(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut chars = trimmed.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => return "Authentication failed.".to_string(),
    };
    if capitalized.ends_with('.') {
        capitalized
    } else {
        format!("{capitalized}.")
    }
}

fn parse_session_data(data: &str) -> Result<SessionData, String> {
    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| format!("invalid JSON: {}", e))?;

    if let Ok(session) = serde_json::from_value::<SessionData>(value.clone()) {
        if session.token.trim().is_empty() {
            return Err("session token is empty".to_string());
        }
        return Ok(session);
    }

    // Legacy format: a bare JSON string holding the token.
    if let Some(token) = value.as_str() {
        let token = token.trim();
        if token.is_empty() {
            return Err("session token is empty".to_string());
        }
        return Ok(SessionData {
            token: token.to_string(),
            created_at: Utc::now(),
        });
    }

    Err("unsupported session JSON format".to_string())
}

fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (
            r"(?i)\b(token|password)\b(\s*[:=]\s*)([^,\s]+)",
            "$1$2[REDACTED]",
        ),
    ];

    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).to_string();
        }
    }

    value
}
