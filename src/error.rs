//! Error types for siren-console.

/// Top-level error type for the console.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse settings file: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-persistence errors.
///
/// Login/register failures are not errors here: the store reports them as
/// outcomes plus a banner, per its non-throwing contract.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Session file unreadable: {0}")]
    Persist(#[from] std::io::Error),

    #[error("Session file malformed: {0}")]
    Malformed(String),
}

/// Errors from the API gateway facade.
///
/// List endpoints never surface these to callers (they degrade to empty
/// results); action endpoints propagate them so the shell can show a
/// human-readable failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}: {excerpt}")]
    Status {
        path: String,
        status: u16,
        excerpt: String,
    },

    #[error("{path} returned a non-JSON body ({content_type}): {excerpt}")]
    MalformedBody {
        path: String,
        content_type: String,
        excerpt: String,
    },

    #[error("Backend rejected the request: {message}")]
    Backend { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Prompt composition errors.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("No agent and client selected")]
    NothingSelected,

    #[error("Guidance text is empty")]
    EmptyGuidance,

    #[error("Completion request failed: {0}")]
    Api(#[from] ApiError),
}

/// Terminal channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Readline error: {0}")]
    Readline(String),
}

/// Result type alias for the console.
pub type Result<T> = std::result::Result<T, Error>;
