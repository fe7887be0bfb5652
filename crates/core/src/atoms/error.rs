// Atoms: error types.
// Single canonical error enum for the core, built with `thiserror`.
//
// Design rules:
//   - Variants are coarse-grained by domain (I/O, DB, Provider, Config...).
//   - `#[from]` wires std/external error conversions automatically.
//   - No variant carries secret material (API keys, passwords) in its message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML configuration parse failure.
    #[error("config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An LLM provider returned an error or is unreachable.
    #[error("provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Every configured provider in the fallback chain failed.
    #[error("all providers exhausted for task type {task_type}: {last_error}")]
    ProvidersExhausted { task_type: String, last_error: String },

    /// Tool execution failure (tool-domain error, loop continues).
    #[error("tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    /// Permission denial (loop continues, no retry).
    #[error("permission denied: {0}")]
    Permission(String),

    /// Blacklist hit, protected-file write, or other terminal safety violation.
    #[error("safety violation: {0}")]
    Safety(String),

    /// Budget (token, cost, or time) exhausted.
    #[error("budget exhausted: {0}")]
    Budget(String),

    /// Engine or agent configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// Vault authentication or crypto failure.
    #[error("vault error: {0}")]
    Vault(String),

    /// Runtime fingerprint mismatch at startup.
    #[error("fingerprint mismatch: refusing to start")]
    FingerprintMismatch,

    /// Migration failure at startup.
    #[error("migration error: {0}")]
    Migration(String),

    /// Approval lifecycle error (already resolved, expired, etc).
    #[error("approval error: {0}")]
    Approval(String),

    /// Graceful shutdown in progress; operation was abandoned.
    #[error("shutdown: {0}")]
    Shutdown(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool { tool: tool.into(), message: message.into() }
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

/// All core operations should return this type.
pub type CoreResult<T> = Result<T, CoreError>;

/// Stable error-code taxonomy for gateway `error` frames (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Auth,
    Transport,
    Permission,
    Budget,
    Safety,
    Internal,
}

impl CoreError {
    /// Map to the coarse, user-visible error code used on the gateway wire.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Permission(_) => ErrorCode::Permission,
            CoreError::Safety(_) => ErrorCode::Safety,
            CoreError::Budget(_) => ErrorCode::Budget,
            CoreError::Vault(_) | CoreError::FingerprintMismatch => ErrorCode::Auth,
            CoreError::Network(_) => ErrorCode::Transport,
            _ => ErrorCode::Internal,
        }
    }
}
