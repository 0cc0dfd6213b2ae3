//! Error types for the code agent.

use thiserror::Error;

/// Result type alias using the agent's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the code agent.
///
/// Expected execution failures (timeouts, non-zero exits, rejected shell
/// commands) are reported as values by the sandbox, not through this type.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Unsupported operation type: {0}")]
    UnsupportedOperation(String),

    // =========================================================================
    // Completion Provider Errors
    // =========================================================================
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    #[error("Model provider error: {0}")]
    ModelProvider(String),

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Execution engine has been shut down")]
    EngineShutdown,

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an unsupported language error.
    pub fn unsupported_language(language: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(language.into())
    }

    /// Create an unsupported capability error.
    pub fn unsupported_capability(capability: impl Into<String>) -> Self {
        Self::UnsupportedCapability(capability.into())
    }

    /// Create a model provider error.
    pub fn model_provider(msg: impl Into<String>) -> Self {
        Self::ModelProvider(msg.into())
    }

    /// Create a workspace error.
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the caller asked for something the
    /// provider cannot do, as opposed to a transient failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCapability(_)
                | Self::UnsupportedLanguage(_)
                | Self::UnsupportedOperation(_)
        )
    }
}
