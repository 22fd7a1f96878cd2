//! Error types for hot-restart
//!
//! Engine, listener and launch errors are kept apart so that a failing
//! listener or a failing relaunch can be recorded without taking the host down.

use thiserror::Error;

/// Result type alias for restart operations
pub type Result<T> = std::result::Result<T, RestartError>;

/// Main error type for the restart engine
#[derive(Error, Debug)]
pub enum RestartError {
    #[error("Restart engine has not been initialized")]
    NotInitialized,

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<notify::Error> for RestartError {
    fn from(err: notify::Error) -> Self {
        RestartError::Watch(err.to_string())
    }
}

/// Errors raised by restart listener hooks
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Listener '{listener}' failed: {reason}")]
    Failed { listener: String, reason: String },

    #[error("Listener '{listener}' panicked: {message}")]
    Panicked { listener: String, message: String },
}

impl ListenerError {
    /// Convenience constructor for hook implementations
    pub fn failed(listener: impl Into<String>, reason: impl Into<String>) -> Self {
        ListenerError::Failed {
            listener: listener.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while launching or tearing down an application instance
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to start application: {reason}")]
    Spawn { reason: String },

    #[error("Failed to release resource '{resource}': {reason}")]
    Teardown { resource: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Whether this error happened after teardown began
    pub fn is_teardown(&self) -> bool {
        matches!(self, LaunchError::Teardown { .. })
    }
}
