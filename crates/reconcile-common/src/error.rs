//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for reconcile tooling
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors raised outside the ingest pipeline proper (setup, logging, config)
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl ReconcileError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a logging setup error
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }
}
