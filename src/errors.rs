//! Error types for Specdex

use thiserror::Error;

/// Main error type for Specdex
#[derive(Error, Debug)]
pub enum SpecdexError {
    #[error("Invalid specification at byte {offset}: {message}")]
    InvalidSpecification {
        offset: u64,
        message: String,
    },

    #[error("Store integrity violation: {0}")]
    StoreIntegrity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Timeout after {0:.1} seconds")]
    Timeout(f64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl SpecdexError {
    /// Whether the transport layer may safely retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SpecdexError::StoreUnavailable(_) | SpecdexError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpecdexError>;
