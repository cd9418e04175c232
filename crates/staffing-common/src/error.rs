//! Error types shared across the staffing workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, StaffingError>;

/// Errors that are not specific to one pipeline stage
#[derive(Error, Debug)]
pub enum StaffingError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StaffingError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
