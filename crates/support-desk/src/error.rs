//! Tool Server Error Types

use thiserror::Error;

/// Result type alias for tool handlers
pub type Result<T> = std::result::Result<T, DeskError>;

/// Domain-level failures raised by tool handlers
#[derive(Error, Debug)]
pub enum DeskError {
    /// Arguments failed validation
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal handler failure
    #[error("Tool error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Stable wire code for HTTP error payloads
    pub fn code(&self) -> &'static str {
        match self {
            DeskError::InvalidArguments(_) => "INVALID_ARGUMENTS",
            DeskError::NotFound(_) => "NOT_FOUND",
            DeskError::Internal(_) => "TOOL_ERROR",
        }
    }
}
