use serde::{Deserialize, Serialize};

/// Machine-readable error codes for the enrollment wire protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Shared secret token did not match.
    Forbidden,
    /// Request is known but has not been approved yet. Clients keep polling.
    NotApproved,
    NotFound,
    InvalidRole,
    InvalidCsr,
    IoError,
    Internal,
}

impl ErrorCode {
    /// Suggested HTTP status code for this error.
    /// Transport-agnostic (returns u16, not an axum type).
    ///
    /// Malformed enrollment input maps to 500, not 400.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Forbidden | Self::NotApproved => 403,
            Self::NotFound => 404,
            Self::InvalidRole | Self::InvalidCsr | Self::IoError | Self::Internal => 500,
        }
    }
}
