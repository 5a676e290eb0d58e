//! Enrollment domain error types.

use corral_common::error::ErrorCode;

use crate::role::InvalidRoleError;
use crate::service::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum EnrollError {
    #[error("invalid enrollment token")]
    Forbidden,

    #[error(transparent)]
    InvalidRole(#[from] InvalidRoleError),

    #[error("invalid certificate request: {0}")]
    InvalidCsr(String),

    #[error("no signing request for fingerprint {0}")]
    UnknownFingerprint(String),

    #[error("signing request {0} is not approved yet")]
    NotApproved(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {0} is not installed on this coordinator")]
    ToolMissing(String),

    #[error("anchor error: {0}")]
    Anchor(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("cluster configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub(crate) fn certificate_error(e: rcgen::Error) -> EnrollError {
    EnrollError::Certificate(e.to_string())
}

impl From<&EnrollError> for ErrorCode {
    fn from(e: &EnrollError) -> Self {
        match e {
            EnrollError::Forbidden => ErrorCode::Forbidden,
            EnrollError::InvalidRole(_) => ErrorCode::InvalidRole,
            EnrollError::InvalidCsr(_) => ErrorCode::InvalidCsr,
            EnrollError::UnknownFingerprint(_)
            | EnrollError::UnknownTool(_)
            | EnrollError::ToolMissing(_) => ErrorCode::NotFound,
            EnrollError::NotApproved(_) => ErrorCode::NotApproved,
            EnrollError::Io(_) => ErrorCode::IoError,
            EnrollError::Anchor(_)
            | EnrollError::Certificate(_)
            | EnrollError::Config(_)
            | EnrollError::Service(_) => ErrorCode::Internal,
        }
    }
}
