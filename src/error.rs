//! Error taxonomy for IP address operations.
//!
//! Every failure reported by a collaborator (allocator, store, network and
//! project lookups) is classified where it is first observed and re-raised as
//! one [`IpError`]. Callers only ever see the kinds listed in [`ErrorKind`].

use std::fmt;

/// Classification of an [`IpError`], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    PermissionDenied,
    NotFound,
    Conflict,
    ResourceExhausted,
    Internal,
    Canceled,
    DeadlineExceeded,
}

impl ErrorKind {
    /// Returns a string representation of the error kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Internal => "internal",
            ErrorKind::Canceled => "canceled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the IP repository and the services built on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("request canceled")]
    Canceled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl IpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IpError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            IpError::NotFound(_) => ErrorKind::NotFound,
            IpError::Conflict(_) => ErrorKind::Conflict,
            IpError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            IpError::Internal(_) => ErrorKind::Internal,
            IpError::Canceled => ErrorKind::Canceled,
            IpError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        IpError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        IpError::NotFound(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        IpError::Internal(msg.into())
    }
}

/// Result alias used throughout the crate
pub type IpResult<T> = Result<T, IpError>;
