//! Remote service error types

use thiserror::Error;

/// Result type for remote service calls
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by a snapshot block service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Volume, snapshot or block does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the request
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Request rate exceeded
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Malformed request (bad token, bad page size, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Service temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Transport or stream I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal service error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Check if retrying the same request may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_) | Self::Io(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(ServiceError::Throttled("slow down".into()).is_retryable());
        assert!(ServiceError::Unavailable("maintenance".into()).is_retryable());
        assert!(!ServiceError::not_found("snapshot snap-1").is_retryable());
        assert!(!ServiceError::AccessDenied("nope".into()).is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(ServiceError::not_found("snapshot snap-1").is_not_found());
        assert!(!ServiceError::invalid_request("bad token").is_not_found());
    }
}
