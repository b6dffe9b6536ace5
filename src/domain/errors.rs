//! Domain errors for the sealed review system.

use thiserror::Error;

use super::models::{ModelId, RequestKind, RequestToken, ReviewId};

/// Domain-level errors that can occur while scoring and calibrating reviews.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Review not found: {0}")]
    ReviewNotFound(ReviewId),

    #[error("Bias model not found: {0}")]
    BiasModelNotFound(ModelId),

    #[error("No score baseline recorded for reviewer group {0}")]
    GroupBaselineMissing(u32),

    #[error("Review {0} is already calibrated")]
    AlreadyCalibrated(ReviewId),

    #[error("Review {0} has already contributed to its group statistics")]
    AlreadyContributed(ReviewId),

    #[error("Unknown decryption request: {0}")]
    UnknownRequest(RequestToken),

    #[error("Decryption proof failed verification for request {0}")]
    InvalidProof(RequestToken),

    #[error("Oracle issued a token that is already outstanding: {0}")]
    DuplicateToken(RequestToken),

    #[error("Decryption request {0} expired before its callback arrived")]
    Expired(RequestToken),

    #[error("Request {token} was issued for {actual}, not {expected}")]
    RequestKindMismatch {
        token: RequestToken,
        expected: RequestKind,
        actual: RequestKind,
    },

    #[error("Request {token} expected {expected} cleartexts, got {actual}")]
    MalformedCleartexts {
        token: RequestToken,
        expected: usize,
        actual: usize,
    },

    #[error("Ciphertext is not initialized")]
    UninitializedCiphertext,

    #[error("Decryption oracle error: {0}")]
    Oracle(String),

    #[error("Ciphertext backend error: {0}")]
    Backend(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse classification of [`DomainError`] for callers deciding how to
/// present a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A review, bias model or group baseline does not exist (yet).
    NotFound,
    AlreadyCalibrated,
    /// The review's score is already part of its group's statistics.
    AlreadyContributed,
    UnknownRequest,
    InvalidProof,
    DuplicateToken,
    Expired,
    Malformed,
    Infrastructure,
}

impl DomainError {
    /// Classify this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ReviewNotFound(_)
            | Self::BiasModelNotFound(_)
            | Self::GroupBaselineMissing(_) => ErrorKind::NotFound,
            Self::AlreadyCalibrated(_) => ErrorKind::AlreadyCalibrated,
            Self::AlreadyContributed(_) => ErrorKind::AlreadyContributed,
            Self::UnknownRequest(_) => ErrorKind::UnknownRequest,
            Self::InvalidProof(_) => ErrorKind::InvalidProof,
            Self::DuplicateToken(_) => ErrorKind::DuplicateToken,
            Self::Expired(_) => ErrorKind::Expired,
            Self::RequestKindMismatch { .. }
            | Self::MalformedCleartexts { .. }
            | Self::UninitializedCiphertext => ErrorKind::Malformed,
            Self::Oracle(_)
            | Self::Backend(_)
            | Self::DatabaseError(_)
            | Self::SerializationError(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the caller may reasonably retry the operation.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Expired | ErrorKind::Infrastructure
        )
    }

    /// Rejections of callbacks that may indicate a forged or replayed response.
    pub const fn is_security_event(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownRequest | ErrorKind::InvalidProof
        )
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_classification() {
        let token = RequestToken(Uuid::new_v4());

        assert!(DomainError::ReviewNotFound(ReviewId(1)).is_retryable());
        assert!(!DomainError::AlreadyCalibrated(ReviewId(1)).is_retryable());
        assert!(!DomainError::AlreadyContributed(ReviewId(1)).is_retryable());
        assert_eq!(DomainError::GroupBaselineMissing(3).kind(), ErrorKind::NotFound);
        assert!(DomainError::GroupBaselineMissing(3).is_retryable());
        assert!(!DomainError::InvalidProof(token).is_retryable());

        assert!(DomainError::UnknownRequest(token).is_security_event());
        assert!(DomainError::InvalidProof(token).is_security_event());
        assert!(!DomainError::Expired(token).is_security_event());

        assert_eq!(
            DomainError::MalformedCleartexts { token, expected: 4, actual: 3 }.kind(),
            ErrorKind::Malformed
        );
    }

    #[test]
    fn test_error_messages() {
        let err = DomainError::AlreadyCalibrated(ReviewId(7));
        assert_eq!(err.to_string(), "Review 7 is already calibrated");
    }
}
