//! Storage port for encrypted reviews.
//!
//! The calibration engine reads reviews through this trait and applies
//! callback results with its atomic update calls.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AnalysisResult, CiphertextHandle, EncryptedReview, NewReview, ReviewId};

/// Repository port for encrypted reviews and their analysis results.
///
/// A review and its [`AnalysisResult`] are created together and share a
/// lifetime. Every mutating call is atomic: either all of its invariants hold
/// afterwards or nothing changed.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Allocate the next id and store the review with an uninitialized
    /// calibration and a zeroed analysis result.
    async fn create(&self, review: NewReview) -> DomainResult<ReviewId>;

    /// Fails with `ReviewNotFound` if absent.
    async fn get(&self, id: ReviewId) -> DomainResult<EncryptedReview>;

    /// Set the calibration adjustment. Irreversible; a second call fails
    /// with `AlreadyCalibrated`.
    async fn set_calibration(&self, id: ReviewId, adjustment: CiphertextHandle) -> DomainResult<()>;

    /// Fails with `ReviewNotFound` if absent.
    async fn get_analysis(&self, id: ReviewId) -> DomainResult<AnalysisResult>;

    /// Replace the stored analysis result.
    async fn update_analysis(&self, id: ReviewId, result: AnalysisResult) -> DomainResult<()>;

    /// Set the calibration adjustment and record the calibrated score in one
    /// atomic step. Returns the updated analysis result.
    async fn complete_calibration(
        &self,
        id: ReviewId,
        adjustment: CiphertextHandle,
        calibrated_score: u32,
    ) -> DomainResult<AnalysisResult>;

    /// All reviews in id order.
    async fn list(&self) -> DomainResult<Vec<EncryptedReview>>;

    async fn count(&self) -> DomainResult<u64>;
}
