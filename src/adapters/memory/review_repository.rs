//! In-memory adapter for ReviewRepository.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisResult, CiphertextHandle, EncryptedReview, EncryptedValue, IdAllocator, NewReview,
    ReviewId,
};
use crate::domain::ports::ReviewRepository;

#[derive(Debug, Clone)]
struct ReviewRecord {
    review: EncryptedReview,
    analysis: AnalysisResult,
}

/// Reviews held in a map behind a single lock; each call takes the lock once,
/// which makes every operation atomic.
#[derive(Debug)]
pub struct InMemoryReviewRepository {
    ids: IdAllocator,
    records: RwLock<BTreeMap<ReviewId, ReviewRecord>>,
}

impl InMemoryReviewRepository {
    pub fn new() -> Self {
        Self::with_allocator(IdAllocator::new())
    }

    /// Allocate ids from a shared counter.
    pub fn with_allocator(ids: IdAllocator) -> Self {
        Self {
            ids,
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryReviewRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn calibrate_record(record: &mut ReviewRecord, adjustment: CiphertextHandle) -> DomainResult<()> {
    if record.review.is_calibrated() {
        return Err(DomainError::AlreadyCalibrated(record.review.id));
    }
    record.review.encrypted_calibration_adjustment = EncryptedValue::from_handle(adjustment);
    Ok(())
}

#[async_trait]
impl ReviewRepository for InMemoryReviewRepository {
    async fn create(&self, review: NewReview) -> DomainResult<ReviewId> {
        let mut records = self.records.write().await;
        let id = ReviewId(self.ids.next_id());
        records.insert(
            id,
            ReviewRecord {
                review: EncryptedReview::new(id, review, Utc::now()),
                analysis: AnalysisResult::default(),
            },
        );
        Ok(id)
    }

    async fn get(&self, id: ReviewId) -> DomainResult<EncryptedReview> {
        self.records
            .read()
            .await
            .get(&id)
            .map(|record| record.review.clone())
            .ok_or(DomainError::ReviewNotFound(id))
    }

    async fn set_calibration(&self, id: ReviewId, adjustment: CiphertextHandle) -> DomainResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(DomainError::ReviewNotFound(id))?;
        calibrate_record(record, adjustment)
    }

    async fn get_analysis(&self, id: ReviewId) -> DomainResult<AnalysisResult> {
        self.records
            .read()
            .await
            .get(&id)
            .map(|record| record.analysis)
            .ok_or(DomainError::ReviewNotFound(id))
    }

    async fn update_analysis(&self, id: ReviewId, result: AnalysisResult) -> DomainResult<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(DomainError::ReviewNotFound(id))?;
        record.analysis = result;
        Ok(())
    }

    async fn complete_calibration(
        &self,
        id: ReviewId,
        adjustment: CiphertextHandle,
        calibrated_score: u32,
    ) -> DomainResult<AnalysisResult> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(DomainError::ReviewNotFound(id))?;
        calibrate_record(record, adjustment)?;
        record.analysis.record_calibration(calibrated_score);
        Ok(record.analysis)
    }

    async fn list(&self) -> DomainResult<Vec<EncryptedReview>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .map(|record| record.review.clone())
            .collect())
    }

    async fn count(&self) -> DomainResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(seed: u8) -> NewReview {
        NewReview {
            encrypted_score: CiphertextHandle([seed; 32]),
            encrypted_reviewer_group: CiphertextHandle([seed.wrapping_add(1); 32]),
            encrypted_reviewee_group: CiphertextHandle([seed.wrapping_add(2); 32]),
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let repo = InMemoryReviewRepository::new();
        let sub = submission(10);

        let id = repo.create(sub).await.unwrap();
        assert_eq!(id, ReviewId(1));

        let review = repo.get(id).await.unwrap();
        assert_eq!(review.encrypted_score, sub.encrypted_score);
        assert_eq!(review.encrypted_reviewer_group, sub.encrypted_reviewer_group);
        assert_eq!(review.encrypted_reviewee_group, sub.encrypted_reviewee_group);
        assert!(!review.is_calibrated());
        assert_eq!(repo.get_analysis(id).await.unwrap(), AnalysisResult::default());
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let repo = InMemoryReviewRepository::with_allocator(IdAllocator::starting_at(100));
        let a = repo.create(submission(1)).await.unwrap();
        let b = repo.create(submission(2)).await.unwrap();
        assert_eq!(a, ReviewId(100));
        assert_eq!(b, ReviewId(101));
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_review() {
        let repo = InMemoryReviewRepository::new();
        assert!(matches!(
            repo.get(ReviewId(9)).await,
            Err(DomainError::ReviewNotFound(ReviewId(9)))
        ));
        assert!(matches!(
            repo.set_calibration(ReviewId(9), CiphertextHandle([0; 32])).await,
            Err(DomainError::ReviewNotFound(_))
        ));
        assert!(matches!(
            repo.update_analysis(ReviewId(9), AnalysisResult::default()).await,
            Err(DomainError::ReviewNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_calibration_is_set_once() {
        let repo = InMemoryReviewRepository::new();
        let id = repo.create(submission(1)).await.unwrap();

        repo.set_calibration(id, CiphertextHandle([7; 32])).await.unwrap();
        let second = repo.set_calibration(id, CiphertextHandle([8; 32])).await;
        assert!(matches!(second, Err(DomainError::AlreadyCalibrated(_))));

        let review = repo.get(id).await.unwrap();
        assert_eq!(
            review.encrypted_calibration_adjustment.handle(),
            Some(CiphertextHandle([7; 32]))
        );
    }

    #[tokio::test]
    async fn test_complete_calibration_leaves_nothing_half_done() {
        let repo = InMemoryReviewRepository::new();
        let id = repo.create(submission(1)).await.unwrap();

        let analysis = repo
            .complete_calibration(id, CiphertextHandle([3; 32]), 85)
            .await
            .unwrap();
        assert!(analysis.is_calibrated);
        assert_eq!(analysis.calibrated_score, 85);

        let again = repo.complete_calibration(id, CiphertextHandle([4; 32]), 99).await;
        assert!(matches!(again, Err(DomainError::AlreadyCalibrated(_))));
        assert_eq!(repo.get_analysis(id).await.unwrap().calibrated_score, 85);
    }
}
