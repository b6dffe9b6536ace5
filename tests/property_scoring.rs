//! Property-based tests for scoring arithmetic and store guarantees.

use proptest::prelude::*;
use uuid::Uuid;

use sealed_review::adapters::memory::{InMemoryReviewRepository, RunningMeanGroupStatistics};
use sealed_review::domain::errors::DomainError;
use sealed_review::domain::models::scoring::{bias_score, calibrated_score, is_biased};
use sealed_review::domain::models::{CiphertextHandle, NewReview, RequestKind, RequestToken, ReviewId};
use sealed_review::domain::ports::{GroupStatistics, ReviewRepository};
use sealed_review::services::RequestRegistry;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn handle_strategy() -> impl Strategy<Value = CiphertextHandle> {
    any::<[u8; 32]>().prop_map(CiphertextHandle)
}

fn submission_strategy() -> impl Strategy<Value = NewReview> {
    (handle_strategy(), handle_strategy(), handle_strategy()).prop_map(
        |(encrypted_score, encrypted_reviewer_group, encrypted_reviewee_group)| NewReview {
            encrypted_score,
            encrypted_reviewer_group,
            encrypted_reviewee_group,
        },
    )
}

// ----------------------------------------------------------------------------
// Arithmetic
// ----------------------------------------------------------------------------

proptest! {
    /// Property: bias is the absolute distance from the baseline and never
    /// exceeds the larger of the two operands
    #[test]
    fn prop_bias_is_absolute_difference(
        score in any::<u32>(),
        reviewer in any::<u32>(),
        reviewee in any::<u32>(),
        average in any::<u32>(),
    ) {
        prop_assume!(reviewer != reviewee);
        let bias = bias_score(score, reviewer, reviewee, average);
        let expected = (i64::from(score) - i64::from(average)).unsigned_abs();
        prop_assert_eq!(u64::from(bias), expected);
        prop_assert!(bias <= score.max(average));
    }

    /// Property: reviews within one group never carry bias
    #[test]
    fn prop_same_group_has_no_bias(
        score in any::<u32>(),
        group in any::<u32>(),
        average in any::<u32>(),
        threshold in any::<u32>(),
    ) {
        let bias = bias_score(score, group, group, average);
        prop_assert_eq!(bias, 0);
        prop_assert!(!is_biased(bias, threshold));
    }

    /// Property: bias flag is a strict comparison against the threshold
    #[test]
    fn prop_threshold_is_strict(bias in any::<u32>(), threshold in any::<u32>()) {
        prop_assert_eq!(is_biased(bias, threshold), bias > threshold);
    }

    /// Property: calibrated score is modular u32 addition
    #[test]
    fn prop_calibration_wraps(score in any::<u32>(), adjustment in any::<u32>()) {
        let expected = (u64::from(score) + u64::from(adjustment)) % (1u64 << 32);
        prop_assert_eq!(u64::from(calibrated_score(score, adjustment)), expected);
    }

    /// Property: group baseline is the floored mean of recorded scores
    #[test]
    fn prop_group_average_is_floor_mean(
        group in any::<u32>(),
        scores in prop::collection::vec(any::<u32>(), 1..20),
    ) {
        let stats = RunningMeanGroupStatistics::new();
        for &score in &scores {
            stats.record_score(group, score);
        }
        let sum: u64 = scores.iter().map(|&s| u64::from(s)).sum();
        let mean = sum / scores.len() as u64;
        prop_assert_eq!(stats.average(group).map(u64::from), Some(mean));
        prop_assert_eq!(stats.sample_count(group), scores.len() as u64);
        prop_assert_eq!(stats.average(group.wrapping_add(1)), None);
    }
}

// ----------------------------------------------------------------------------
// Store and registry
// ----------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: stored handles are returned exactly as submitted
    #[test]
    fn prop_submitted_handles_round_trip(submission in submission_strategy()) {
        let rt = runtime();
        let repo = InMemoryReviewRepository::new();
        let stored = rt.block_on(async {
            let id = repo.create(submission).await.unwrap();
            repo.get(id).await.unwrap()
        });
        prop_assert_eq!(stored.encrypted_score, submission.encrypted_score);
        prop_assert_eq!(stored.encrypted_reviewer_group, submission.encrypted_reviewer_group);
        prop_assert_eq!(stored.encrypted_reviewee_group, submission.encrypted_reviewee_group);
        prop_assert!(!stored.is_calibrated());
    }

    /// Property: calibration can be set once and the first adjustment sticks
    #[test]
    fn prop_calibration_is_set_once(
        submission in submission_strategy(),
        first in handle_strategy(),
        second in handle_strategy(),
    ) {
        let rt = runtime();
        let repo = InMemoryReviewRepository::new();
        let (second_result, stored) = rt.block_on(async {
            let id = repo.create(submission).await.unwrap();
            repo.set_calibration(id, first).await.unwrap();
            let second_result = repo.set_calibration(id, second).await;
            (second_result, repo.get(id).await.unwrap())
        });
        prop_assert!(matches!(second_result, Err(DomainError::AlreadyCalibrated(_))));
        prop_assert_eq!(stored.encrypted_calibration_adjustment.handle(), Some(first));
    }

    /// Property: a registered token resolves exactly once, whatever the kind
    #[test]
    fn prop_token_resolves_once(raw_id in any::<u64>(), kind_index in 0usize..3) {
        let kind = [RequestKind::BiasAnalysis, RequestKind::Calibration, RequestKind::GroupStats][kind_index];
        let rt = runtime();
        let registry = RequestRegistry::default();
        let oracle = FixedTokenOracle(RequestToken(Uuid::new_v4()));
        let (first, second) = rt.block_on(async {
            let pending = registry
                .register(&oracle, &[], ReviewId(raw_id), kind)
                .await
                .unwrap();
            (registry.resolve(&pending.token).await, registry.resolve(&pending.token).await)
        });
        let first = first.unwrap();
        prop_assert_eq!(first.kind, kind);
        prop_assert_eq!(first.subject_id, ReviewId(raw_id));
        prop_assert!(matches!(second, Err(DomainError::UnknownRequest(_))));
    }
}

struct FixedTokenOracle(RequestToken);

#[async_trait::async_trait]
impl sealed_review::domain::ports::DecryptionOracle for FixedTokenOracle {
    async fn request_decryption(
        &self,
        _handles: &[CiphertextHandle],
        _kind: RequestKind,
    ) -> sealed_review::domain::errors::DomainResult<RequestToken> {
        Ok(self.0)
    }
}
