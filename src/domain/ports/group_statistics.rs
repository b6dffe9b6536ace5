//! Group score baselines.
//!
//! Bias analysis compares a review's score with the average of its reviewer
//! group. Scores enter an aggregate either as contributions from the
//! group-stats protocol, at most one per review, or as unattributed samples
//! loaded from elsewhere.

use crate::domain::models::ReviewId;

/// Per-group score aggregates used as the baseline for bias scoring.
pub trait GroupStatistics: Send + Sync {
    /// Fold an unattributed score into `group`'s aggregate.
    fn record_score(&self, group: u32, score: u32);

    /// Fold `review_id`'s score into `group`'s aggregate. Returns `false`
    /// and records nothing if that review has already contributed.
    fn record_contribution(&self, review_id: ReviewId, group: u32, score: u32) -> bool;

    /// Whether `review_id` has already contributed a score to any group.
    fn has_contributed(&self, review_id: ReviewId) -> bool;

    /// Aggregate score for `group`, or `None` before any score was recorded.
    fn average(&self, group: u32) -> Option<u32>;

    /// Number of scores folded into `group`'s aggregate.
    fn sample_count(&self, group: u32) -> u64;
}
