//! Encrypted review records and their analysis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ciphertext::{CiphertextHandle, EncryptedValue};
use super::ids::ReviewId;

/// Ciphertexts supplied when a review is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub encrypted_score: CiphertextHandle,
    pub encrypted_reviewer_group: CiphertextHandle,
    pub encrypted_reviewee_group: CiphertextHandle,
}

/// A stored review. Everything except the calibration adjustment is fixed at
/// creation; the adjustment is set at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedReview {
    pub id: ReviewId,
    pub encrypted_score: CiphertextHandle,
    pub encrypted_reviewer_group: CiphertextHandle,
    pub encrypted_reviewee_group: CiphertextHandle,
    pub encrypted_calibration_adjustment: EncryptedValue,
    pub created_at: DateTime<Utc>,
}

impl EncryptedReview {
    pub fn new(id: ReviewId, submission: NewReview, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            encrypted_score: submission.encrypted_score,
            encrypted_reviewer_group: submission.encrypted_reviewer_group,
            encrypted_reviewee_group: submission.encrypted_reviewee_group,
            encrypted_calibration_adjustment: EncryptedValue::uninitialized(),
            created_at,
        }
    }

    /// Whether a calibration adjustment has been set.
    pub const fn is_calibrated(&self) -> bool {
        self.encrypted_calibration_adjustment.is_initialized()
    }
}

/// Derived scores for one review. Created zeroed alongside the review.
///
/// `bias_score`/`is_biased` only mean something once `is_analyzed` is set;
/// `calibrated_score` only once `is_calibrated` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub bias_score: u32,
    pub calibrated_score: u32,
    pub is_biased: bool,
    pub is_calibrated: bool,
    pub is_analyzed: bool,
}

impl AnalysisResult {
    /// Record the outcome of a bias-analysis round. Re-analysis overwrites
    /// earlier bias fields and never touches calibration.
    pub fn record_bias(&mut self, bias_score: u32, is_biased: bool) {
        self.bias_score = bias_score;
        self.is_biased = is_biased;
        self.is_analyzed = true;
    }

    /// Mark calibrated with the final score. Bias fields are left as they are.
    pub fn record_calibration(&mut self, calibrated_score: u32) {
        self.calibrated_score = calibrated_score;
        self.is_calibrated = true;
    }

    /// Lifecycle summary of this result.
    pub const fn state(&self) -> ReviewState {
        let analysis = match (self.is_analyzed, self.is_biased) {
            (false, _) => AnalysisState::Pending,
            (true, false) => AnalysisState::Clear,
            (true, true) => AnalysisState::Biased,
        };
        ReviewState {
            analysis,
            calibrated: self.is_calibrated,
        }
    }
}

/// Where a review stands in the bias-analysis protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisState {
    Pending,
    Clear,
    Biased,
}

impl AnalysisState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Clear => "clear",
            Self::Biased => "biased",
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis and calibration are orthogonal; calibration is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    pub analysis: AnalysisState,
    pub calibrated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut result = AnalysisResult::default();
        assert_eq!(result.state().analysis, AnalysisState::Pending);
        assert!(!result.state().calibrated);

        result.record_bias(15, true);
        assert_eq!(result.state().analysis, AnalysisState::Biased);

        result.record_calibration(85);
        result.record_bias(0, false);
        let state = result.state();
        assert_eq!(state.analysis, AnalysisState::Clear);
        assert!(state.calibrated);
        assert_eq!(result.calibrated_score, 85);
    }

    #[test]
    fn test_new_review_is_uncalibrated() {
        let submission = NewReview {
            encrypted_score: CiphertextHandle([1; 32]),
            encrypted_reviewer_group: CiphertextHandle([2; 32]),
            encrypted_reviewee_group: CiphertextHandle([3; 32]),
        };
        let review = EncryptedReview::new(ReviewId(1), submission, Utc::now());
        assert!(!review.is_calibrated());
        assert_eq!(review.encrypted_score, submission.encrypted_score);
    }
}
