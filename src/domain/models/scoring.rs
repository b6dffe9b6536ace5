//! Cleartext arithmetic applied once the oracle has decrypted a request.

/// Distance between a score and its reviewer group's average.
///
/// Same-group reviews score 0. Otherwise the absolute difference, so the
/// result never reflects unsigned wraparound.
pub const fn bias_score(
    performance_score: u32,
    reviewer_group: u32,
    reviewee_group: u32,
    group_average: u32,
) -> u32 {
    if reviewer_group == reviewee_group {
        0
    } else {
        performance_score.abs_diff(group_average)
    }
}

pub const fn is_biased(bias_score: u32, threshold: u32) -> bool {
    bias_score > threshold
}

/// Calibrated score with fixed-width u32 semantics: overflow wraps.
pub const fn calibrated_score(original_score: u32, adjustment: u32) -> u32 {
    original_score.wrapping_add(adjustment)
}
