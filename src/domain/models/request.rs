//! Outstanding decryption requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use uuid::Uuid;

use super::ids::ReviewId;

/// Single-use correlation id between a decryption request and its callback.
/// Assigned by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub Uuid);

impl RequestToken {
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The operation a decryption was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    BiasAnalysis,
    Calibration,
    GroupStats,
}

impl RequestKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BiasAnalysis => "bias_analysis",
            Self::Calibration => "calibration",
            Self::GroupStats => "group_stats",
        }
    }

    /// Number of cleartexts the callback for this kind must carry.
    ///
    /// - bias analysis: `[score, reviewer_group, reviewee_group, threshold]`
    /// - calibration: `[score, adjustment]`
    /// - group stats: `[reviewer_group, score]`
    pub const fn cleartext_arity(&self) -> usize {
        match self {
            Self::BiasAnalysis => 4,
            Self::Calibration | Self::GroupStats => 2,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bias_analysis" => Ok(Self::BiasAnalysis),
            "calibration" => Ok(Self::Calibration),
            "group_stats" => Ok(Self::GroupStats),
            other => Err(format!("unknown request kind: {other}")),
        }
    }
}

/// Registry entry tying a token to the review it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub token: RequestToken,
    /// Review the request was issued for.
    pub subject_id: ReviewId,
    pub kind: RequestKind,
    /// Registration time, used for expiry.
    pub issued_at: Instant,
}

impl PendingRequest {
    /// Record a request issued now.
    pub fn new(token: RequestToken, subject_id: ReviewId, kind: RequestKind) -> Self {
        Self {
            token,
            subject_id,
            kind,
            issued_at: Instant::now(),
        }
    }
}
