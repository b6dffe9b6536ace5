//! Bias models: encrypted threshold and calibration range.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ciphertext::CiphertextHandle;
use super::ids::ModelId;

/// Ciphertexts supplied when a bias model is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBiasModel {
    pub encrypted_bias_threshold: CiphertextHandle,
    pub encrypted_calibration_range: CiphertextHandle,
}

/// Bias-detection parameters referenced by reviews during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiasModel {
    pub id: ModelId,
    pub encrypted_bias_threshold: CiphertextHandle,
    pub encrypted_calibration_range: CiphertextHandle,
    pub created_at: DateTime<Utc>,
}

impl BiasModel {
    pub fn new(id: ModelId, params: NewBiasModel, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            encrypted_bias_threshold: params.encrypted_bias_threshold,
            encrypted_calibration_range: params.encrypted_calibration_range,
            created_at,
        }
    }
}
