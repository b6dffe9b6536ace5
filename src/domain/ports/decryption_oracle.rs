//! Contract with the trusted external decryption service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{CiphertextHandle, DecryptionProof, RequestKind, RequestToken};

/// Asynchronous decryption service.
///
/// `request_decryption` returns as soon as the oracle has accepted the
/// request. The cleartexts arrive later as a [`DecryptionResponse`] on a
/// separate path, at most once per token, in no particular order relative to
/// other requests.
#[async_trait]
pub trait DecryptionOracle: Send + Sync {
    /// Queue decryption of `handles`. The returned token must be unique among
    /// currently outstanding requests.
    async fn request_decryption(
        &self,
        handles: &[CiphertextHandle],
        kind: RequestKind,
    ) -> DomainResult<RequestToken>;
}

/// Delivered by the oracle when a request completes. `cleartexts` follows
/// the order of the requested handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionResponse {
    pub token: RequestToken,
    /// Decrypted values in request order.
    pub cleartexts: Vec<u32>,
    /// Oracle signature over token and cleartexts.
    pub proof: DecryptionProof,
}
