//! Port for authenticating oracle responses.

use crate::domain::errors::DomainResult;
use crate::domain::models::{DecryptionProof, RequestToken};

/// Authenticates that `(token, cleartexts)` was produced by the oracle.
pub trait ProofVerifier: Send + Sync {
    /// Fails with `InvalidProof` when the proof does not authenticate the
    /// response.
    fn verify(
        &self,
        token: &RequestToken,
        cleartexts: &[u32],
        proof: &DecryptionProof,
    ) -> DomainResult<()>;
}
