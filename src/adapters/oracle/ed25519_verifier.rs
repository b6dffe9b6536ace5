//! Ed25519 verification of oracle decryption proofs.

use ed25519_dalek::{Signature, VerifyingKey};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{decryption_digest, DecryptionProof, RequestToken};
use crate::domain::ports::ProofVerifier;

/// Accepts a proof only if it is the trusted oracle key's signature over
/// [`decryption_digest`] of the response.
#[derive(Debug, Clone)]
pub struct Ed25519ProofVerifier {
    key: VerifyingKey,
}

impl Ed25519ProofVerifier {
    pub const fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse a 32-byte verifying key from hex.
    pub fn from_hex(key_hex: &str) -> DomainResult<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| DomainError::SerializationError(format!("oracle verifying key: {e}")))?;
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            DomainError::SerializationError("oracle verifying key must be 32 bytes".to_string())
        })?;
        let key = VerifyingKey::from_bytes(&array)
            .map_err(|e| DomainError::SerializationError(format!("oracle verifying key: {e}")))?;
        Ok(Self::new(key))
    }

    pub const fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }
}

impl ProofVerifier for Ed25519ProofVerifier {
    fn verify(
        &self,
        token: &RequestToken,
        cleartexts: &[u32],
        proof: &DecryptionProof,
    ) -> DomainResult<()> {
        let signature = Signature::from_slice(proof.as_bytes())
            .map_err(|_| DomainError::InvalidProof(*token))?;
        let digest = decryption_digest(token, cleartexts);
        self.key
            .verify_strict(&digest, &signature)
            .map_err(|_| DomainError::InvalidProof(*token))
    }
}
