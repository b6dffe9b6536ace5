//! In-process decryption oracle.
//!
//! Decrypts from a [`CiphertextVault`], signs each response with an ed25519
//! key, and delivers it on an mpsc channel from a spawned task, so callbacks
//! arrive asynchronously and unordered just like a remote oracle's.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    decryption_digest, CiphertextHandle, DecryptionProof, RequestKind, RequestToken,
};
use crate::domain::ports::{DecryptionOracle, DecryptionResponse};

use super::vault::CiphertextVault;

/// Fault injection switches for adversarial tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleBehavior {
    /// Corrupt the signature on every response.
    pub tamper_proofs: bool,
    /// Deliver every response twice.
    pub redeliver: bool,
    /// Keep responses back until [`LocalDecryptionOracle::take_withheld`].
    pub withhold: bool,
}

/// In-process oracle: reveals handles from the vault, signs the cleartexts
/// with its Ed25519 key and delivers the response on a channel.
pub struct LocalDecryptionOracle {
    vault: CiphertextVault,
    signing_key: SigningKey,
    responses: mpsc::Sender<DecryptionResponse>,
    delivery_delay: Duration,
    behavior: RwLock<OracleBehavior>,
    withheld: Mutex<Vec<DecryptionResponse>>,
    issued: AtomicU64,
}

impl LocalDecryptionOracle {
    /// Create the oracle and the receiving end of its response channel.
    pub fn new(
        vault: CiphertextVault,
        signing_key: SigningKey,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<DecryptionResponse>) {
        let (responses, rx) = mpsc::channel(capacity.max(1));
        let oracle = Self {
            vault,
            signing_key,
            responses,
            delivery_delay: Duration::ZERO,
            behavior: RwLock::new(OracleBehavior::default()),
            withheld: Mutex::new(Vec::new()),
            issued: AtomicU64::new(0),
        };
        (oracle, rx)
    }

    /// Wait `delay` before each delivery.
    pub const fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Public key matching the oracle's signatures.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Change fault injection for subsequent requests.
    pub fn set_behavior(&self, behavior: OracleBehavior) {
        *self.behavior.write().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn behavior(&self) -> OracleBehavior {
        *self.behavior.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of requests accepted so far.
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Build a correctly signed response for any token. Tests use this to
    /// forge callbacks for tokens the registry never issued.
    pub fn sign_response(&self, token: RequestToken, cleartexts: Vec<u32>) -> DecryptionResponse {
        let signature: Signature = self.signing_key.sign(&decryption_digest(&token, &cleartexts));
        DecryptionResponse {
            token,
            cleartexts,
            proof: DecryptionProof(signature.to_bytes().to_vec()),
        }
    }

    /// Drain responses held back while `withhold` was set.
    pub fn take_withheld(&self) -> Vec<DecryptionResponse> {
        std::mem::take(&mut *self.withheld.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn deliver(&self, response: DecryptionResponse, behavior: OracleBehavior) {
        if behavior.withhold {
            self.withheld
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(response);
            return;
        }

        let sender = self.responses.clone();
        let delay = self.delivery_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let copies = if behavior.redeliver { 2 } else { 1 };
            for _ in 0..copies {
                if sender.send(response.clone()).await.is_err() {
                    tracing::debug!(token = %response.token, "oracle response channel closed");
                    return;
                }
            }
        });
    }
}

#[async_trait]
impl DecryptionOracle for LocalDecryptionOracle {
    async fn request_decryption(
        &self,
        handles: &[CiphertextHandle],
        kind: RequestKind,
    ) -> DomainResult<RequestToken> {
        let cleartexts = self.vault.reveal_all(handles)?;
        let token = RequestToken(Uuid::new_v4());
        let behavior = self.behavior();

        let mut response = self.sign_response(token, cleartexts);
        if behavior.tamper_proofs {
            if let Some(byte) = response.proof.0.first_mut() {
                *byte ^= 0xff;
            }
        }

        self.issued.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%token, %kind, handles = handles.len(), "local oracle accepted request");
        self.deliver(response, behavior);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracle::Ed25519ProofVerifier;
    use crate::domain::errors::DomainError;
    use crate::domain::ports::ProofVerifier;

    fn oracle() -> (LocalDecryptionOracle, mpsc::Receiver<DecryptionResponse>, CiphertextVault) {
        let vault = CiphertextVault::new();
        let (oracle, rx) = LocalDecryptionOracle::new(vault.clone(), SigningKey::from_bytes(&[3; 32]), 16);
        (oracle, rx, vault)
    }

    #[tokio::test]
    async fn test_delivers_signed_cleartexts_in_request_order() {
        let (oracle, mut rx, vault) = oracle();
        let score = vault.seal(80);
        let adjustment = vault.seal(5);

        let token = oracle
            .request_decryption(&[score, adjustment], RequestKind::Calibration)
            .await
            .unwrap();

        let response = rx.recv().await.unwrap();
        assert_eq!(response.token, token);
        assert_eq!(response.cleartexts, vec![80, 5]);

        let verifier = Ed25519ProofVerifier::new(oracle.verifying_key());
        assert!(verifier.verify(&token, &response.cleartexts, &response.proof).is_ok());
        assert_eq!(oracle.issued_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_handle_fails_request() {
        let (oracle, _rx, _vault) = oracle();
        let result = oracle
            .request_decryption(&[CiphertextHandle([1; 32])], RequestKind::GroupStats)
            .await;
        assert!(matches!(result, Err(DomainError::Oracle(_))));
        assert_eq!(oracle.issued_count(), 0);
    }

    #[tokio::test]
    async fn test_tampered_proof_fails_verification() {
        let (oracle, mut rx, vault) = oracle();
        oracle.set_behavior(OracleBehavior {
            tamper_proofs: true,
            ..Default::default()
        });
        let score = vault.seal(1);
        let token = oracle
            .request_decryption(&[score], RequestKind::GroupStats)
            .await
            .unwrap();

        let response = rx.recv().await.unwrap();
        let verifier = Ed25519ProofVerifier::new(oracle.verifying_key());
        assert!(verifier.verify(&token, &response.cleartexts, &response.proof).is_err());
    }

    #[tokio::test]
    async fn test_withhold_and_redeliver() {
        let (oracle, mut rx, vault) = oracle();
        let score = vault.seal(1);

        oracle.set_behavior(OracleBehavior {
            withhold: true,
            ..Default::default()
        });
        oracle
            .request_decryption(&[score], RequestKind::GroupStats)
            .await
            .unwrap();
        assert_eq!(oracle.take_withheld().len(), 1);
        assert!(oracle.take_withheld().is_empty());

        oracle.set_behavior(OracleBehavior {
            redeliver: true,
            ..Default::default()
        });
        let token = oracle
            .request_decryption(&[score], RequestKind::GroupStats)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().token, token);
        assert_eq!(rx.recv().await.unwrap().token, token);
    }
}
