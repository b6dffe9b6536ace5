//! In-process stand-ins for the external encrypted-computation service.
//!
//! [`CiphertextVault`] maps handles to plaintext so that
//! [`MockCiphertextBackend`] and [`LocalDecryptionOracle`] can share state
//! and a full request/callback round-trip runs without a real FHE library.
//! [`Ed25519ProofVerifier`] is production code: it only needs the oracle's
//! public key.

pub mod ed25519_verifier;
pub mod local_oracle;
pub mod mock_backend;
pub mod vault;

pub use ed25519_verifier::Ed25519ProofVerifier;
pub use local_oracle::{LocalDecryptionOracle, OracleBehavior};
pub use mock_backend::MockCiphertextBackend;
pub use vault::CiphertextVault;
