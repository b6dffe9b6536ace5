//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that infrastructure adapters implement:
//! - ReviewRepository / BiasModelRepository: record storage
//! - DecryptionOracle: asynchronous decryption by a trusted external service
//! - ProofVerifier: authentication of oracle responses
//! - CiphertextBackend: opaque encrypted arithmetic
//! - GroupStatistics: per-group score aggregates
//!
//! The calibration engine depends only on these traits.

pub mod bias_model_repository;
pub mod ciphertext_backend;
pub mod decryption_oracle;
pub mod group_statistics;
pub mod proof_verifier;
pub mod review_repository;

pub use bias_model_repository::BiasModelRepository;
pub use ciphertext_backend::CiphertextBackend;
pub use decryption_oracle::{DecryptionOracle, DecryptionResponse};
pub use group_statistics::GroupStatistics;
pub use proof_verifier::ProofVerifier;
pub use review_repository::ReviewRepository;
