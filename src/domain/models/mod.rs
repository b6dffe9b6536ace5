//! Domain models for the sealed review system.

pub mod bias_model;
pub mod ciphertext;
pub mod config;
pub mod ids;
pub mod proof;
pub mod request;
pub mod review;
pub mod scoring;

pub use bias_model::{BiasModel, NewBiasModel};
pub use ciphertext::{CiphertextHandle, EncryptedValue};
pub use config::{
    Config, DatabaseConfig, EventsConfig, LoggingConfig, OracleConfig, RegistryConfig,
    StorageBackend,
};
pub use ids::{IdAllocator, ModelId, ReviewId};
pub use proof::{decryption_digest, DecryptionProof};
pub use request::{PendingRequest, RequestKind, RequestToken};
pub use review::{AnalysisResult, AnalysisState, EncryptedReview, NewReview, ReviewState};
