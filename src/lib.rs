//! sealed-review: confidential review scoring
//!
//! Reviews arrive as ciphertext handles. Bias analysis and one-time
//! calibration are computed by asking a trusted decryption oracle to decrypt
//! exactly the values a computation needs; the oracle answers asynchronously
//! with signed cleartexts, and the engine applies the result only after the
//! signature checks out and the single-use request token is consumed.
//!
//! # Architecture
//!
//! Hexagonal layout:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): in-memory and SQLite stores, local oracle,
//!   ed25519 proof verification
//! - **Service Layer** (`services`): calibration engine, request registry,
//!   event bus, callback listener, expiry sweeper
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use sealed_review::services::BiasCalibrationEngine;
//!
//! let token = engine.request_bias_analysis(review_id, model_id).await?;
//! // ... the oracle answers later; the callback listener applies it.
//! let analysis = engine.get_analysis(review_id).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AnalysisResult, AnalysisState, BiasModel, CiphertextHandle, Config, EncryptedReview,
    EncryptedValue, ModelId, NewBiasModel, NewReview, RequestKind, RequestToken, ReviewId,
    ReviewState,
};
pub use domain::ports::{
    BiasModelRepository, CiphertextBackend, DecryptionOracle, DecryptionResponse,
    GroupStatistics, ProofVerifier, ReviewRepository,
};
pub use domain::{DomainError, DomainResult, ErrorKind};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{BiasCalibrationEngine, CallbackOutcome, EventBus, RequestRegistry};
