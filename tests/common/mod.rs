//! Common test utilities for integration tests
//!
//! Builds an engine over real adapters and the in-process oracle, with the
//! oracle's response channel and the event stream left in the test's hands
//! so callbacks can be delivered, replayed or forged explicitly.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use tokio::sync::{broadcast, mpsc};

use sealed_review::adapters::memory::{
    InMemoryBiasModelRepository, InMemoryReviewRepository, RunningMeanGroupStatistics,
};
use sealed_review::adapters::oracle::{
    CiphertextVault, Ed25519ProofVerifier, LocalDecryptionOracle, MockCiphertextBackend,
};
use sealed_review::domain::models::{ModelId, NewBiasModel, NewReview, ReviewId};
use sealed_review::domain::ports::{BiasModelRepository, DecryptionResponse, ReviewRepository};
use sealed_review::services::{BiasCalibrationEngine, EventBus, ReviewEvent, RequestRegistry};

pub const ORACLE_SEED: [u8; 32] = [42; 32];

pub struct Harness<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    pub engine: Arc<BiasCalibrationEngine<R, M>>,
    pub oracle: Arc<LocalDecryptionOracle>,
    pub vault: CiphertextVault,
    pub statistics: Arc<RunningMeanGroupStatistics>,
    pub registry: Arc<RequestRegistry>,
    pub responses: mpsc::Receiver<DecryptionResponse>,
    pub events: broadcast::Receiver<ReviewEvent>,
}

pub type MemoryHarness = Harness<InMemoryReviewRepository, InMemoryBiasModelRepository>;

pub fn memory_harness() -> MemoryHarness {
    Harness::with_stores(
        Arc::new(InMemoryReviewRepository::new()),
        Arc::new(InMemoryBiasModelRepository::new()),
        RequestRegistry::default(),
    )
}

/// In-memory harness whose requests time out after `timeout`.
pub fn memory_harness_with_timeout(timeout: Duration) -> MemoryHarness {
    Harness::with_stores(
        Arc::new(InMemoryReviewRepository::new()),
        Arc::new(InMemoryBiasModelRepository::new()),
        RequestRegistry::new(timeout, timeout * 10),
    )
}

impl<R, M> Harness<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    pub fn with_stores(reviews: Arc<R>, models: Arc<M>, registry: RequestRegistry) -> Self {
        let vault = CiphertextVault::new();
        let (oracle, responses) =
            LocalDecryptionOracle::new(vault.clone(), SigningKey::from_bytes(&ORACLE_SEED), 64);
        let oracle = Arc::new(oracle);
        let statistics = Arc::new(RunningMeanGroupStatistics::new());
        let registry = Arc::new(registry);
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();

        let engine = BiasCalibrationEngine::new(
            reviews,
            models,
            oracle.clone(),
            Arc::new(Ed25519ProofVerifier::new(oracle.verifying_key())),
            Arc::new(MockCiphertextBackend::new(vault.clone())),
            statistics.clone(),
        )
        .with_registry(registry.clone())
        .with_event_bus(bus);

        Self {
            engine: Arc::new(engine),
            oracle,
            vault,
            statistics,
            registry,
            responses,
            events,
        }
    }

    pub async fn review(&self, score: u32, reviewer_group: u32, reviewee_group: u32) -> ReviewId {
        self.engine
            .submit_review(NewReview {
                encrypted_score: self.vault.seal(score),
                encrypted_reviewer_group: self.vault.seal(reviewer_group),
                encrypted_reviewee_group: self.vault.seal(reviewee_group),
            })
            .await
            .expect("submit review")
    }

    pub async fn model(&self, threshold: u32) -> ModelId {
        self.engine
            .create_bias_model(NewBiasModel {
                encrypted_bias_threshold: self.vault.seal(threshold),
                encrypted_calibration_range: self.vault.seal(20),
            })
            .await
            .expect("create bias model")
    }

    /// Next oracle response, failing the test if none arrives promptly.
    pub async fn next_response(&mut self) -> DecryptionResponse {
        tokio::time::timeout(Duration::from_secs(5), self.responses.recv())
            .await
            .expect("oracle response within 5s")
            .expect("oracle channel open")
    }

    /// Names of all events published since the last drain.
    pub fn drain_events(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            names.push(event.payload.name());
        }
        names
    }
}
