//! `sealed-review simulate`: one full protocol round in-process.
//!
//! Seals the supplied cleartexts into a local vault, then drives the engine
//! through the same request/callback path a deployment would use: the local
//! oracle signs and delivers responses asynchronously, the callback listener
//! feeds them to the engine, and the sweeper expires anything left hanging.

use anyhow::{bail, Context, Result};
use clap::Args;
use ed25519_dalek::SigningKey;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::adapters::memory::{
    InMemoryBiasModelRepository, InMemoryReviewRepository, RunningMeanGroupStatistics,
};
use crate::adapters::oracle::{
    CiphertextVault, Ed25519ProofVerifier, LocalDecryptionOracle, MockCiphertextBackend,
};
use crate::adapters::sqlite::connection::database_url;
use crate::adapters::sqlite::{
    initialize_database, PoolConfig, SqliteBiasModelRepository, SqliteReviewRepository,
};
use crate::cli::output::{key_value_table, output, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{
    AnalysisResult, Config, ModelId, NewBiasModel, NewReview, ReviewId, ReviewState,
    StorageBackend,
};
use crate::domain::ports::{BiasModelRepository, GroupStatistics, ReviewRepository};
use crate::services::{
    BiasCalibrationEngine, CallbackListener, CallbackOutcome, EventBus, EventBusConfig,
    RegistrySweeper, RequestRegistry, SweeperConfig,
};

/// Arguments for `simulate`.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Performance score given by the reviewer
    #[arg(long, default_value_t = 90)]
    pub score: u32,

    /// Reviewer's group
    #[arg(long, default_value_t = 2)]
    pub reviewer_group: u32,

    /// Reviewee's group
    #[arg(long, default_value_t = 1)]
    pub reviewee_group: u32,

    /// Bias threshold of the bias model
    #[arg(long, default_value_t = 10)]
    pub threshold: u32,

    /// Calibration range of the bias model
    #[arg(long, default_value_t = 20)]
    pub calibration_range: u32,

    /// Calibration adjustment added to the score
    #[arg(long, default_value_t = 5)]
    pub adjustment: u32,

    /// Earlier scores from the reviewer's group (comma-separated), folded
    /// into the group average before analysis. A cross-group review needs
    /// at least one
    #[arg(long, value_delimiter = ',', default_values_t = [70, 80])]
    pub baseline: Vec<u32>,

    /// Override the configured storage backend (memory, sqlite)
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<StorageBackend>,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            score: 90,
            reviewer_group: 2,
            reviewee_group: 1,
            threshold: 10,
            calibration_range: 20,
            adjustment: 5,
            baseline: vec![70, 80],
            backend: None,
        }
    }
}

fn parse_backend(s: &str) -> Result<StorageBackend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(StorageBackend::Memory),
        "sqlite" => Ok(StorageBackend::Sqlite),
        other => Err(format!("unknown backend '{other}', expected memory or sqlite")),
    }
}

/// Result of one simulated round.
#[derive(Debug, Serialize)]
pub struct SimulationOutput {
    pub review_id: ReviewId,
    pub model_id: ModelId,
    pub backend: StorageBackend,
    /// Reviewer group average after the baseline round.
    pub group_average: Option<u32>,
    pub group_samples: u64,
    pub state: ReviewState,
    pub analysis: AnalysisResult,
    /// How the deliberate second calibration was answered.
    pub recalibration: String,
    pub events: Vec<String>,
}

impl CommandOutput for SimulationOutput {
    fn to_human(&self) -> String {
        let average = self
            .group_average
            .map_or_else(|| "none".to_string(), |avg| avg.to_string());
        let table = key_value_table([
            ("review", self.review_id.to_string()),
            ("bias model", self.model_id.to_string()),
            ("group average", format!("{average} ({} samples)", self.group_samples)),
            ("analysis", self.state.analysis.to_string()),
            ("bias score", self.analysis.bias_score.to_string()),
            ("calibrated", self.state.calibrated.to_string()),
            ("calibrated score", self.analysis.calibrated_score.to_string()),
            ("second calibration", self.recalibration.clone()),
        ]);

        let mut lines = vec![table.to_string(), String::new(), "Events:".to_string()];
        lines.extend(self.events.iter().map(|event| format!("  {event}")));
        lines.join("\n")
    }
}

/// Run `simulate` against the configured (or overridden) backend.
pub async fn execute(args: SimulateArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if let Some(backend) = args.backend {
        config.database.backend = backend;
    }

    let out = match config.database.backend {
        StorageBackend::Memory => {
            run_simulation(
                &args,
                &config,
                Arc::new(InMemoryReviewRepository::new()),
                Arc::new(InMemoryBiasModelRepository::new()),
            )
            .await?
        }
        StorageBackend::Sqlite => {
            let url = database_url(&config.database.path);
            let pool = initialize_database(&url, Some(PoolConfig::from(&config.database)))
                .await
                .with_context(|| format!("Failed to open database at {}", config.database.path))?;
            run_simulation(
                &args,
                &config,
                Arc::new(SqliteReviewRepository::new(pool.clone())),
                Arc::new(SqliteBiasModelRepository::new(pool)),
            )
            .await?
        }
    };

    output(&out, json_mode);
    Ok(())
}

/// Wire the engine over the given stores and run one round.
pub async fn run_simulation<R, M>(
    args: &SimulateArgs,
    config: &Config,
    reviews: Arc<R>,
    models: Arc<M>,
) -> Result<SimulationOutput>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    if args.baseline.is_empty() && args.reviewer_group != args.reviewee_group {
        bail!(
            "reviewer group {} has no baseline to score against; pass --baseline",
            args.reviewer_group
        );
    }

    let vault = CiphertextVault::new();
    let (oracle, responses) = LocalDecryptionOracle::new(
        vault.clone(),
        ephemeral_signing_key(),
        config.events.channel_capacity,
    );
    let oracle =
        Arc::new(oracle.with_delivery_delay(Duration::from_millis(config.oracle.delivery_delay_ms)));

    let verifier = match config.oracle.verifying_key_hex.as_deref() {
        Some(key_hex) => {
            let verifier = Ed25519ProofVerifier::from_hex(key_hex)?;
            if *verifier.verifying_key() != oracle.verifying_key() {
                bail!("oracle.verifying_key_hex does not match the local oracle; every callback would be rejected");
            }
            verifier
        }
        None => Ed25519ProofVerifier::new(oracle.verifying_key()),
    };

    let statistics = Arc::new(RunningMeanGroupStatistics::new());
    let registry = Arc::new(RequestRegistry::from_config(&config.registry));
    let bus = Arc::new(EventBus::new(EventBusConfig::from(&config.events)));
    let mut events = bus.subscribe();

    let engine = Arc::new(
        BiasCalibrationEngine::new(
            reviews,
            models,
            oracle.clone(),
            Arc::new(verifier),
            Arc::new(MockCiphertextBackend::new(vault.clone())),
            statistics.clone(),
        )
        .with_registry(registry.clone())
        .with_event_bus(bus.clone()),
    );

    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let listener = CallbackListener::new(engine.clone(), responses).with_outcomes(outcome_tx);
    let listener_handle = listener.handle();
    let listener_task = listener.spawn();

    let sweeper = RegistrySweeper::new(registry, SweeperConfig::from(&config.registry))
        .with_event_bus(bus.clone());
    let sweeper_handle = sweeper.handle();
    let sweeper_task = sweeper.spawn();

    let round = Round {
        engine: engine.as_ref(),
        vault: &vault,
        timeout: config.registry.request_timeout(),
    };
    let result = round.run(args, &mut outcomes).await;

    listener_handle.stop();
    sweeper_handle.stop();
    listener_task.await.context("callback listener panicked")?;
    sweeper_task.await.context("registry sweeper panicked")?;

    let (review_id, model_id, recalibration) = result?;

    let mut event_log = Vec::new();
    while let Ok(event) = events.try_recv() {
        event_log.push(format!("#{} {}", event.sequence, event.payload.name()));
    }

    Ok(SimulationOutput {
        review_id,
        model_id,
        backend: config.database.backend,
        group_average: statistics.average(args.reviewer_group),
        group_samples: statistics.sample_count(args.reviewer_group),
        state: engine.review_state(review_id).await?,
        analysis: engine.get_analysis(review_id).await?,
        recalibration,
        events: event_log,
    })
}

struct Round<'a, R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    engine: &'a BiasCalibrationEngine<R, M>,
    vault: &'a CiphertextVault,
    timeout: Duration,
}

impl<R, M> Round<'_, R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    async fn run(
        &self,
        args: &SimulateArgs,
        outcomes: &mut mpsc::UnboundedReceiver<CallbackOutcome>,
    ) -> Result<(ReviewId, ModelId, String)> {
        for &score in &args.baseline {
            let peer = self.submit(score, args.reviewer_group, args.reviewer_group).await?;
            self.engine.request_group_stats(peer).await?;
            self.next_outcome(outcomes).await?;
        }

        let review_id = self
            .submit(args.score, args.reviewer_group, args.reviewee_group)
            .await?;
        let model_id = self
            .engine
            .create_bias_model(NewBiasModel {
                encrypted_bias_threshold: self.vault.seal(args.threshold),
                encrypted_calibration_range: self.vault.seal(args.calibration_range),
            })
            .await?;

        self.engine.request_bias_analysis(review_id, model_id).await?;
        self.next_outcome(outcomes).await?;

        self.engine
            .request_calibration(review_id, self.vault.seal(args.adjustment))
            .await?;
        self.next_outcome(outcomes).await?;

        let recalibration = match self
            .engine
            .request_calibration(review_id, self.vault.seal(args.adjustment))
            .await
        {
            Err(DomainError::AlreadyCalibrated(_)) => "rejected: already calibrated".to_string(),
            Err(err) => return Err(err.into()),
            Ok(token) => bail!("second calibration of review {review_id} was accepted ({token})"),
        };

        Ok((review_id, model_id, recalibration))
    }

    async fn submit(&self, score: u32, reviewer_group: u32, reviewee_group: u32) -> Result<ReviewId> {
        Ok(self
            .engine
            .submit_review(NewReview {
                encrypted_score: self.vault.seal(score),
                encrypted_reviewer_group: self.vault.seal(reviewer_group),
                encrypted_reviewee_group: self.vault.seal(reviewee_group),
            })
            .await?)
    }

    async fn next_outcome(
        &self,
        outcomes: &mut mpsc::UnboundedReceiver<CallbackOutcome>,
    ) -> Result<CallbackOutcome> {
        tokio::time::timeout(self.timeout, outcomes.recv())
            .await
            .context("timed out waiting for the oracle callback")?
            .context("callback listener stopped")
    }
}

/// Fresh signing key for the in-process oracle.
fn ephemeral_signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    seed[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    seed[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    SigningKey::from_bytes(&seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AnalysisState;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("SQLite"), Ok(StorageBackend::Sqlite));
        assert_eq!(parse_backend("memory"), Ok(StorageBackend::Memory));
        assert!(parse_backend("postgres").is_err());
    }

    #[tokio::test]
    async fn test_simulation_round_with_baseline() {
        let args = SimulateArgs {
            baseline: vec![70, 80],
            ..SimulateArgs::default()
        };
        let out = run_simulation(
            &args,
            &Config::default(),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
        )
        .await
        .unwrap();

        assert_eq!(out.group_average, Some(75));
        assert_eq!(out.analysis.bias_score, 15);
        assert_eq!(out.state.analysis, AnalysisState::Biased);
        assert!(out.state.calibrated);
        assert_eq!(out.analysis.calibrated_score, 95);
        assert_eq!(out.recalibration, "rejected: already calibrated");
        assert!(out.events.iter().any(|e| e.ends_with("bias_detected")));
        assert!(out.to_human().contains("biased"));
    }

    #[tokio::test]
    async fn test_cross_group_round_without_baseline_is_refused() {
        let args = SimulateArgs {
            baseline: Vec::new(),
            ..SimulateArgs::default()
        };
        let err = run_simulation(
            &args,
            &Config::default(),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("--baseline"));
    }

    #[tokio::test]
    async fn test_same_group_round_runs_without_baseline() {
        let args = SimulateArgs {
            reviewee_group: 2,
            baseline: Vec::new(),
            ..SimulateArgs::default()
        };
        let out = run_simulation(
            &args,
            &Config::default(),
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
        )
        .await
        .unwrap();

        assert_eq!(out.group_average, None);
        assert_eq!(out.analysis.bias_score, 0);
        assert_eq!(out.state.analysis, AnalysisState::Clear);
        assert!(out.state.calibrated);
    }

    #[tokio::test]
    async fn test_mismatched_verifying_key_is_refused() {
        let mut config = Config::default();
        config.oracle.verifying_key_hex = Some(hex::encode(
            SigningKey::from_bytes(&[1; 32]).verifying_key().as_bytes(),
        ));
        let result = run_simulation(
            &SimulateArgs::default(),
            &config,
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
        )
        .await;
        assert!(result.is_err());
    }
}
