//! Bias analysis and one-time calibration of encrypted reviews.
//!
//! Every protocol has two halves. The request half fetches the ciphertexts a
//! computation needs, asks the oracle to decrypt them and registers the
//! returned token; it returns as soon as the token is registered. The callback
//! half runs when the oracle answers: it authenticates the response, consumes
//! the token, computes on the cleartexts and applies the result to the store
//! under the review's lock.
//!
//! Callback handling order:
//! 1. verify the proof (failure spends the token, returns `InvalidProof`)
//! 2. resolve the token (`UnknownRequest` / `Expired`)
//! 3. check the request kind and cleartext count
//! 4. mutate under the per-review lock, then publish events
//!
//! Rejected callbacks never mutate state and never publish events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::scoring::{bias_score, calibrated_score, is_biased};
use crate::domain::models::{
    AnalysisResult, BiasModel, CiphertextHandle, EncryptedReview, ModelId, NewBiasModel,
    NewReview, PendingRequest, RequestKind, RequestToken, ReviewId, ReviewState,
};
use crate::domain::ports::{
    BiasModelRepository, CiphertextBackend, DecryptionOracle, DecryptionResponse,
    GroupStatistics, ProofVerifier, ReviewRepository,
};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::request_registry::RequestRegistry;

/// What an accepted callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Bias fields of the review were written.
    Analyzed {
        review_id: ReviewId,
        result: AnalysisResult,
    },
    /// The review received its one calibration.
    Calibrated {
        review_id: ReviewId,
        result: AnalysisResult,
    },
    /// The review's score was folded into its reviewer group's baseline.
    GroupStatsRecorded {
        review_id: ReviewId,
        group: u32,
        /// Group average after this score.
        average: u32,
        /// Scores in the group after this one.
        samples: u64,
    },
}

impl CallbackOutcome {
    /// Review the callback was issued for.
    pub const fn review_id(&self) -> ReviewId {
        match self {
            Self::Analyzed { review_id, .. }
            | Self::Calibrated { review_id, .. }
            | Self::GroupStatsRecorded { review_id, .. } => *review_id,
        }
    }
}

/// Runs the three oracle protocols (bias analysis, calibration and group
/// statistics) against a review store and a bias model store.
///
/// Shared behind an `Arc` by request callers and the callback listener.
/// Callbacks for the same review are serialized by a per-review lock;
/// callbacks for different reviews run independently.
pub struct BiasCalibrationEngine<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    reviews: Arc<R>,
    models: Arc<M>,
    oracle: Arc<dyn DecryptionOracle>,
    verifier: Arc<dyn ProofVerifier>,
    backend: Arc<dyn CiphertextBackend>,
    statistics: Arc<dyn GroupStatistics>,
    registry: Arc<RequestRegistry>,
    event_bus: Arc<EventBus>,
    /// Entries exist only while a callback for the review holds or awaits
    /// the lock.
    record_locks: StdMutex<HashMap<ReviewId, Arc<Mutex<()>>>>,
}

impl<R, M> BiasCalibrationEngine<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    /// Wire an engine with its own registry and event bus.
    pub fn new(
        reviews: Arc<R>,
        models: Arc<M>,
        oracle: Arc<dyn DecryptionOracle>,
        verifier: Arc<dyn ProofVerifier>,
        backend: Arc<dyn CiphertextBackend>,
        statistics: Arc<dyn GroupStatistics>,
    ) -> Self {
        Self {
            reviews,
            models,
            oracle,
            verifier,
            backend,
            statistics,
            registry: Arc::new(RequestRegistry::default()),
            event_bus: Arc::new(EventBus::default()),
            record_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Share a registry with other components (e.g. the sweeper).
    pub fn with_registry(mut self, registry: Arc<RequestRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Publish events on a shared bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Registry shared with the listener and sweeper.
    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    /// Bus on which the engine publishes review events.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    // ---- records -------------------------------------------------------

    /// Store an encrypted review. It starts unanalyzed and uncalibrated.
    pub async fn submit_review(&self, submission: NewReview) -> DomainResult<ReviewId> {
        let review_id = self.reviews.create(submission).await?;
        let review = self.reviews.get(review_id).await?;

        tracing::info!(%review_id, "review submitted");
        self.event_bus.emit(EventPayload::ReviewSubmitted {
            review_id,
            submitted_at: review.created_at,
        });
        Ok(review_id)
    }

    /// Store an encrypted bias threshold and calibration range.
    pub async fn create_bias_model(&self, params: NewBiasModel) -> DomainResult<ModelId> {
        let model_id = self.models.create(params).await?;
        tracing::info!(%model_id, "bias model created");
        self.event_bus
            .emit(EventPayload::BiasModelCreated { model_id });
        Ok(model_id)
    }

    /// Fails with `ReviewNotFound` if absent.
    pub async fn get_review(&self, review_id: ReviewId) -> DomainResult<EncryptedReview> {
        self.reviews.get(review_id).await
    }

    /// Fails with `BiasModelNotFound` if absent.
    pub async fn get_bias_model(&self, model_id: ModelId) -> DomainResult<BiasModel> {
        self.models.get(model_id).await
    }

    /// Current analysis result of a review.
    pub async fn get_analysis(&self, review_id: ReviewId) -> DomainResult<AnalysisResult> {
        self.reviews.get_analysis(review_id).await
    }

    /// Lifecycle summary derived from the review's analysis record.
    pub async fn review_state(&self, review_id: ReviewId) -> DomainResult<ReviewState> {
        Ok(self.reviews.get_analysis(review_id).await?.state())
    }

    /// All reviews in id order.
    pub async fn list_reviews(&self) -> DomainResult<Vec<EncryptedReview>> {
        self.reviews.list().await
    }

    // ---- request half --------------------------------------------------

    /// Protocol A. Decrypts `[score, reviewer_group, reviewee_group,
    /// threshold]` in exactly that order.
    pub async fn request_bias_analysis(
        &self,
        review_id: ReviewId,
        model_id: ModelId,
    ) -> DomainResult<RequestToken> {
        let review = self.reviews.get(review_id).await?;
        let model = self.models.get(model_id).await?;

        let handles = [
            review.encrypted_score,
            review.encrypted_reviewer_group,
            review.encrypted_reviewee_group,
            model.encrypted_bias_threshold,
        ];
        let request = self
            .registry
            .register(self.oracle.as_ref(), &handles, review_id, RequestKind::BiasAnalysis)
            .await?;

        tracing::info!(%review_id, %model_id, token = %request.token, "bias analysis requested");
        self.event_bus.emit(EventPayload::AnalysisRequested {
            review_id,
            model_id,
            token: request.token,
        });
        Ok(request.token)
    }

    /// Protocol B. Decrypts `[score, adjustment]`. A review that is already
    /// calibrated is refused before the oracle is contacted.
    pub async fn request_calibration(
        &self,
        review_id: ReviewId,
        encrypted_adjustment: CiphertextHandle,
    ) -> DomainResult<RequestToken> {
        let review = self.reviews.get(review_id).await?;
        if review.is_calibrated() {
            return Err(DomainError::AlreadyCalibrated(review_id));
        }

        let handles = [review.encrypted_score, encrypted_adjustment];
        let request = self
            .registry
            .register(self.oracle.as_ref(), &handles, review_id, RequestKind::Calibration)
            .await?;

        tracing::info!(%review_id, token = %request.token, "calibration requested");
        self.event_bus.emit(EventPayload::CalibrationRequested {
            review_id,
            token: request.token,
        });
        Ok(request.token)
    }

    /// Protocol C. Decrypts `[reviewer_group, score]` so the score can be
    /// folded into its group's running average. Each review contributes at
    /// most once; a review that already has is refused before the oracle is
    /// contacted.
    pub async fn request_group_stats(&self, review_id: ReviewId) -> DomainResult<RequestToken> {
        let review = self.reviews.get(review_id).await?;
        if self.statistics.has_contributed(review_id) {
            return Err(DomainError::AlreadyContributed(review_id));
        }

        let handles = [review.encrypted_reviewer_group, review.encrypted_score];
        let request = self
            .registry
            .register(self.oracle.as_ref(), &handles, review_id, RequestKind::GroupStats)
            .await?;

        tracing::info!(%review_id, token = %request.token, "group stats requested");
        self.event_bus.emit(EventPayload::GroupStatsRequested {
            review_id,
            token: request.token,
        });
        Ok(request.token)
    }

    // ---- callback half -------------------------------------------------

    /// Route an oracle response by the kind its token was registered for.
    pub async fn handle_callback(
        &self,
        response: &DecryptionResponse,
    ) -> DomainResult<CallbackOutcome> {
        let request = self.accept(response, None).await?;
        let review_id = request.subject_id;
        let outcome = match request.kind {
            RequestKind::BiasAnalysis => CallbackOutcome::Analyzed {
                review_id,
                result: self.apply_bias_analysis(&request, &response.cleartexts).await?,
            },
            RequestKind::Calibration => CallbackOutcome::Calibrated {
                review_id,
                result: self.apply_calibration(&request, &response.cleartexts).await?,
            },
            RequestKind::GroupStats => {
                let (group, average, samples) =
                    self.apply_group_stats(&request, &response.cleartexts)?;
                CallbackOutcome::GroupStatsRecorded {
                    review_id,
                    group,
                    average,
                    samples,
                }
            }
        };
        Ok(outcome)
    }

    /// Protocol A callback. Fails with `GroupBaselineMissing` when a
    /// cross-group review's reviewer group has no average yet; the token is
    /// spent and the review stays unanalyzed.
    pub async fn on_bias_analysis_decrypted(
        &self,
        response: &DecryptionResponse,
    ) -> DomainResult<AnalysisResult> {
        let request = self.accept(response, Some(RequestKind::BiasAnalysis)).await?;
        self.apply_bias_analysis(&request, &response.cleartexts).await
    }

    /// Protocol B callback.
    pub async fn on_calibration_decrypted(
        &self,
        response: &DecryptionResponse,
    ) -> DomainResult<AnalysisResult> {
        let request = self.accept(response, Some(RequestKind::Calibration)).await?;
        self.apply_calibration(&request, &response.cleartexts).await
    }

    /// Returns the group's updated average.
    pub async fn on_group_stats_decrypted(&self, response: &DecryptionResponse) -> DomainResult<u32> {
        let request = self.accept(response, Some(RequestKind::GroupStats)).await?;
        let (_, average, _) = self.apply_group_stats(&request, &response.cleartexts)?;
        Ok(average)
    }

    /// Authenticate a response and consume its token.
    async fn accept(
        &self,
        response: &DecryptionResponse,
        expected: Option<RequestKind>,
    ) -> DomainResult<PendingRequest> {
        let token = response.token;

        if let Err(err) = self
            .verifier
            .verify(&token, &response.cleartexts, &response.proof)
        {
            let spent = self.registry.discard(&token);
            tracing::warn!(
                target: "security",
                %token,
                review_id = ?spent.as_ref().map(|r| r.subject_id),
                error = %err,
                "rejected oracle callback with invalid proof"
            );
            return Err(DomainError::InvalidProof(token));
        }

        let request = self.registry.resolve(&token).await.map_err(|err| {
            tracing::warn!(target: "security", %token, error = %err, "rejected oracle callback");
            err
        })?;

        if let Some(expected) = expected {
            if request.kind != expected {
                tracing::warn!(
                    %token,
                    review_id = %request.subject_id,
                    %expected,
                    actual = %request.kind,
                    "callback delivered to the wrong handler"
                );
                return Err(DomainError::RequestKindMismatch {
                    token,
                    expected,
                    actual: request.kind,
                });
            }
        }

        let arity = request.kind.cleartext_arity();
        if response.cleartexts.len() != arity {
            tracing::warn!(
                %token,
                review_id = %request.subject_id,
                expected = arity,
                actual = response.cleartexts.len(),
                "callback carried the wrong number of cleartexts"
            );
            return Err(DomainError::MalformedCleartexts {
                token,
                expected: arity,
                actual: response.cleartexts.len(),
            });
        }

        Ok(request)
    }

    async fn apply_bias_analysis(
        &self,
        request: &PendingRequest,
        cleartexts: &[u32],
    ) -> DomainResult<AnalysisResult> {
        let &[score, reviewer_group, reviewee_group, threshold] = cleartexts else {
            return Err(malformed(request, cleartexts));
        };
        let review_id = request.subject_id;

        let group_average = self.statistics.average(reviewer_group);
        if group_average.is_none() && reviewer_group != reviewee_group {
            tracing::warn!(%review_id, token = %request.token, "bias analysis not applied: reviewer group has no baseline");
            return Err(DomainError::GroupBaselineMissing(reviewer_group));
        }
        // Only read for cross-group reviews, which have a baseline here.
        let group_average = group_average.unwrap_or_default();
        let bias = bias_score(score, reviewer_group, reviewee_group, group_average);
        let biased = is_biased(bias, threshold);

        let lock = self.record_lock(review_id);
        let applied = async {
            let _guard = lock.lock().await;
            let mut analysis = self.reviews.get_analysis(review_id).await?;
            analysis.record_bias(bias, biased);
            self.reviews.update_analysis(review_id, analysis).await?;
            Ok::<_, DomainError>(analysis)
        }
        .await;
        self.release_record_lock(review_id, &lock);
        let result = applied?;

        tracing::info!(%review_id, token = %request.token, is_biased = biased, "bias analysis applied");
        tracing::debug!(%review_id, bias_score = bias, group_average, "bias analysis detail");
        if biased {
            self.event_bus.emit(EventPayload::BiasDetected {
                review_id,
                bias_score: bias,
            });
        }

        Ok(result)
    }

    async fn apply_calibration(
        &self,
        request: &PendingRequest,
        cleartexts: &[u32],
    ) -> DomainResult<AnalysisResult> {
        let &[original_score, adjustment] = cleartexts else {
            return Err(malformed(request, cleartexts));
        };
        let review_id = request.subject_id;
        let calibrated = calibrated_score(original_score, adjustment);

        let lock = self.record_lock(review_id);
        let applied = async {
            let _guard = lock.lock().await;
            let sealed = self.backend.encrypt_u32(calibrated)?;
            self.reviews
                .complete_calibration(review_id, sealed, calibrated)
                .await
        }
        .await;
        self.release_record_lock(review_id, &lock);
        let result = applied.map_err(|err| {
            tracing::warn!(%review_id, token = %request.token, error = %err, "calibration not applied");
            err
        })?;

        tracing::info!(%review_id, token = %request.token, "review calibrated");
        self.event_bus
            .emit(EventPayload::ReviewCalibrated { review_id });

        Ok(result)
    }

    /// Returns `(group, average, samples)` after recording the score.
    fn apply_group_stats(
        &self,
        request: &PendingRequest,
        cleartexts: &[u32],
    ) -> DomainResult<(u32, u32, u64)> {
        let &[group, score] = cleartexts else {
            return Err(malformed(request, cleartexts));
        };
        let review_id = request.subject_id;

        if !self.statistics.record_contribution(review_id, group, score) {
            tracing::warn!(%review_id, token = %request.token, "group statistics not updated: review already contributed");
            return Err(DomainError::AlreadyContributed(review_id));
        }
        // Non-empty after the contribution above.
        let average = self.statistics.average(group).unwrap_or(score);
        let samples = self.statistics.sample_count(group);

        tracing::info!(%review_id, group, samples, "group statistics updated");
        self.event_bus.emit(EventPayload::GroupStatsUpdated {
            group,
            average,
            samples,
        });

        Ok((group, average, samples))
    }

    fn record_lock(&self, review_id: ReviewId) -> Arc<Mutex<()>> {
        self.record_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(review_id)
            .or_default()
            .clone()
    }

    /// Drop the review's lock entry once no other callback holds or awaits it.
    fn release_record_lock(&self, review_id: ReviewId, lock: &Arc<Mutex<()>>) {
        let mut locks = self
            .record_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map's reference plus ours. Clones are only taken under `locks`.
        if Arc::strong_count(lock) == 2 {
            locks.remove(&review_id);
        }
    }
}

fn malformed(request: &PendingRequest, cleartexts: &[u32]) -> DomainError {
    DomainError::MalformedCleartexts {
        token: request.token,
        expected: request.kind.cleartext_arity(),
        actual: cleartexts.len(),
    }
}
