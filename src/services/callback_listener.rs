//! Drains oracle responses into the engine.
//!
//! The listener owns the receiving end of the oracle's response channel and
//! hands every response to [`BiasCalibrationEngine::handle_callback`].
//! Rejections are logged and counted; they never stop the listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::domain::errors::ErrorKind;
use crate::domain::ports::{BiasModelRepository, DecryptionResponse, ReviewRepository};
use crate::services::calibration_engine::{BiasCalibrationEngine, CallbackOutcome};

/// Counters reported by a running listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerStatus {
    pub running: bool,
    pub accepted: u64,
    /// Includes security rejections.
    pub rejected: u64,
    /// Rejections that were security events (unknown token or bad proof).
    pub security_rejections: u64,
}

/// Why the listener exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    ChannelClosed,
}

/// Control handle for a spawned [`CallbackListener`].
#[derive(Clone)]
pub struct ListenerHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<ListenerStatus>>,
}

impl ListenerHandle {
    /// Ask the listener to exit after the response it is processing.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Snapshot of the listener counters.
    pub async fn status(&self) -> ListenerStatus {
        self.status.read().await.clone()
    }
}

/// Background task feeding oracle responses to the engine, one at a time.
pub struct CallbackListener<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    engine: Arc<BiasCalibrationEngine<R, M>>,
    responses: mpsc::Receiver<DecryptionResponse>,
    outcomes: Option<mpsc::UnboundedSender<CallbackOutcome>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<ListenerStatus>>,
}

impl<R, M> CallbackListener<R, M>
where
    R: ReviewRepository + 'static,
    M: BiasModelRepository + 'static,
{
    pub fn new(
        engine: Arc<BiasCalibrationEngine<R, M>>,
        responses: mpsc::Receiver<DecryptionResponse>,
    ) -> Self {
        Self {
            engine,
            responses,
            outcomes: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            status: Arc::new(RwLock::new(ListenerStatus::default())),
        }
    }

    /// Forward every accepted outcome to `outcomes`.
    pub fn with_outcomes(mut self, outcomes: mpsc::UnboundedSender<CallbackOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    /// Handle for stopping and inspecting the listener once spawned.
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
            status: self.status.clone(),
        }
    }

    /// Run the listener until stopped or until the response channel closes.
    pub fn spawn(self) -> JoinHandle<StopReason> {
        tokio::spawn(self.run())
    }

    /// Process responses until stopped or the oracle hangs up.
    pub async fn run(mut self) -> StopReason {
        self.status.write().await.running = true;

        let reason = loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }
            tokio::select! {
                received = self.responses.recv() => match received {
                    Some(response) => self.process(&response).await,
                    None => break StopReason::ChannelClosed,
                },
                () = self.wake.notified() => {}
            }
        };

        self.status.write().await.running = false;
        tracing::info!(?reason, "callback listener stopped");
        reason
    }

    async fn process(&self, response: &DecryptionResponse) {
        match self.engine.handle_callback(response).await {
            Ok(outcome) => {
                self.status.write().await.accepted += 1;
                if let Some(ref outcomes) = self.outcomes {
                    // Receiver may have gone away; nothing to do.
                    let _ = outcomes.send(outcome);
                }
            }
            Err(err) => {
                let mut status = self.status.write().await;
                status.rejected += 1;
                if err.is_security_event() {
                    status.security_rejections += 1;
                }
                match err.kind() {
                    ErrorKind::Infrastructure => {
                        tracing::error!(token = %response.token, error = %err, "callback failed");
                    }
                    _ => tracing::debug!(token = %response.token, error = %err, "callback rejected"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        InMemoryBiasModelRepository, InMemoryReviewRepository, RunningMeanGroupStatistics,
    };
    use crate::adapters::oracle::{
        CiphertextVault, Ed25519ProofVerifier, LocalDecryptionOracle, MockCiphertextBackend,
        OracleBehavior,
    };
    use crate::domain::models::NewReview;
    use ed25519_dalek::SigningKey;

    #[tokio::test]
    async fn test_redelivered_callbacks_apply_once() {
        let vault = CiphertextVault::new();
        let (oracle, responses) =
            LocalDecryptionOracle::new(vault.clone(), SigningKey::from_bytes(&[5; 32]), 16);
        let oracle = Arc::new(oracle);
        oracle.set_behavior(OracleBehavior {
            redeliver: true,
            ..Default::default()
        });

        let engine = Arc::new(BiasCalibrationEngine::new(
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
            oracle.clone(),
            Arc::new(Ed25519ProofVerifier::new(oracle.verifying_key())),
            Arc::new(MockCiphertextBackend::new(vault.clone())),
            Arc::new(RunningMeanGroupStatistics::new()),
        ));

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let listener = CallbackListener::new(engine.clone(), responses).with_outcomes(outcome_tx);
        let handle = listener.handle();
        let task = listener.spawn();

        let review_id = engine
            .submit_review(NewReview {
                encrypted_score: vault.seal(80),
                encrypted_reviewer_group: vault.seal(1),
                encrypted_reviewee_group: vault.seal(1),
            })
            .await
            .unwrap();
        engine
            .request_calibration(review_id, vault.seal(5))
            .await
            .unwrap();

        let outcome = outcome_rx.recv().await.unwrap();
        assert!(matches!(outcome, CallbackOutcome::Calibrated { result, .. } if result.calibrated_score == 85));

        // Wait for the duplicate to be drained.
        while handle.status().await.rejected == 0 {
            tokio::task::yield_now().await;
        }
        let status = handle.status().await;
        assert_eq!(status.accepted, 1);
        assert_eq!(status.rejected, 1);
        assert_eq!(status.security_rejections, 1);

        handle.stop();
        assert_eq!(task.await.unwrap(), StopReason::Requested);
    }

    #[tokio::test]
    async fn test_stops_when_channel_closes() {
        let vault = CiphertextVault::new();
        let (oracle, _oracle_responses) =
            LocalDecryptionOracle::new(vault.clone(), SigningKey::from_bytes(&[6; 32]), 4);
        let oracle = Arc::new(oracle);
        let engine = Arc::new(BiasCalibrationEngine::new(
            Arc::new(InMemoryReviewRepository::new()),
            Arc::new(InMemoryBiasModelRepository::new()),
            oracle.clone(),
            Arc::new(Ed25519ProofVerifier::new(oracle.verifying_key())),
            Arc::new(MockCiphertextBackend::new(vault)),
            Arc::new(RunningMeanGroupStatistics::new()),
        ));

        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let listener = CallbackListener::new(engine, rx);
        assert_eq!(listener.run().await, StopReason::ChannelClosed);
    }
}
