//! Registry expiry background task.
//!
//! Periodically expires requests the oracle never answered, so abandoned
//! tokens are reclaimed, and publishes a `RequestExpired` event for each.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::domain::models::RegistryConfig;
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::request_registry::{RequestRegistry, SweepReport};

/// Configuration for the registry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweeps.
    pub sweep_interval: Duration,
    /// Whether to sweep immediately on startup.
    pub run_on_startup: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for SweeperConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval(),
            run_on_startup: false,
        }
    }
}

impl SweeperConfig {
    /// Default settings with a custom sweep interval.
    pub fn with_interval(sweep_interval: Duration) -> Self {
        Self {
            sweep_interval,
            ..Default::default()
        }
    }
}

/// Cumulative sweeper counters.
#[derive(Debug, Clone, Default)]
pub struct SweeperStatus {
    pub running: bool,
    pub total_sweeps: u64,
    pub total_expired: u64,
    pub total_purged: u64,
    pub last_sweep: Option<Instant>,
}

/// Handle to control a running sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<SweeperStatus>>,
}

impl SweeperHandle {
    /// Request the sweeper to stop. Takes effect without waiting for the
    /// next tick.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Whether `stop` has been called.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    /// Snapshot of the sweeper counters.
    pub async fn status(&self) -> SweeperStatus {
        self.status.read().await.clone()
    }
}

/// Background task that periodically expires unanswered requests.
pub struct RegistrySweeper {
    registry: Arc<RequestRegistry>,
    config: SweeperConfig,
    event_bus: Option<Arc<EventBus>>,
    stop_flag: Arc<AtomicBool>,
    wake: Arc<Notify>,
    status: Arc<RwLock<SweeperStatus>>,
}

impl RegistrySweeper {
    pub fn new(registry: Arc<RequestRegistry>, config: SweeperConfig) -> Self {
        Self {
            registry,
            config,
            event_bus: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            status: Arc::new(RwLock::new(SweeperStatus::default())),
        }
    }

    /// Set the event bus for publishing expiry events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Handle for stopping and inspecting the sweeper once spawned.
    pub fn handle(&self) -> SweeperHandle {
        SweeperHandle {
            stop_flag: self.stop_flag.clone(),
            wake: self.wake.clone(),
            status: self.status.clone(),
        }
    }

    pub const fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Spawn the sweep loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(self) {
        self.status.write().await.running = true;
        tracing::info!(interval_secs = self.config.sweep_interval.as_secs(), "registry sweeper started");

        let mut timer = interval(self.config.sweep_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately.
        timer.tick().await;

        if self.config.run_on_startup {
            self.run_once().await;
        }

        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {
                    if self.stop_flag.load(Ordering::Acquire) {
                        break;
                    }
                    self.run_once().await;
                }
                () = self.wake.notified() => {}
            }
        }

        self.status.write().await.running = false;
        tracing::info!("registry sweeper stopped");
    }

    /// Run one sweep and publish its expiries.
    pub async fn run_once(&self) -> SweepReport {
        let report = self.registry.sweep_expired();

        if let Some(ref bus) = self.event_bus {
            for request in &report.expired {
                bus.emit(EventPayload::RequestExpired {
                    review_id: request.subject_id,
                    token: request.token,
                    kind: request.kind,
                });
            }
        }

        if !report.expired.is_empty() {
            tracing::warn!(
                expired = report.expired.len(),
                purged = report.purged_tombstones,
                "expired unanswered decryption requests"
            );
        }

        let mut status = self.status.write().await;
        status.total_sweeps += 1;
        status.total_expired += report.expired.len() as u64;
        status.total_purged += report.purged_tombstones as u64;
        status.last_sweep = Some(Instant::now());

        report
    }
}
