//! EventBus service for review lifecycle events.
//!
//! Provides a broadcast-based event stream with sequence numbering. Events
//! are fire-and-forget: publishing never fails, even with no subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{EventsConfig, ModelId, RequestKind, RequestToken, ReviewId};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    /// Review the event concerns, if any.
    pub review_id: Option<ReviewId>,
    pub payload: EventPayload,
}

impl ReviewEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber::zero(), // Assigned by EventBus
            timestamp: Utc::now(),
            review_id: payload.review_id(),
            payload,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    ReviewSubmitted {
        review_id: ReviewId,
        submitted_at: DateTime<Utc>,
    },
    AnalysisRequested {
        review_id: ReviewId,
        model_id: ModelId,
        token: RequestToken,
    },
    BiasDetected {
        review_id: ReviewId,
        bias_score: u32,
    },
    CalibrationRequested {
        review_id: ReviewId,
        token: RequestToken,
    },
    ReviewCalibrated {
        review_id: ReviewId,
    },
    GroupStatsRequested {
        review_id: ReviewId,
        token: RequestToken,
    },
    GroupStatsUpdated {
        group: u32,
        average: u32,
        samples: u64,
    },
    RequestExpired {
        review_id: ReviewId,
        token: RequestToken,
        kind: RequestKind,
    },
    BiasModelCreated {
        model_id: ModelId,
    },
}

impl EventPayload {
    /// The review this event concerns, if any.
    pub const fn review_id(&self) -> Option<ReviewId> {
        match self {
            Self::ReviewSubmitted { review_id, .. }
            | Self::AnalysisRequested { review_id, .. }
            | Self::BiasDetected { review_id, .. }
            | Self::CalibrationRequested { review_id, .. }
            | Self::ReviewCalibrated { review_id }
            | Self::GroupStatsRequested { review_id, .. }
            | Self::RequestExpired { review_id, .. } => Some(*review_id),
            Self::GroupStatsUpdated { .. } | Self::BiasModelCreated { .. } => None,
        }
    }

    /// Stable snake_case event name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReviewSubmitted { .. } => "review_submitted",
            Self::AnalysisRequested { .. } => "analysis_requested",
            Self::BiasDetected { .. } => "bias_detected",
            Self::CalibrationRequested { .. } => "calibration_requested",
            Self::ReviewCalibrated { .. } => "review_calibrated",
            Self::GroupStatsRequested { .. } => "group_stats_requested",
            Self::GroupStatsUpdated { .. } => "group_stats_updated",
            Self::RequestExpired { .. } => "request_expired",
            Self::BiasModelCreated { .. } => "bias_model_created",
        }
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::from(&EventsConfig::default())
    }
}

impl From<&EventsConfig> for EventBusConfig {
    fn from(config: &EventsConfig) -> Self {
        Self {
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// Central event bus for broadcasting events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<ReviewEvent>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish an event, assigning its sequence number.
    pub fn publish(&self, mut event: ReviewEvent) -> SequenceNumber {
        let seq = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));
        event.sequence = seq;
        tracing::trace!(sequence = %seq, event = event.payload.name(), "publishing event");

        // No subscribers is fine.
        let _ = self.sender.send(event);
        seq
    }

    /// Wrap `payload` in a fresh event and publish it.
    pub fn emit(&self, payload: EventPayload) -> SequenceNumber {
        self.publish(ReviewEvent::new(payload))
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.sender.subscribe()
    }

    /// Sequence number the next event will receive.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::default();
        assert_eq!(bus.current_sequence().0, 0);

        let mut rx = bus.subscribe();

        bus.emit(EventPayload::BiasModelCreated { model_id: ModelId(1) });
        let event1 = rx.recv().await.unwrap();
        assert_eq!(event1.sequence.0, 0);

        bus.emit(EventPayload::ReviewCalibrated { review_id: ReviewId(4) });
        let event2 = rx.recv().await.unwrap();
        assert_eq!(event2.sequence.0, 1);
        assert_eq!(event2.review_id, Some(ReviewId(4)));

        assert_eq!(bus.current_sequence().0, 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        let seq = bus.emit(EventPayload::BiasDetected {
            review_id: ReviewId(1),
            bias_score: 15,
        });
        assert_eq!(seq, SequenceNumber(0));
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let payload = EventPayload::BiasDetected {
            review_id: ReviewId(2),
            bias_score: 15,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "BiasDetected");
        assert_eq!(json["data"]["bias_score"], 15);

        let back: EventPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_group_events_carry_no_review() {
        let event = ReviewEvent::new(EventPayload::GroupStatsUpdated {
            group: 2,
            average: 75,
            samples: 3,
        });
        assert!(event.review_id.is_none());
        assert_eq!(event.payload.name(), "group_stats_updated");
    }
}
