//! Application services: the calibration engine and the components that
//! keep it fed (request registry, callback listener, expiry sweeper) and
//! observed (event bus).

pub mod calibration_engine;
pub mod callback_listener;
pub mod event_bus;
pub mod registry_sweeper;
pub mod request_registry;

pub use calibration_engine::{BiasCalibrationEngine, CallbackOutcome};
pub use callback_listener::{CallbackListener, ListenerHandle, ListenerStatus};
pub use event_bus::{EventBus, EventBusConfig, EventPayload, ReviewEvent, SequenceNumber};
pub use registry_sweeper::{RegistrySweeper, SweeperConfig, SweeperHandle, SweeperStatus};
pub use request_registry::{RequestRegistry, SweepReport};
