//! celltwin core
//!
//! This crate provides the digital twin of a sorting cell:
//! - Events emitted by the cell and their payloads
//! - An in-process event bus with ordered fan-out dispatch
//! - The twin state machine enforcing the part lifecycle
//! - A concurrency-safe twin with snapshot queries and an inactivity watchdog

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod twin;
pub mod value;

pub use bus::{EventBus, Subscriber};
pub use clock::TwinClock;
pub use config::{BusConfig, DispatchPolicy, TwinConfig};
pub use error::{BusError, ConfigError, PayloadError, TwinError};
pub use event::{BinDecision, Event, EventData, EventType, SensorResult, SortOutcome};
pub use state::{
    CellState, EventOutcome, MetricsSnapshot, Part, PartStatus, StateSnapshot, TwinReport,
    TwinState,
};
pub use twin::DigitalTwin;
pub use value::Value;
