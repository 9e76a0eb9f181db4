//! Error types for the twin core
//!
//! | Error | Raised by | Fatal for dispatch |
//! |-------|-----------|--------------------|
//! | [`PayloadError`] | typed payload accessors on [`Event`](crate::Event) | via [`TwinError`] |
//! | [`TwinError`] | [`TwinState::handle_event`](crate::TwinState::handle_event) | yes |
//! | [`BusError`] | [`EventBus`](crate::EventBus) | `Subscriber` only |
//! | [`ConfigError`] | [`TwinConfig::validate`](crate::TwinConfig::validate) | n/a |
//!
//! Sequence violations are *not* errors: they are recorded in the twin state
//! and reported through the snapshot.

use crate::event::EventType;
use thiserror::Error;

/// A required payload key is missing or holds an unusable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("missing payload field `{0}`")]
    MissingField(&'static str),

    #[error("payload field `{field}` must be a {expected}, got {actual}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("payload field `{field}` has invalid value `{value}`")]
    InvalidValue { field: &'static str, value: String },
}

/// Failure while applying an event to the twin state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwinError {
    #[error("malformed {event_type} event: {source}")]
    Payload {
        event_type: EventType,
        #[source]
        source: PayloadError,
    },
}

/// Event bus failures.
#[derive(Debug, Error)]
pub enum BusError {
    /// `run()` was called while another dispatch loop owns the queue
    #[error("event bus dispatch loop is already running")]
    AlreadyRunning,

    /// The dispatch loop terminated and no longer accepts events
    #[error("event bus is closed")]
    Closed,

    /// A subscriber failed while handling an event
    #[error("subscriber `{subscriber}` failed on {event_type} event")]
    Subscriber {
        subscriber: String,
        event_type: EventType,
        #[source]
        source: anyhow::Error,
    },
}

/// Rejected twin configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("`blocked_threshold` must be a positive number of seconds, got {0}")]
    InvalidBlockedThreshold(f64),
}
