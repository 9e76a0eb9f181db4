//! Twin state machine
//!
//! [`TwinState`] validates every incoming event against the part lifecycle,
//! keeps the aggregate counters and derives the cell status. It is plain
//! synchronous logic; [`DigitalTwin`](crate::DigitalTwin) owns the locking.
//!
//! Part lifecycle, one accepted event type per non-terminal status:
//!
//! ```text
//! CREATED --PART_ARRIVED--> ON_CONVEYOR --SENSOR_READ--> AT_SENSOR
//!     --ACTUATOR_TRIGGERED--> READY_TO_SORT --PART_SORTED--> SORTED_OK | SORTED_NOK
//! ```

use crate::config::TwinConfig;
use crate::error::{PayloadError, TwinError};
use crate::event::{BinDecision, Event, EventType, SensorResult, SortOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// High-level status of the sorting cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellState {
    /// No event observed yet
    #[default]
    Idle,
    Running,
    /// No event within the configured inactivity threshold
    Blocked,
    /// A sequence violation was observed; sticky
    Error,
}

impl CellState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Blocked => "BLOCKED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartStatus {
    Created,
    OnConveyor,
    AtSensor,
    ReadyToSort,
    SortedOk,
    SortedNok,
}

impl PartStatus {
    /// The single event type legal from this status, `None` once terminal.
    pub fn accepts(self) -> Option<EventType> {
        match self {
            Self::Created => Some(EventType::PartArrived),
            Self::OnConveyor => Some(EventType::SensorRead),
            Self::AtSensor => Some(EventType::ActuatorTriggered),
            Self::ReadyToSort => Some(EventType::PartSorted),
            Self::SortedOk | Self::SortedNok => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.accepts().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::OnConveyor => "ON_CONVEYOR",
            Self::AtSensor => "AT_SENSOR",
            Self::ReadyToSort => "READY_TO_SORT",
            Self::SortedOk => "SORTED_OK",
            Self::SortedNok => "SORTED_NOK",
        }
    }
}

impl fmt::Display for PartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A part tracked by the twin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub part_id: String,
    pub status: PartStatus,
    pub last_timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_result: Option<SensorResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<BinDecision>,
}

impl Part {
    fn new(part_id: String, timestamp: f64) -> Self {
        Self {
            part_id,
            status: PartStatus::Created,
            last_timestamp: timestamp,
            sensor_result: None,
            decision: None,
        }
    }
}

/// What `handle_event` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The part moved `from` -> `to`
    Applied { from: PartStatus, to: PartStatus },
    /// Sequence violation; the part stayed at `status`
    Rejected { status: PartStatus },
}

/// Aggregate view of the twin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub cell_state: CellState,
    pub total_processed: u64,
    pub total_rejected: u64,
    pub parts_in_system: usize,
    pub error: bool,
}

/// Derived KPIs and bookkeeping counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Parts sorted per second over the observation window
    pub throughput: f64,
    /// Share of sorted parts that went to the reject bin
    pub reject_rate: f64,
    /// Seconds between the first and the latest event
    pub observation_window: f64,
    pub events_handled: u64,
    pub sequence_violations: u64,
    pub last_event_time: Option<f64>,
}

/// State and metrics taken under the same lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwinReport {
    pub state: StateSnapshot,
    pub metrics: MetricsSnapshot,
}

/// Validated lifecycle step extracted from an event payload
enum Step {
    Arrive,
    Sense(SensorResult),
    Actuate(BinDecision),
    Sort(SortOutcome),
}

impl Step {
    fn from_event(event: &Event) -> Result<Self, TwinError> {
        let payload = |source: PayloadError| TwinError::Payload {
            event_type: event.event_type(),
            source,
        };
        Ok(match event.event_type() {
            EventType::PartArrived => Step::Arrive,
            EventType::SensorRead => Step::Sense(event.sensor_result().map_err(payload)?),
            EventType::ActuatorTriggered => Step::Actuate(event.decision().map_err(payload)?),
            EventType::PartSorted => Step::Sort(event.outcome().map_err(payload)?),
        })
    }
}

/// Cell and part state derived from the event stream
#[derive(Debug, Clone)]
pub struct TwinState {
    cell_state: CellState,
    parts: Vec<Part>,
    index: HashMap<String, usize>,
    total_processed: u64,
    total_rejected: u64,
    last_event_time: Option<f64>,
    system_start_time: Option<f64>,
    blocked_threshold: f64,
    error_flag: bool,
    events_handled: u64,
    sequence_violations: u64,
}

impl Default for TwinState {
    fn default() -> Self {
        Self::new(TwinConfig::default().blocked_threshold)
    }
}

impl TwinState {
    /// Create an empty state with the given inactivity threshold in seconds
    pub fn new(blocked_threshold: f64) -> Self {
        Self {
            cell_state: CellState::Idle,
            parts: Vec::new(),
            index: HashMap::new(),
            total_processed: 0,
            total_rejected: 0,
            last_event_time: None,
            system_start_time: None,
            blocked_threshold,
            error_flag: false,
            events_handled: 0,
            sequence_violations: 0,
        }
    }

    /// Apply one event.
    ///
    /// Illegal events for the part's current status are recorded as a
    /// sequence violation and reported as [`EventOutcome::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`TwinError::Payload`] when the payload lacks a required key
    /// or carries an unknown value. Activity bookkeeping has already been
    /// updated at that point, but no part or counter is touched.
    pub fn handle_event(&mut self, event: &Event) -> Result<EventOutcome, TwinError> {
        let timestamp = event.timestamp();
        let event_type = event.event_type();

        self.last_event_time = Some(timestamp);
        self.system_start_time.get_or_insert(timestamp);
        self.events_handled += 1;

        if self.cell_state == CellState::Idle {
            self.set_cell_state(CellState::Running);
        }

        let part_id = event.part_id().map_err(|source| TwinError::Payload {
            event_type,
            source,
        })?;
        let step = Step::from_event(event)?;
        let slot = self.resolve_part(part_id, timestamp);

        let from = self.parts[slot].status;
        if from.accepts() != Some(event_type) {
            self.sequence_violations += 1;
            self.error_flag = true;
            warn!(
                part_id,
                status = %from,
                event_type = %event_type,
                "sequence violation, event dropped"
            );
            self.set_cell_state(CellState::Error);
            return Ok(EventOutcome::Rejected { status: from });
        }

        let part = &mut self.parts[slot];
        let to = match step {
            Step::Arrive => PartStatus::OnConveyor,
            Step::Sense(result) => {
                part.sensor_result = Some(result);
                PartStatus::AtSensor
            }
            Step::Actuate(decision) => {
                part.decision = Some(decision);
                PartStatus::ReadyToSort
            }
            Step::Sort(SortOutcome::Ok) => {
                self.total_processed += 1;
                PartStatus::SortedOk
            }
            Step::Sort(SortOutcome::Nok) => {
                self.total_processed += 1;
                self.total_rejected += 1;
                PartStatus::SortedNok
            }
        };
        part.status = to;
        part.last_timestamp = timestamp;
        debug!(part_id, %from, %to, "part transition");

        if self.cell_state == CellState::Blocked {
            self.set_cell_state(CellState::Running);
        }
        self.check_inactivity(timestamp);

        Ok(EventOutcome::Applied { from, to })
    }

    /// Mark the cell BLOCKED when nothing arrived for longer than the threshold.
    ///
    /// Only a RUNNING cell can become blocked. Returns `true` on transition.
    pub fn check_inactivity(&mut self, now: f64) -> bool {
        let Some(last) = self.last_event_time else {
            return false;
        };
        if self.cell_state == CellState::Running && now - last > self.blocked_threshold {
            self.set_cell_state(CellState::Blocked);
            return true;
        }
        false
    }

    fn resolve_part(&mut self, part_id: &str, timestamp: f64) -> usize {
        if let Some(&slot) = self.index.get(part_id) {
            return slot;
        }
        let slot = self.parts.len();
        self.parts.push(Part::new(part_id.to_string(), timestamp));
        self.index.insert(part_id.to_string(), slot);
        slot
    }

    fn set_cell_state(&mut self, next: CellState) {
        if self.cell_state != next {
            info!(from = %self.cell_state, to = %next, "cell state changed");
            self.cell_state = next;
        }
    }

    pub fn cell_state(&self) -> CellState {
        self.cell_state
    }

    pub fn error_flag(&self) -> bool {
        self.error_flag
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    pub fn total_rejected(&self) -> u64 {
        self.total_rejected
    }

    pub fn last_event_time(&self) -> Option<f64> {
        self.last_event_time
    }

    pub fn blocked_threshold(&self) -> f64 {
        self.blocked_threshold
    }

    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.index.get(part_id).map(|&slot| &self.parts[slot])
    }

    /// Parts in the order they were first seen
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Seconds between the first and the latest event, 0 before any event
    pub fn observation_window(&self) -> f64 {
        match (self.system_start_time, self.last_event_time) {
            (Some(start), Some(last)) => (last - start).max(0.0),
            _ => 0.0,
        }
    }

    pub fn throughput(&self) -> f64 {
        let window = self.observation_window();
        if window <= 0.0 {
            return 0.0;
        }
        self.total_processed as f64 / window
    }

    pub fn reject_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.total_rejected as f64 / self.total_processed as f64
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            cell_state: self.cell_state,
            total_processed: self.total_processed,
            total_rejected: self.total_rejected,
            parts_in_system: self.parts.len(),
            error: self.error_flag,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            throughput: self.throughput(),
            reject_rate: self.reject_rate(),
            observation_window: self.observation_window(),
            events_handled: self.events_handled,
            sequence_violations: self.sequence_violations,
            last_event_time: self.last_event_time,
        }
    }

    pub fn report(&self) -> TwinReport {
        TwinReport {
            state: self.snapshot(),
            metrics: self.metrics(),
        }
    }
}
