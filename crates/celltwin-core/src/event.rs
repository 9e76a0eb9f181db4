//! Events exchanged between the sorting cell and the digital twin
//!
//! An [`Event`] is immutable once built. The payload is a loose key/value map
//! so producers can attach extra context, while the typed accessors below
//! extract the keys the twin depends on.

use crate::error::PayloadError;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Payload of an event
pub type EventData = BTreeMap<String, Value>;

/// Kinds of events emitted by the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Part enters the conveyor
    PartArrived,
    /// Sensor classifies the part
    SensorRead,
    /// Actuator commits a bin decision
    ActuatorTriggered,
    /// Part leaves the system
    PartSorted,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::PartArrived,
        EventType::SensorRead,
        EventType::ActuatorTriggered,
        EventType::PartSorted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PartArrived => "PART_ARRIVED",
            Self::SensorRead => "SENSOR_READ",
            Self::ActuatorTriggered => "ACTUATOR_TRIGGERED",
            Self::PartSorted => "PART_SORTED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a closed set of payload strings with parsing and display.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(other.to_string()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for Value {
            fn from(v: $name) -> Self {
                Value::from(v.as_str())
            }
        }
    };
}

wire_enum! {
    /// Sensor classification of a part
    SensorResult { Ok => "ok", Nok => "nok" }
}

wire_enum! {
    /// Bin chosen by the actuator
    BinDecision { OkBin => "ok_bin", RejectBin => "reject_bin" }
}

wire_enum! {
    /// Final outcome reported when a part leaves the cell
    SortOutcome { Ok => "ok", Nok => "nok" }
}

/// A single timestamped event from the cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: EventType,
    timestamp: f64,
    #[serde(default)]
    data: EventData,
}

impl Event {
    /// Build an event with an arbitrary payload
    pub fn new(event_type: EventType, timestamp: f64, data: EventData) -> Self {
        Self {
            event_type,
            timestamp,
            data,
        }
    }

    pub fn part_arrived(timestamp: f64, part_id: impl Into<String>) -> Self {
        Self::new(EventType::PartArrived, timestamp, payload(part_id, None))
    }

    pub fn sensor_read(timestamp: f64, part_id: impl Into<String>, result: SensorResult) -> Self {
        Self::new(
            EventType::SensorRead,
            timestamp,
            payload(part_id, Some(("result", result.into()))),
        )
    }

    pub fn actuator_triggered(
        timestamp: f64,
        part_id: impl Into<String>,
        decision: BinDecision,
    ) -> Self {
        Self::new(
            EventType::ActuatorTriggered,
            timestamp,
            payload(part_id, Some(("decision", decision.into()))),
        )
    }

    pub fn part_sorted(timestamp: f64, part_id: impl Into<String>, outcome: SortOutcome) -> Self {
        Self::new(
            EventType::PartSorted,
            timestamp,
            payload(part_id, Some(("outcome", outcome.into()))),
        )
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Seconds on the producer's clock
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// The `part_id` every event type carries
    pub fn part_id(&self) -> Result<&str, PayloadError> {
        self.str_field("part_id")
    }

    /// The `result` key of a `SENSOR_READ` event
    pub fn sensor_result(&self) -> Result<SensorResult, PayloadError> {
        self.parse_field("result")
    }

    /// The `decision` key of an `ACTUATOR_TRIGGERED` event
    pub fn decision(&self) -> Result<BinDecision, PayloadError> {
        self.parse_field("decision")
    }

    /// The `outcome` key of a `PART_SORTED` event
    pub fn outcome(&self) -> Result<SortOutcome, PayloadError> {
        self.parse_field("outcome")
    }

    fn str_field(&self, field: &'static str) -> Result<&str, PayloadError> {
        let value = self
            .data
            .get(field)
            .ok_or(PayloadError::MissingField(field))?;
        value.as_str().ok_or_else(|| PayloadError::WrongType {
            field,
            expected: "string",
            actual: value.type_name(),
        })
    }

    fn parse_field<T: FromStr>(&self, field: &'static str) -> Result<T, PayloadError> {
        let raw = self.str_field(field)?;
        raw.parse().map_err(|_| PayloadError::InvalidValue {
            field,
            value: raw.to_string(),
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}] {}", self.timestamp, self.event_type)?;
        for (key, value) in &self.data {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

fn payload(part_id: impl Into<String>, extra: Option<(&str, Value)>) -> EventData {
    let mut data = EventData::new();
    data.insert("part_id".to_string(), Value::from(part_id.into()));
    if let Some((key, value)) = extra {
        data.insert(key.to_string(), value);
    }
    data
}
