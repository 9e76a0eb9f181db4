//! Simulated sorting cell
//!
//! Plays the physical side of the twin: parts arrive on the conveyor at
//! random intervals, a sensor classifies each one, an actuator drops it in a
//! bin, and every step is published to the [`EventBus`].
//!
//! Each part runs in its own task, so events of different parts interleave on
//! the bus while each part's own events stay in lifecycle order. Part tasks
//! belong to the simulator: dropping it aborts them, and
//! [`stop`](SortingCellSimulator::stop) aborts them and waits until they are gone.

use celltwin_core::{
    BinDecision, BusError, Event, EventBus, SensorResult, SortOutcome, TwinClock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Timing and quality parameters of the simulated cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seconds between consecutive part arrivals, `(min, max)`
    pub part_interarrival: (f64, f64),
    /// Seconds from arrival to sensor reading, `(min, max)`
    pub sensor_delay: (f64, f64),
    /// Seconds from sensor reading to actuation, `(min, max)`
    pub actuator_delay: (f64, f64),
    /// Probability that a part is good
    pub ok_probability: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            part_interarrival: (0.5, 1.5),
            sensor_delay: (0.1, 0.3),
            actuator_delay: (0.1, 0.2),
            ok_probability: 0.8,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Check that every range is ordered and non-negative and the probability is in `[0, 1]`
    pub fn validate(&self) -> Result<(), SimError> {
        for (field, (min, max)) in [
            ("part_interarrival", self.part_interarrival),
            ("sensor_delay", self.sensor_delay),
            ("actuator_delay", self.actuator_delay),
        ] {
            if !(min.is_finite() && max.is_finite() && 0.0 <= min && min <= max) {
                return Err(SimError::InvalidRange { field, min, max });
            }
        }
        if !(0.0..=1.0).contains(&self.ok_probability) {
            return Err(SimError::InvalidProbability(self.ok_probability));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("`{field}` must satisfy 0 <= min <= max, got ({min}, {max})")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("`ok_probability` must be within [0, 1], got {0}")]
    InvalidProbability(f64),

    #[error("cannot publish: {0}")]
    Bus(#[from] BusError),
}

/// Random draws for one part, taken when it arrives
#[derive(Debug, Clone, PartialEq)]
struct PartPlan {
    part_id: String,
    sensor_delay: Duration,
    actuator_delay: Duration,
    ok: bool,
}

/// Event producer modelling conveyor, sensor and actuator
pub struct SortingCellSimulator {
    bus: Arc<EventBus>,
    clock: TwinClock,
    config: SimulationConfig,
    rng: StdRng,
    next_part: u64,
    in_flight: JoinSet<()>,
}

impl SortingCellSimulator {
    /// # Errors
    ///
    /// Rejects configurations that fail [`SimulationConfig::validate`].
    pub fn new(
        bus: Arc<EventBus>,
        clock: TwinClock,
        config: SimulationConfig,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            interarrival = ?config.part_interarrival,
            ok_probability = config.ok_probability,
            seed = ?config.seed,
            "sorting cell simulator initialized"
        );
        Ok(Self {
            bus,
            clock,
            config,
            rng,
            next_part: 0,
            in_flight: JoinSet::new(),
        })
    }

    /// Number of parts that have arrived so far
    pub fn parts_emitted(&self) -> u64 {
        self.next_part
    }

    /// Parts whose lifecycle has not been fully published yet
    pub fn parts_in_flight(&mut self) -> usize {
        while self.in_flight.try_join_next().is_some() {}
        self.in_flight.len()
    }

    /// Generate parts forever.
    ///
    /// Cancel by dropping the future; parts already on the line keep going
    /// until [`drain`](Self::drain) or [`stop`](Self::stop).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Bus`] once the bus stops accepting events.
    pub async fn run(&mut self) -> Result<(), SimError> {
        info!("sorting cell simulator run loop started");
        loop {
            let wait = self.draw(self.config.part_interarrival);
            tokio::time::sleep(wait).await;

            let plan = self.plan_part();
            let now = self.clock.now();
            info!(part_id = %plan.part_id, t = now, "PART_ARRIVED");
            self.bus
                .publish(Event::part_arrived(now, plan.part_id.clone()))?;

            // reap finished parts so the set only holds live ones
            while self.in_flight.try_join_next().is_some() {}

            let bus = Arc::clone(&self.bus);
            let clock = self.clock;
            self.in_flight.spawn(async move {
                let part_id = plan.part_id.clone();
                if let Err(err) = process_part(&bus, clock, plan).await {
                    warn!(%part_id, error = %err, "part processing aborted");
                }
            });
        }
    }

    /// Wait for every part already on the line to be sorted
    pub async fn drain(&mut self) {
        while self.in_flight.join_next().await.is_some() {}
    }

    /// Abort every part still on the line and wait until their tasks are gone
    pub async fn stop(&mut self) {
        let aborted = self.parts_in_flight();
        self.in_flight.shutdown().await;
        if aborted > 0 {
            info!(aborted, "sorting cell simulator stopped");
        }
    }

    fn plan_part(&mut self) -> PartPlan {
        let part_id = format!("P{}", self.next_part);
        self.next_part += 1;
        PartPlan {
            part_id,
            sensor_delay: self.draw(self.config.sensor_delay),
            actuator_delay: self.draw(self.config.actuator_delay),
            ok: self.rng.random_bool(self.config.ok_probability),
        }
    }

    fn draw(&mut self, (min, max): (f64, f64)) -> Duration {
        Duration::from_secs_f64(self.rng.random_range(min..=max))
    }
}

/// Sensor, actuator and final sort for one part
async fn process_part(bus: &EventBus, clock: TwinClock, plan: PartPlan) -> Result<(), BusError> {
    let PartPlan {
        part_id,
        sensor_delay,
        actuator_delay,
        ok,
    } = plan;

    tokio::time::sleep(sensor_delay).await;
    let result = if ok { SensorResult::Ok } else { SensorResult::Nok };
    info!(%part_id, %result, t = clock.now(), "SENSOR_READ");
    bus.publish(Event::sensor_read(clock.now(), part_id.as_str(), result))?;

    tokio::time::sleep(actuator_delay).await;
    let decision = if ok {
        BinDecision::OkBin
    } else {
        BinDecision::RejectBin
    };
    info!(%part_id, %decision, t = clock.now(), "ACTUATOR_TRIGGERED");
    bus.publish(Event::actuator_triggered(
        clock.now(),
        part_id.as_str(),
        decision,
    ))?;

    let outcome = if ok { SortOutcome::Ok } else { SortOutcome::Nok };
    info!(%part_id, %outcome, t = clock.now(), "PART_SORTED");
    bus.publish(Event::part_sorted(clock.now(), part_id, outcome))?;
    Ok(())
}
