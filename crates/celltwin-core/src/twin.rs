//! Digital twin of the sorting cell
//!
//! [`DigitalTwin`] subscribes to the bus and serialises every mutation and
//! every query of its [`TwinState`] through one exclusive lock. Readers and
//! the writer never overlap, so a snapshot always reflects the state between
//! two whole events.

use crate::bus::{EventBus, Subscriber};
use crate::clock::TwinClock;
use crate::config::TwinConfig;
use crate::error::TwinError;
use crate::event::Event;
use crate::state::{EventOutcome, MetricsSnapshot, Part, StateSnapshot, TwinReport, TwinState};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Concurrency-safe façade over the twin state
#[derive(Debug)]
pub struct DigitalTwin {
    config: TwinConfig,
    state: Mutex<TwinState>,
}

impl DigitalTwin {
    /// Create the twin and register it on `bus`
    pub fn new(bus: &EventBus, config: TwinConfig) -> Arc<Self> {
        let twin = Arc::new(Self {
            state: Mutex::new(TwinState::new(config.blocked_threshold)),
            config,
        });
        bus.subscribe(twin.clone());
        info!(
            blocked_threshold = twin.config.blocked_threshold,
            "digital twin attached to event bus"
        );
        twin
    }

    pub fn config(&self) -> &TwinConfig {
        &self.config
    }

    async fn handle_event(&self, event: &Event) -> Result<EventOutcome, TwinError> {
        let mut state = self.state.lock().await;
        let outcome = state.handle_event(event)?;
        debug!(%event, ?outcome, "event handled");
        Ok(outcome)
    }

    /// Aggregate snapshot taken at a single consistent instant
    pub async fn get_state_snapshot(&self) -> StateSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Every part seen so far, in arrival order
    pub async fn get_parts_snapshot(&self) -> Vec<Part> {
        self.state.lock().await.parts().to_vec()
    }

    pub async fn get_part(&self, part_id: &str) -> Option<Part> {
        self.state.lock().await.part(part_id).cloned()
    }

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        self.state.lock().await.metrics()
    }

    /// Snapshot and metrics describing the same instant
    pub async fn get_report(&self) -> TwinReport {
        self.state.lock().await.report()
    }

    /// Evaluate the inactivity rule at `now` on the producers' timeline
    pub async fn check_inactivity(&self, now: f64) -> bool {
        self.state.lock().await.check_inactivity(now)
    }

    /// Periodically compare `clock` against the last event time.
    ///
    /// Never returns; drop or abort it to stop.
    pub async fn watch_inactivity(&self, clock: TwinClock) {
        let mut interval = tokio::time::interval(self.config.watchdog_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = clock.now();
            if self.check_inactivity(now).await {
                warn!(
                    now,
                    threshold = self.config.blocked_threshold,
                    "no events within threshold, cell blocked"
                );
            }
        }
    }
}

#[async_trait]
impl Subscriber for DigitalTwin {
    fn name(&self) -> &str {
        "digital-twin"
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        self.handle_event(event).await?;
        Ok(())
    }
}
