//! celltwin supervisor
//!
//! Owns the long-running tasks of a twin deployment and treats them as one
//! unit:
//! - the event bus dispatch loop
//! - the simulated cell producing events
//! - the inactivity watchdog
//! - an optional monitor that logs snapshots periodically
//!
//! All tasks share one cancellation token. If any of them fails (a fatal
//! dispatch failure, the producer losing the bus) the rest are cancelled and
//! the failure is returned from [`CellSupervisor::wait`]. Parts still on the
//! line are aborted before `wait` returns; queued events are not drained.

use anyhow::{Context, Result};
use celltwin_core::{BusConfig, DigitalTwin, EventBus, TwinClock, TwinConfig, TwinReport};
use celltwin_sim::{SimulationConfig, SortingCellSimulator};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What to run and how
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    pub twin: TwinConfig,
    pub bus: BusConfig,
    pub simulation: SimulationConfig,
    /// Log a state snapshot at this period; `None` disables the monitor
    pub monitor_interval: Option<Duration>,
}

/// Supervises the tasks around one digital twin
pub struct CellSupervisor {
    config: SupervisorConfig,
    bus: Arc<EventBus>,
    twin: Arc<DigitalTwin>,
    clock: TwinClock,
    token: CancellationToken,
    tasks: JoinSet<Result<()>>,
}

impl CellSupervisor {
    /// Build the bus and the twin. Nothing runs until [`start`](Self::start).
    pub fn new(config: SupervisorConfig) -> Self {
        let bus = Arc::new(EventBus::with_config(config.bus.clone()));
        let twin = DigitalTwin::new(&bus, config.twin.clone());
        Self {
            config,
            bus,
            twin,
            clock: TwinClock::new(),
            token: CancellationToken::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn twin(&self) -> Arc<DigitalTwin> {
        Arc::clone(&self.twin)
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn clock(&self) -> TwinClock {
        self.clock
    }

    /// Token cancelled on shutdown, for tasks started outside the supervisor
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn every supervised task.
    ///
    /// # Errors
    ///
    /// Fails when the twin or simulation config is invalid; nothing is
    /// spawned then.
    pub fn start(&mut self) -> Result<()> {
        self.config
            .twin
            .validate()
            .context("invalid twin config")?;
        let mut simulator = SortingCellSimulator::new(
            self.bus(),
            self.clock,
            self.config.simulation.clone(),
        )
        .context("invalid simulation config")?;

        let bus = self.bus();
        self.spawn("event-bus", async move {
            bus.run().await?;
            Ok(())
        });

        let twin = self.twin();
        let clock = self.clock;
        self.spawn("watchdog", async move {
            twin.watch_inactivity(clock).await;
            Ok(())
        });

        // not wrapped by `spawn`: part tasks must be gone before this task ends
        let token = self.token.clone();
        self.tasks.spawn(async move {
            let result = tokio::select! {
                () = token.cancelled() => Ok(()),
                result = simulator.run() => result,
            };
            simulator.stop().await;
            result.context("simulator task failed")
        });

        if let Some(period) = self.config.monitor_interval {
            let twin = self.twin();
            self.spawn("monitor", async move {
                monitor(&twin, period).await;
                Ok(())
            });
        }

        info!(tasks = self.tasks.len(), "cell supervisor started");
        Ok(())
    }

    /// Run `task` alongside the cell. It must stop by itself once
    /// [`cancellation_token`](Self::cancellation_token) fires; an error from
    /// it stops the cell like any other supervised failure.
    pub fn supervise<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks
            .spawn(async move { task.await.with_context(|| format!("{name} task failed")) });
    }

    fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(task = name, "task cancelled");
                    Ok(())
                }
                result = task => result.with_context(|| format!("{name} task failed")),
            }
        });
    }

    /// Cancel every task. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("cell supervisor shutting down");
            self.token.cancel();
        }
    }

    /// Wait until all tasks have stopped.
    ///
    /// # Errors
    ///
    /// Returns the first task failure, after cancelling and joining the rest.
    pub async fn wait(&mut self) -> Result<()> {
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined
                .context("supervised task panicked")
                .and_then(|result| result);
            if let Err(err) = outcome {
                error!(error = %format!("{err:#}"), "supervised task failed");
                self.shutdown();
                while self.tasks.join_next().await.is_some() {}
                return Err(err);
            }
        }
        Ok(())
    }

    /// Run until `signal` resolves or a task fails, then stop everything.
    ///
    /// # Errors
    ///
    /// Propagates task failures from [`wait`](Self::wait).
    pub async fn run_until<S>(mut self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let token = self.token.clone();
        tokio::select! {
            () = signal => {
                info!("shutdown requested");
                token.cancel();
            }
            result = self.wait() => return result,
        }
        self.wait().await
    }
}

async fn monitor(twin: &DigitalTwin, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let TwinReport {
            state: snapshot,
            metrics,
        } = twin.get_report().await;
        info!(
            target: "celltwin::monitor",
            cell_state = %snapshot.cell_state,
            total_processed = snapshot.total_processed,
            total_rejected = snapshot.total_rejected,
            parts_in_system = snapshot.parts_in_system,
            error = snapshot.error,
            throughput = format!("{:.3}", metrics.throughput),
            reject_rate = format!("{:.3}", metrics.reject_rate),
            "twin snapshot"
        );
    }
}
