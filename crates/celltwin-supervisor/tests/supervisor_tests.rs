//! Lifecycle of the supervised twin deployment

use anyhow::anyhow;
use celltwin_core::{BusConfig, CellState, DispatchPolicy, TwinConfig};
use celltwin_sim::SimulationConfig;
use celltwin_supervisor::{CellSupervisor, SupervisorConfig};
use std::sync::Arc;
use std::time::Duration;

fn seeded_config() -> SupervisorConfig {
    SupervisorConfig {
        simulation: SimulationConfig {
            seed: Some(99),
            ..SimulationConfig::default()
        },
        monitor_interval: Some(Duration::from_secs(2)),
        ..SupervisorConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_run_and_shutdown() {
    let mut supervisor = CellSupervisor::new(seeded_config());
    let twin = supervisor.twin();
    supervisor.start().unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    let snapshot = twin.get_state_snapshot().await;
    assert_eq!(snapshot.cell_state, CellState::Running);
    assert!(!snapshot.error);
    assert!(snapshot.total_processed > 0);
    assert!(supervisor.bus().published_count() >= 4 * snapshot.total_processed);

    supervisor.shutdown();
    supervisor.wait().await.unwrap();
    // nothing is produced after shutdown
    let published = supervisor.bus().published_count();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(supervisor.bus().published_count(), published);
}

#[tokio::test]
async fn test_invalid_simulation_config_spawns_nothing() {
    let mut supervisor = CellSupervisor::new(SupervisorConfig {
        simulation: SimulationConfig {
            ok_probability: 2.0,
            ..SimulationConfig::default()
        },
        ..SupervisorConfig::default()
    });
    assert!(supervisor.start().is_err());
    // no tasks, so waiting returns immediately
    supervisor.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fatal_dispatch_failure_stops_everything() {
    let mut supervisor = CellSupervisor::new(seeded_config());
    supervisor
        .bus()
        .subscribe_fn("flaky", |_event| async { Err::<(), _>(anyhow::anyhow!("sink offline")) });
    supervisor.start().unwrap();

    let err = tokio::time::timeout(Duration::from_secs(30), supervisor.wait())
        .await
        .expect("supervisor did not stop")
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("sink offline"), "{message}");
    assert!(supervisor.cancellation_token().is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_isolate_policy_keeps_running() {
    let mut config = seeded_config();
    config.bus = BusConfig {
        dispatch_policy: DispatchPolicy::Isolate,
    };
    let mut supervisor = CellSupervisor::new(config);
    supervisor
        .bus()
        .subscribe_fn("flaky", |_event| async { Err::<(), _>(anyhow::anyhow!("sink offline")) });
    let twin = supervisor.twin();
    let bus = supervisor.bus();
    supervisor.start().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(supervisor.run_until(async move {
        let _ = stop_rx.await;
    }));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(twin.get_state_snapshot().await.total_processed > 0);
    assert!(bus.failed_dispatch_count() > 0);

    stop_tx.send(()).unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_no_part_outlives_wait() {
    let mut supervisor = CellSupervisor::new(SupervisorConfig {
        simulation: SimulationConfig {
            part_interarrival: (0.01, 0.01),
            sensor_delay: (5.0, 5.0),
            seed: Some(5),
            ..SimulationConfig::default()
        },
        ..SupervisorConfig::default()
    });
    supervisor.start().unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(Arc::strong_count(&supervisor.bus()) > 50);

    supervisor.shutdown();
    supervisor.wait().await.unwrap();
    // the supervisor's own handle plus the one just taken
    assert_eq!(Arc::strong_count(&supervisor.bus()), 2);

    let published = supervisor.bus().published_count();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(supervisor.bus().published_count(), published);
}

#[tokio::test]
async fn test_invalid_twin_config_spawns_nothing() {
    let mut supervisor = CellSupervisor::new(SupervisorConfig {
        twin: TwinConfig {
            blocked_threshold: -1.0,
            ..TwinConfig::default()
        },
        ..SupervisorConfig::default()
    });
    let err = supervisor.start().unwrap_err();
    assert!(format!("{err:#}").contains("blocked_threshold"));
    supervisor.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_companion_stops_the_cell() {
    let mut supervisor = CellSupervisor::new(seeded_config());
    supervisor.start().unwrap();
    supervisor.supervise("companion", async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Err::<(), _>(anyhow!("listener lost"))
    });
    let token = supervisor.cancellation_token();

    let run = supervisor.run_until(std::future::pending::<()>());
    let err = tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .expect("cell kept running after its companion failed")
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("companion task failed"), "{message}");
    assert!(message.contains("listener lost"), "{message}");
    assert!(token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_companion_stops_on_shutdown() {
    let mut supervisor = CellSupervisor::new(seeded_config());
    supervisor.start().unwrap();
    let token = supervisor.cancellation_token();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    supervisor.supervise("companion", async move {
        token.cancelled().await;
        let _ = done_tx.send(());
        anyhow::Ok(())
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    supervisor.shutdown();
    supervisor.wait().await.unwrap();
    done_rx.await.unwrap();
}
