//! Feed a handful of hand-written events through a twin and print what it sees

use celltwin_core::{
    BinDecision, DigitalTwin, Event, EventBus, SensorResult, SortOutcome, TwinConfig,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Arc::new(EventBus::new());
    let twin = DigitalTwin::new(&bus, TwinConfig::default());
    let runner = tokio::spawn({
        let bus = bus.clone();
        async move { bus.run().await }
    });

    println!("=== celltwin basic example ===\n");

    // P1 goes through the whole line and lands in the good bin
    bus.publish(Event::part_arrived(0.0, "P1"))?;
    bus.publish(Event::sensor_read(0.2, "P1", SensorResult::Ok))?;
    bus.publish(Event::actuator_triggered(0.35, "P1", BinDecision::OkBin))?;
    bus.publish(Event::part_sorted(0.35, "P1", SortOutcome::Ok))?;

    // P2 is rejected
    bus.publish(Event::part_arrived(1.0, "P2"))?;
    bus.publish(Event::sensor_read(1.1, "P2", SensorResult::Nok))?;
    bus.publish(Event::actuator_triggered(1.3, "P2", BinDecision::RejectBin))?;
    bus.publish(Event::part_sorted(1.3, "P2", SortOutcome::Nok))?;

    while bus.dispatched_count() < bus.published_count() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("state:   {}", serde_json::to_string(&twin.get_state_snapshot().await)?);
    println!("metrics: {}", serde_json::to_string(&twin.get_metrics().await)?);

    // P3 skips the conveyor; the twin flags the cell
    println!("\nPublishing SENSOR_READ for a part that never arrived...");
    bus.publish(Event::sensor_read(2.0, "P3", SensorResult::Ok))?;
    while bus.dispatched_count() < bus.published_count() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("state:   {}", serde_json::to_string(&twin.get_state_snapshot().await)?);

    println!("\nparts:");
    for part in twin.get_parts_snapshot().await {
        println!("  {} {} @ {:.2}", part.part_id, part.status, part.last_timestamp);
    }

    runner.abort();
    Ok(())
}
