//! Sample generator used by local exercising of the pipeline and by tests/benches. Not a
//! requirement of any external producer — real producers call `Sensor::put_attribute`
//! directly; this just fabricates plausible measurements with `rand::random_range` over a
//! configurable band.

use crate::types::{Measurement, SensorId, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct SimulatedAttribute {
    pub name: &'static str,
    pub low: f64,
    pub high: f64,
}

pub const HEART_RATE: SimulatedAttribute = SimulatedAttribute { name: "hr", low: 55.0, high: 110.0 };
pub const BATTERY: SimulatedAttribute = SimulatedAttribute { name: "battery", low: 0.0, high: 100.0 };

/// Spawns a task that emits one measurement per attribute every `period_ms`, sending it
/// to `tx` (typically a sensor worker's ingestion channel). Returns a flag the caller can
/// clear to stop it.
pub fn spawn(sensor_id: SensorId, attributes: Vec<SimulatedAttribute>, period_ms: u64, tx: mpsc::Sender<Measurement>) -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_task = running.clone();

    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_millis(period_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timestamp_ms: i64 = 0;

        while running_task.load(Ordering::Relaxed) {
            interval.tick().await;
            for attribute in &attributes {
                let reading = attribute.low + rand::random_range(0.0..(attribute.high - attribute.low));
                let measurement = Measurement::new(sensor_id.clone(), attribute.name, timestamp_ms, Value::Number(reading));
                if tx.send(measurement).await.is_err() {
                    return;
                }
            }
            timestamp_ms += period_ms as i64;
        }
    });

    running
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulator_emits_one_measurement_per_attribute_per_tick() {
        let (tx, mut rx) = mpsc::channel(16);
        let running = spawn("s1".into(), vec![HEART_RATE, BATTERY], 10, tx);

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("timed out").unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("timed out").unwrap();
        assert_eq!(first.attribute_id, "hr");
        assert_eq!(second.attribute_id, "battery");

        running.store(false, Ordering::Relaxed);
    }
}
