//! Attribute worker: one `tokio::task` per live `(sensor_id, attribute_id)`,
//! following an `Arc<AtomicBool>` running-flag + `tokio::select!` task shape shared with
//! the sensor worker.
//!
//! Ingests measurements into the tiered store, batches them, and emits on whichever comes
//! first: the buffer filling up, or the adaptive batch-window timer firing. The window
//! itself is recomputed whenever attention or system load changes.

use crate::attention::AttentionTracker;
use crate::biomimetic::FactorProviders;
use crate::config::Config;
use crate::pubsub::{attention_topic, data_attention_topic, data_topic, sensor_attention_topic, Bus, Message};
use crate::store::AttributeStore;
use crate::types::{AttentionLevel, AttributeId, Measurement, SensorId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

/// Nominal cadence before attention/load scaling. Not separately configurable per
/// attribute type in this revision; `calculate_batch_window` is what actually drives the
/// effective window.
const BASE_DELAY_MS: u64 = 500;
const MAX_BATCH_SIZE: usize = 64;
const MAILBOX_CAPACITY: usize = 512;

pub struct AttributeWorkerHandle {
    pub tx: mpsc::Sender<Measurement>,
    pub running: Arc<AtomicBool>,
    pub join: JoinHandle<()>,
}

impl AttributeWorkerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    sensor_id: SensorId,
    attribute_id: AttributeId,
    store: Arc<AttributeStore>,
    bus: Arc<Bus>,
    tracker: Arc<AttentionTracker>,
    factors: FactorProviders,
    config: Arc<Config>,
    sensor_running: Arc<AtomicBool>,
) -> AttributeWorkerHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let running = Arc::new(AtomicBool::new(true));
    let running_task = running.clone();

    let join = tokio::spawn(async move {
        run(sensor_id, attribute_id, store, bus, tracker, factors, config, sensor_running, running_task, rx).await;
    });

    AttributeWorkerHandle { tx, running, join }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    sensor_id: SensorId,
    attribute_id: AttributeId,
    store: Arc<AttributeStore>,
    bus: Arc<Bus>,
    tracker: Arc<AttentionTracker>,
    factors: FactorProviders,
    config: Arc<Config>,
    sensor_running: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    mut mailbox: mpsc::Receiver<Measurement>,
) {
    let mut attention_sub = bus.subscribe(attention_topic(&sensor_id, &attribute_id));
    let mut sensor_attention_sub = bus.subscribe(sensor_attention_topic(&sensor_id));
    let mut load_sub = bus.subscribe(crate::pubsub::SYSTEM_LOAD);
    let priority = config.priority_attributes.contains(&attribute_id);

    let mut pending: Vec<Measurement> = Vec::with_capacity(MAX_BATCH_SIZE);
    let mut window_ms = tracker.calculate_batch_window(&sensor_id, &attribute_id, BASE_DELAY_MS, &factors);
    let mut interval = new_interval(window_ms);

    log::debug!("attribute worker started for {sensor_id}/{attribute_id}, window={window_ms}ms");

    while running.load(Ordering::Relaxed) && sensor_running.load(Ordering::Relaxed) {
        tokio::select! {
            _ = interval.tick() => {
                emit(&bus, &tracker, &sensor_id, &attribute_id, priority, &mut pending);
            }
            received = mailbox.recv() => {
                match received {
                    Some(mut measurement) => {
                        measurement.sensor_id = sensor_id.clone();
                        measurement.attribute_id = attribute_id.clone();
                        store.put_attribute(measurement.clone(), current_load(&tracker));
                        pending.push(measurement);
                        if pending.len() >= MAX_BATCH_SIZE {
                            emit(&bus, &tracker, &sensor_id, &attribute_id, priority, &mut pending);
                        }
                    }
                    None => break,
                }
            }
            msg = attention_sub.recv() => {
                if msg.is_some() {
                    let new_window = tracker.calculate_batch_window(&sensor_id, &attribute_id, BASE_DELAY_MS, &factors);
                    if new_window != window_ms {
                        window_ms = new_window;
                        interval = new_interval(window_ms);
                        log::debug!("attribute worker {sensor_id}/{attribute_id} window -> {window_ms}ms (attention)");
                    }
                } else {
                    break;
                }
            }
            msg = load_sub.recv() => {
                if msg.is_some() {
                    let new_window = tracker.calculate_batch_window(&sensor_id, &attribute_id, BASE_DELAY_MS, &factors);
                    if new_window != window_ms {
                        window_ms = new_window;
                        interval = new_interval(window_ms);
                        log::debug!("attribute worker {sensor_id}/{attribute_id} window -> {window_ms}ms (load)");
                    }
                } else {
                    break;
                }
            }
            msg = sensor_attention_sub.recv() => {
                if msg.is_some() {
                    let new_window = tracker.calculate_batch_window(&sensor_id, &attribute_id, BASE_DELAY_MS, &factors);
                    if new_window != window_ms {
                        window_ms = new_window;
                        interval = new_interval(window_ms);
                        log::debug!("attribute worker {sensor_id}/{attribute_id} window -> {window_ms}ms (sensor-wide attention)");
                    }
                } else {
                    break;
                }
            }
        }
    }

    // Flush whatever is left so a shutdown never silently drops a partial batch.
    emit(&bus, &tracker, &sensor_id, &attribute_id, priority, &mut pending);
    bus.unsubscribe(&attention_sub);
    bus.unsubscribe(&sensor_attention_sub);
    bus.unsubscribe(&load_sub);
    log::debug!("attribute worker stopped for {sensor_id}/{attribute_id}");
}

fn new_interval(window_ms: u64) -> time::Interval {
    let mut interval = time::interval(Duration::from_millis(window_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

fn current_load(tracker: &AttentionTracker) -> crate::types::LoadLevel {
    let multiplier = tracker.current_load_multiplier();
    if multiplier <= 1.0 {
        crate::types::LoadLevel::Normal
    } else if multiplier <= 1.5 {
        crate::types::LoadLevel::Elevated
    } else if multiplier <= 3.0 {
        crate::types::LoadLevel::High
    } else {
        crate::types::LoadLevel::Critical
    }
}

/// Emits the pending batch, or does nothing on an empty timer tick. Broadcasts on the
/// sensor's plain data topic, plus the attention-sharded topic when the attribute's level
/// is above `None` or the attribute is in the configured priority set.
fn emit(bus: &Bus, tracker: &AttentionTracker, sensor_id: &SensorId, attribute_id: &AttributeId, priority: bool, pending: &mut Vec<Measurement>) {
    if pending.is_empty() {
        return;
    }
    let measurements = std::mem::take(pending);
    bus.publish(&data_topic(sensor_id), Message::MeasurementsBatch { sensor_id: sensor_id.clone(), measurements: measurements.clone() });

    let level = tracker.get_attention_level(sensor_id, attribute_id);
    if level != AttentionLevel::None {
        bus.publish(&data_attention_topic(level), Message::MeasurementsBatch { sensor_id: sensor_id.clone(), measurements: measurements.clone() });
    } else if priority {
        bus.publish(&data_attention_topic(AttentionLevel::High), Message::MeasurementsBatch { sensor_id: sensor_id.clone(), measurements });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn worker_batches_and_emits_on_timer() {
        let bus = Arc::new(Bus::new());
        let store = Arc::new(AttributeStore::new(1000, 60_000));
        let config = Arc::new(Config::default());
        let tracker = Arc::new(AttentionTracker::new(bus.clone(), &config));
        let sensor_running = Arc::new(AtomicBool::new(true));

        let mut data_sub = bus.subscribe(data_topic("s1"));
        let handle = spawn(
            "s1".into(),
            "numeric".into(),
            store.clone(),
            bus.clone(),
            tracker.clone(),
            FactorProviders::default(),
            config,
            sensor_running,
        );

        handle.tx.send(Measurement::new("s1", "numeric", 0, Value::Number(1.0))).await.unwrap();
        handle.tx.send(Measurement::new("s1", "numeric", 1, Value::Number(2.0))).await.unwrap();

        let msg = tokio::time::timeout(StdDuration::from_secs(2), data_sub.recv()).await.expect("timed out waiting for batch").unwrap();
        match &*msg {
            Message::MeasurementsBatch { measurements, .. } => assert_eq!(measurements.len(), 2),
            other => panic!("unexpected message: {other:?}"),
        }

        handle.stop();
    }

    #[tokio::test]
    async fn worker_emits_immediately_once_batch_is_full() {
        let bus = Arc::new(Bus::new());
        let store = Arc::new(AttributeStore::new(1000, 60_000));
        let config = Arc::new(Config::default());
        let tracker = Arc::new(AttentionTracker::new(bus.clone(), &config));
        let sensor_running = Arc::new(AtomicBool::new(true));

        let mut data_sub = bus.subscribe(data_topic("s1"));
        let handle = spawn(
            "s1".into(),
            "numeric".into(),
            store,
            bus.clone(),
            tracker,
            FactorProviders::default(),
            config,
            sensor_running,
        );

        for i in 0..MAX_BATCH_SIZE {
            handle.tx.send(Measurement::new("s1", "numeric", i as i64, Value::Number(i as f64))).await.unwrap();
        }

        let msg = tokio::time::timeout(StdDuration::from_millis(500), data_sub.recv()).await.expect("timed out").unwrap();
        match &*msg {
            Message::MeasurementsBatch { measurements, .. } => assert_eq!(measurements.len(), MAX_BATCH_SIZE),
            other => panic!("unexpected message: {other:?}"),
        }

        handle.stop();
    }
}
