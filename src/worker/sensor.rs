//! Sensor worker: one actor task per live `sensor_id`, owning a registry of
//! attribute workers it spawns lazily on first write. Follows the same
//! actor-task-plus-cheap-handle shape as the attention tracker (`crate::attention`).

use super::attribute::{self, AttributeWorkerHandle};
use crate::attention::AttentionTracker;
use crate::biomimetic::FactorProviders;
use crate::config::Config;
use crate::pubsub::{data_topic, signal_topic, Bus, Message, DISCOVERY_SENSORS};
use crate::store::AttributeStore;
use crate::types::{AttentionLevel, AttributeId, Measurement, SensorId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

const MAILBOX_CAPACITY: usize = 256;
const HIBERNATION_CHECK_EVERY: Duration = Duration::from_secs(60);
// How often the actor loop wakes up to notice `running` was cleared from the outside,
// independent of whether a command ever arrives again.
const RUNNING_POLL_EVERY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct SensorMeta {
    pub sensor_name: String,
    pub sensor_type: String,
    pub connector_name: String,
}

impl Default for SensorMeta {
    fn default() -> Self {
        Self { sensor_name: String::new(), sensor_type: "generic".into(), connector_name: String::new() }
    }
}

#[derive(Debug, Clone)]
pub struct SensorStateSnapshot {
    pub sensor_id: SensorId,
    pub meta: SensorMeta,
    pub attributes: HashMap<AttributeId, Vec<Measurement>>,
}

enum Command {
    PutAttribute(Measurement),
    PutBatchAttributes(Vec<Measurement>),
    ClearAttribute(AttributeId),
    GetState(usize, oneshot::Sender<SensorStateSnapshot>),
    UpdateAttributeRegistry(AttributeId),
    UpdateConnectorName(String),
}

#[derive(Clone)]
pub struct SensorWorkerHandle {
    tx: mpsc::Sender<Command>,
    pub running: Arc<AtomicBool>,
}

impl SensorWorkerHandle {
    pub async fn put_attribute(&self, measurement: Measurement) {
        let _ = self.tx.send(Command::PutAttribute(measurement)).await;
    }

    pub async fn put_batch_attributes(&self, measurements: Vec<Measurement>) {
        let _ = self.tx.send(Command::PutBatchAttributes(measurements)).await;
    }

    pub async fn clear_attribute(&self, attribute_id: AttributeId) {
        let _ = self.tx.send(Command::ClearAttribute(attribute_id)).await;
    }

    /// `n_values` caps how many recent measurements are returned per attribute.
    pub async fn get_state(&self, n_values: usize) -> Option<SensorStateSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Command::GetState(n_values, tx)).await.ok()?;
        rx.await.ok()
    }

    pub async fn update_attribute_registry(&self, attribute_id: AttributeId) {
        let _ = self.tx.send(Command::UpdateAttributeRegistry(attribute_id)).await;
    }

    pub async fn update_connector_name(&self, connector_name: String) {
        let _ = self.tx.send(Command::UpdateConnectorName(connector_name)).await;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    sensor_id: SensorId,
    meta: SensorMeta,
    store: Arc<AttributeStore>,
    bus: Arc<Bus>,
    tracker: Arc<AttentionTracker>,
    factors: FactorProviders,
    config: Arc<Config>,
) -> SensorWorkerHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let running = Arc::new(AtomicBool::new(true));
    let running_task = running.clone();

    let node = "local".to_string();
    bus.publish(DISCOVERY_SENSORS, Message::SensorRegistered { sensor_id: sensor_id.clone(), node: node.clone() });

    let mut state = SensorState {
        sensor_id: sensor_id.clone(),
        meta,
        attribute_workers: HashMap::new(),
        last_active: Instant::now(),
        store,
        bus: bus.clone(),
        tracker,
        factors,
        config,
        running: running_task.clone(),
        node,
    };

    // Detached: task lifetime is tracked through `running`, not this JoinHandle.
    tokio::spawn(async move {
        state.run(rx).await;
    });

    SensorWorkerHandle { tx, running }
}

struct SensorState {
    sensor_id: SensorId,
    meta: SensorMeta,
    attribute_workers: HashMap<AttributeId, AttributeWorkerHandle>,
    last_active: Instant,
    store: Arc<AttributeStore>,
    bus: Arc<Bus>,
    tracker: Arc<AttentionTracker>,
    factors: FactorProviders,
    config: Arc<Config>,
    running: Arc<AtomicBool>,
    node: String,
}

impl SensorState {
    async fn run(&mut self, mut rx: mpsc::Receiver<Command>) {
        let mut hibernation_tick = tokio::time::interval(HIBERNATION_CHECK_EVERY);
        hibernation_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut poll_tick = tokio::time::interval(RUNNING_POLL_EVERY);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => break,
                    }
                }
                _ = hibernation_tick.tick() => self.check_hibernation(),
                _ = poll_tick.tick() => {}
            }
        }

        self.teardown().await;
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::PutAttribute(measurement) => {
                self.last_active = Instant::now();
                let attribute_id = measurement.attribute_id.clone();
                self.ensure_attribute_worker(&attribute_id);
                if let Some(w) = self.attribute_workers.get(&attribute_id) {
                    let _ = w.tx.send(measurement).await;
                }
            }
            Command::PutBatchAttributes(measurements) => {
                self.last_active = Instant::now();
                for measurement in measurements {
                    let attribute_id = measurement.attribute_id.clone();
                    self.ensure_attribute_worker(&attribute_id);
                    if let Some(w) = self.attribute_workers.get(&attribute_id) {
                        let _ = w.tx.send(measurement).await;
                    }
                }
            }
            Command::ClearAttribute(attribute_id) => {
                if let Some(w) = self.attribute_workers.remove(&attribute_id) {
                    w.stop();
                }
                self.store.remove_attribute(&self.sensor_id, &attribute_id);
            }
            Command::GetState(n_values, reply) => {
                let attributes = self
                    .attribute_workers
                    .keys()
                    .map(|attribute_id| {
                        let history = self.store.get_attribute_extended(&self.sensor_id, attribute_id, n_values);
                        (attribute_id.clone(), history)
                    })
                    .collect();
                let _ = reply.send(SensorStateSnapshot { sensor_id: self.sensor_id.clone(), meta: self.meta.clone(), attributes });
            }
            Command::UpdateAttributeRegistry(attribute_id) => {
                self.ensure_attribute_worker(&attribute_id);
            }
            Command::UpdateConnectorName(connector_name) => {
                self.meta.connector_name = connector_name;
            }
        }
    }

    fn ensure_attribute_worker(&mut self, attribute_id: &AttributeId) {
        if self.attribute_workers.contains_key(attribute_id) {
            return;
        }
        let handle = attribute::spawn(
            self.sensor_id.clone(),
            attribute_id.clone(),
            self.store.clone(),
            self.bus.clone(),
            self.tracker.clone(),
            self.factors.clone(),
            self.config.clone(),
            self.running.clone(),
        );
        self.attribute_workers.insert(attribute_id.clone(), handle);
    }

    /// Every 60s: when this sensor has been idle for `sensor_hibernate_after_ms` and its
    /// attention level is `low` or `none`, release the transient per-attribute buffers by
    /// stopping idle attribute workers. A subsequent write re-spawns them lazily.
    fn check_hibernation(&mut self) {
        let level = self.tracker.get_sensor_attention_level(&self.sensor_id);
        if !matches!(level, AttentionLevel::None | AttentionLevel::Low) {
            return;
        }
        if self.last_active.elapsed() < Duration::from_millis(self.config.sensor_hibernate_after_ms) {
            return;
        }
        if self.attribute_workers.is_empty() {
            return;
        }
        log::info!("sensor {} hibernating: releasing {} attribute worker(s)", self.sensor_id, self.attribute_workers.len());
        for (_, handle) in self.attribute_workers.drain() {
            handle.stop();
        }
    }

    async fn teardown(&mut self) {
        for (_, handle) in self.attribute_workers.drain() {
            handle.stop();
        }
        self.bus.publish(
            crate::pubsub::DISCOVERY_SENSORS,
            Message::SensorUnregistered { sensor_id: self.sensor_id.clone(), node: self.node.clone() },
        );
        self.bus.publish(&signal_topic(&self.sensor_id), Message::SensorUnregistered { sensor_id: self.sensor_id.clone(), node: self.node.clone() });
        self.store.cleanup(&self.sensor_id);
        let _ = data_topic(&self.sensor_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn test_config() -> Arc<Config> {
        Arc::new(Config { sensor_hibernate_after_ms: 0, ..Config::default() })
    }

    #[tokio::test]
    async fn put_attribute_spawns_a_worker_and_stores_data() {
        let bus = Arc::new(Bus::new());
        let store = Arc::new(AttributeStore::new(1000, 60_000));
        let config = test_config();
        let tracker = Arc::new(AttentionTracker::new(bus.clone(), &config));

        let handle = spawn("s1".into(), SensorMeta::default(), store.clone(), bus, tracker, FactorProviders::default(), config);
        handle.put_attribute(Measurement::new("s1", "numeric", 0, Value::Number(1.0))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = handle.get_state(10).await.expect("sensor worker gone");
        assert!(state.attributes.contains_key("numeric"));
        assert_eq!(state.attributes["numeric"].len(), 1);
        handle.stop();
    }

    #[tokio::test]
    async fn clear_attribute_removes_it_from_state() {
        let bus = Arc::new(Bus::new());
        let store = Arc::new(AttributeStore::new(1000, 60_000));
        let config = test_config();
        let tracker = Arc::new(AttentionTracker::new(bus.clone(), &config));

        let handle = spawn("s1".into(), SensorMeta::default(), store, bus, tracker, FactorProviders::default(), config);
        handle.put_attribute(Measurement::new("s1", "numeric", 0, Value::Number(1.0))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.clear_attribute("numeric".to_string()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = handle.get_state(10).await.expect("sensor worker gone");
        assert!(state.attributes.is_empty());
        handle.stop();
    }
}
