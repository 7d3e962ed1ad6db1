//! Replicator pool: a fixed-size pool of batching workers, each routed a
//! subset of sensors by a consistent hash of `sensor_id`. Each worker subscribes to its
//! assigned sensors' `data:<sensor_id>` topics and hands accumulated batches to a
//! pluggable sink, following the "one task, one mailbox, drain-on-timer-or-size" shape
//! used throughout this crate's workers.

use crate::pubsub::{data_topic, Bus, Message};
use crate::types::{Measurement, SensorId};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, MissedTickBehavior};

const BATCH_SIZE: usize = 100;
const BATCH_TIMEOUT: Duration = Duration::from_millis(1000);
const ROUTING_MAILBOX_CAPACITY: usize = 128;

/// Downstream consumer of replicated batches. The core ships only `NullSink` and
/// `ChannelSink`; a real sink (DB, network) is the embedder's to implement.
pub trait ReplicatorSink: Send + Sync {
    fn accept(&self, sensor_id: &str, batch: &[Measurement]);
}

/// Discards everything. Useful as a default when no downstream is configured.
pub struct NullSink;

impl ReplicatorSink for NullSink {
    fn accept(&self, _sensor_id: &str, _batch: &[Measurement]) {}
}

/// Forwards each batch over an unbounded channel; intended for tests and local embedding
/// where the caller wants to observe replicated batches directly.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(SensorId, Vec<Measurement>)>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SensorId, Vec<Measurement>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReplicatorSink for ChannelSink {
    fn accept(&self, sensor_id: &str, batch: &[Measurement]) {
        let _ = self.tx.send((sensor_id.to_string(), batch.to_vec()));
    }
}

fn route(sensor_id: &str, pool_size: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    sensor_id.hash(&mut hasher);
    (hasher.finish() as usize) % pool_size
}

enum WorkerCommand {
    SensorUp(SensorId),
    SensorDown(SensorId),
}

/// One forwarding task per subscribed sensor, so the worker's main loop can `select!`
/// over a single mailbox instead of a dynamically-sized set of bus subscriptions.
struct ForwardedSubscription {
    running: Arc<AtomicBool>,
}

pub struct ReplicatorPool {
    pool_size: usize,
    workers: Vec<mpsc::Sender<WorkerCommand>>,
    running: Arc<AtomicBool>,
}

impl ReplicatorPool {
    pub fn spawn(bus: Arc<Bus>, pool_size: usize, sink_factory: impl Fn() -> Arc<dyn ReplicatorSink>) -> Self {
        let pool_size = pool_size.max(1);
        let running = Arc::new(AtomicBool::new(true));
        let mut workers = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            let (tx, rx) = mpsc::channel(ROUTING_MAILBOX_CAPACITY);
            let sink = sink_factory();
            let bus = bus.clone();
            let running = running.clone();
            tokio::spawn(async move {
                run_worker(sink, bus, running, rx).await;
            });
            workers.push(tx);
        }

        Self { pool_size, workers, running }
    }

    pub async fn sensor_up(&self, sensor_id: SensorId) {
        let idx = route(&sensor_id, self.pool_size);
        let _ = self.workers[idx].send(WorkerCommand::SensorUp(sensor_id)).await;
    }

    pub async fn sensor_down(&self, sensor_id: SensorId) {
        let idx = route(&sensor_id, self.pool_size);
        let _ = self.workers[idx].send(WorkerCommand::SensorDown(sensor_id)).await;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn run_worker(sink: Arc<dyn ReplicatorSink>, bus: Arc<Bus>, running: Arc<AtomicBool>, mut commands: mpsc::Receiver<WorkerCommand>) {
    let mut forwarded: std::collections::HashMap<SensorId, ForwardedSubscription> = std::collections::HashMap::new();
    let mut pending: std::collections::HashMap<SensorId, Vec<Measurement>> = std::collections::HashMap::new();
    let (forward_tx, mut forward_rx) = mpsc::channel::<(SensorId, Arc<Message>)>(ROUTING_MAILBOX_CAPACITY * 4);
    let mut flush_tick = time::interval(BATCH_TIMEOUT);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    Some(WorkerCommand::SensorUp(sensor_id)) => {
                        forwarded.entry(sensor_id.clone()).or_insert_with(|| spawn_forwarder(&bus, sensor_id.clone(), forward_tx.clone()));
                    }
                    Some(WorkerCommand::SensorDown(sensor_id)) => {
                        if let Some(forwarder) = forwarded.remove(&sensor_id) {
                            forwarder.running.store(false, Ordering::Relaxed);
                        }
                        if let Some(batch) = pending.remove(&sensor_id) {
                            if !batch.is_empty() {
                                sink.accept(&sensor_id, &batch);
                            }
                        }
                    }
                    None => break,
                }
            }
            forwarded_msg = forward_rx.recv() => {
                let Some((sensor_id, msg)) = forwarded_msg else { continue };
                if let Message::MeasurementsBatch { measurements, .. } = &*msg {
                    let buf = pending.entry(sensor_id.clone()).or_default();
                    buf.extend(measurements.iter().cloned());
                    if buf.len() >= BATCH_SIZE {
                        sink.accept(&sensor_id, buf);
                        buf.clear();
                    }
                }
            }
            _ = flush_tick.tick() => {
                for (sensor_id, batch) in pending.iter_mut() {
                    if !batch.is_empty() {
                        sink.accept(sensor_id, batch);
                        batch.clear();
                    }
                }
            }
        }
    }

    for (_, forwarder) in forwarded {
        forwarder.running.store(false, Ordering::Relaxed);
    }
}

fn spawn_forwarder(bus: &Arc<Bus>, sensor_id: SensorId, forward_tx: mpsc::Sender<(SensorId, Arc<Message>)>) -> ForwardedSubscription {
    let stop = Arc::new(AtomicBool::new(true));
    let running = stop.clone();
    let bus = bus.clone();
    tokio::spawn(async move {
        let mut sub = bus.subscribe(data_topic(&sensor_id));
        while running.load(Ordering::Relaxed) {
            match sub.recv().await {
                Some(msg) => {
                    if forward_tx.send((sensor_id.clone(), msg)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
        bus.unsubscribe(&sub);
    });
    ForwardedSubscription { running: stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[tokio::test]
    async fn sensor_up_routes_and_batches_delivery() {
        let bus = Arc::new(Bus::new());
        let (sink, mut rx) = ChannelSink::new();
        let sink = Arc::new(sink);
        let pool = ReplicatorPool::spawn(bus.clone(), 2, {
            let sink = sink.clone();
            move || sink.clone() as Arc<dyn ReplicatorSink>
        });

        pool.sensor_up("s1".to_string()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(
            &data_topic("s1"),
            Message::MeasurementsBatch { sensor_id: "s1".into(), measurements: vec![Measurement::new("s1", "hr", 0, Value::Number(1.0))] },
        );

        let (sensor_id, batch) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.expect("timed out").expect("channel closed");
        assert_eq!(sensor_id, "s1");
        assert_eq!(batch.len(), 1);

        pool.stop();
    }

    #[test]
    fn routing_is_stable_for_the_same_sensor_id() {
        assert_eq!(route("s1", 8), route("s1", 8));
    }
}
