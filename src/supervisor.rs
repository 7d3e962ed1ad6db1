//! Sensor directory / supervisor: starts, stops, and lists sensor workers, and
//! fans out `get_state` queries with bounded concurrency and per-sensor timeouts.
//!
//! One-for-one restart policy: a small monitor task per sensor watches that sensor's
//! running flag and, on an unexpected exit, logs once and removes it from the live set —
//! no auto-respawn, since a stateless respawn of a stateful sensor would fabricate state
//! that was never told to the caller. A fresh `add_sensor` is what brings it back.

use crate::attention::AttentionTracker;
use crate::biomimetic::FactorProviders;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::pubsub::Bus;
use crate::store::AttributeStore;
use crate::types::{AttributeType, SensorId, Value};
use crate::worker::sensor::{self, SensorMeta, SensorStateSnapshot, SensorWorkerHandle};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DEFAULT_FANOUT_CONCURRENCY: usize = 10;
const DEFAULT_POINT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// `Default` returns the raw per-attribute history; `View` flattens it to the last value
/// per attribute with a normalized type, shaped for direct UI consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMode {
    Default,
    View,
}

#[derive(Debug, Clone)]
pub struct AttributeView {
    pub attribute_type: AttributeType,
    pub value: Value,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone)]
pub struct SensorStateView {
    pub sensor_id: SensorId,
    pub meta: SensorMeta,
    pub attributes: HashMap<String, AttributeView>,
}

#[derive(Debug, Clone)]
pub enum SensorStateResult {
    Ok(SensorStateSnapshot),
    View(SensorStateView),
    Unavailable { sensor_id: SensorId },
}

fn shape(state: SensorStateSnapshot, mode: StateMode) -> SensorStateResult {
    match mode {
        StateMode::Default => SensorStateResult::Ok(state),
        StateMode::View => {
            let attributes = state
                .attributes
                .into_iter()
                .filter_map(|(attribute_id, history)| {
                    let last = history.last()?.clone();
                    let attribute_type = AttributeType::infer(&attribute_id, &last.payload);
                    Some((attribute_id, AttributeView { attribute_type, value: last.payload, timestamp_ms: last.timestamp_ms }))
                })
                .collect();
            SensorStateResult::View(SensorStateView { sensor_id: state.sensor_id, meta: state.meta, attributes })
        }
    }
}

pub struct SensorDirectory {
    sensors: Arc<DashMap<SensorId, SensorWorkerHandle>>,
    store: Arc<AttributeStore>,
    bus: Arc<Bus>,
    tracker: Arc<AttentionTracker>,
    factors: FactorProviders,
    config: Arc<Config>,
}

impl SensorDirectory {
    pub fn new(bus: Arc<Bus>, store: Arc<AttributeStore>, tracker: Arc<AttentionTracker>, config: Arc<Config>) -> Self {
        Self { sensors: Arc::new(DashMap::new()), store, bus, tracker, factors: FactorProviders::default(), config }
    }

    pub fn with_factors(mut self, factors: FactorProviders) -> Self {
        self.factors = factors;
        self
    }

    /// Starts a new sensor worker if absent. Already-present is not an error — returns
    /// `Ok(())` either way, matching "already started" semantics.
    pub fn add_sensor(&self, sensor_id: SensorId, meta: SensorMeta) -> CoreResult<()> {
        if self.sensors.contains_key(&sensor_id) {
            return Ok(());
        }
        let handle = sensor::spawn(sensor_id.clone(), meta, self.store.clone(), self.bus.clone(), self.tracker.clone(), self.factors.clone(), self.config.clone());
        self.spawn_monitor(sensor_id.clone(), &handle);
        self.sensors.insert(sensor_id, handle);
        Ok(())
    }

    fn spawn_monitor(&self, sensor_id: SensorId, handle: &SensorWorkerHandle) {
        let sensors = self.sensors.clone();
        let running = handle.running.clone();
        // We can't clone a JoinHandle; the monitor instead polls the running flag, which
        // is cleared both by an explicit `remove_sensor` and by the worker task itself if
        // it ever exits its own loop unexpectedly.
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if !running.load(Ordering::Relaxed) {
                    if sensors.remove(&sensor_id).is_some() {
                        log::warn!("sensor {sensor_id} worker stopped; removed from directory");
                    }
                    break;
                }
                if !sensors.contains_key(&sensor_id) {
                    break; // removed through remove_sensor already
                }
            }
        });
    }

    /// Terminates the worker, which on its own teardown clears attention/store state and
    /// broadcasts `sensor_unregistered`. Unknown ids are a `Rejected` error to direct
    /// callers.
    pub fn remove_sensor(&self, sensor_id: &str) -> CoreResult<()> {
        match self.sensors.remove(sensor_id) {
            Some((_, handle)) => {
                handle.stop();
                Ok(())
            }
            None => Err(CoreError::rejected(format!("unknown sensor: {sensor_id}"))),
        }
    }

    pub fn list_sensors(&self) -> Vec<SensorId> {
        self.sensors.iter().map(|e| e.key().clone()).collect()
    }

    pub async fn get_sensor_state(&self, sensor_id: &str, mode: StateMode, n_values: usize) -> SensorStateResult {
        let Some(handle) = self.sensors.get(sensor_id).map(|e| e.value().clone()) else {
            return SensorStateResult::Unavailable { sensor_id: sensor_id.to_string() };
        };
        match tokio::time::timeout(DEFAULT_POINT_TIMEOUT, handle.get_state(n_values)).await {
            Ok(Some(state)) => shape(state, mode),
            _ => SensorStateResult::Unavailable { sensor_id: sensor_id.to_string() },
        }
    }

    /// Collects state for every known sensor with bounded concurrency and a per-sensor
    /// timeout; a timed-out or errored sensor is represented by a placeholder so one slow
    /// worker never blocks the rest.
    pub async fn get_all_sensors_state(&self, mode: StateMode, n_values: usize) -> Vec<SensorStateResult> {
        let ids = self.list_sensors();
        let semaphore = Arc::new(Semaphore::new(DEFAULT_FANOUT_CONCURRENCY));
        let mut tasks = Vec::with_capacity(ids.len());

        for sensor_id in ids {
            let semaphore = semaphore.clone();
            let sensors = self.sensors.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let Some(handle) = sensors.get(&sensor_id).map(|e| e.value().clone()) else {
                    return SensorStateResult::Unavailable { sensor_id };
                };
                match tokio::time::timeout(DEFAULT_FANOUT_TIMEOUT, handle.get_state(n_values)).await {
                    Ok(Some(state)) => shape(state, mode),
                    _ => SensorStateResult::Unavailable { sensor_id },
                }
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(_) => log::warn!("a get_all_sensors_state fan-out task panicked"),
            }
        }
        results
    }
}
