//! The attention tracker's single-writer actor: owns the authoritative interaction state
//! and republishes a `TrackerSnapshot` into the shared cache after every mutation.

use super::cache::{Cache, TrackerSnapshot};
use crate::config::AttentionCap;
use crate::pubsub::{attention_topic, data_attention_topic, sensor_attention_topic, Bus, Message};
use crate::types::{AttentionLevel, AttributeId, BatteryMetadata, BatteryState, SensorId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const FOCUS_BOOST: Duration = Duration::from_secs(5);
const HOVER_BOOST: Duration = Duration::from_secs(2);
const STALE_AFTER: Duration = Duration::from_secs(60);
const SWEEP_EVERY: Duration = Duration::from_secs(30);
const MAILBOX_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoostKind {
    Focus,
    Hover,
}

#[derive(Debug)]
pub enum Command {
    RegisterView { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    UnregisterView { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    RegisterHover { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    UnregisterHover { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    RegisterFocus { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    UnregisterFocus { sensor_id: SensorId, attribute_id: AttributeId, user_id: UserId },
    PinSensor { sensor_id: SensorId, user_id: UserId },
    UnpinSensor { sensor_id: SensorId, user_id: UserId },
    UnregisterAll { sensor_id: SensorId, user_id: UserId },
    ReportBattery { user_id: UserId, state: BatteryState, metadata: BatteryMetadata },
    BoostExpired { sensor_id: SensorId, attribute_id: AttributeId, kind: BoostKind, generation: u64 },
}

struct AttentionRecord {
    viewers: HashSet<UserId>,
    hovered: HashSet<UserId>,
    focused: HashSet<UserId>,
    focus_boost_expiry: Option<Instant>,
    hover_boost_expiry: Option<Instant>,
    last_updated: Instant,
}

impl AttentionRecord {
    fn new() -> Self {
        Self {
            viewers: HashSet::new(),
            hovered: HashSet::new(),
            focused: HashSet::new(),
            focus_boost_expiry: None,
            hover_boost_expiry: None,
            last_updated: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Instant::now();
    }

    fn is_empty(&self) -> bool {
        self.viewers.is_empty()
            && self.hovered.is_empty()
            && self.focused.is_empty()
            && self.focus_boost_expiry.is_none()
            && self.hover_boost_expiry.is_none()
    }
}

pub struct Handle {
    pub tx: mpsc::Sender<Command>,
    pub cache: Arc<Cache>,
    pub load_multiplier_bits: Arc<AtomicU64>,
}

pub fn spawn(bus: Arc<Bus>, battery_cap_low: AttentionCap, battery_cap_critical: AttentionCap) -> Handle {
    let cache = Arc::new(Cache::default());
    let load_multiplier_bits = Arc::new(AtomicU64::new(1.0f64.to_bits()));
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);

    let mut state = State {
        records: HashMap::new(),
        by_sensor: HashMap::new(),
        pins: HashMap::new(),
        batteries: HashMap::new(),
        generations: HashMap::new(),
        cache: cache.clone(),
        bus,
        battery_cap_low,
        battery_cap_critical,
        self_tx: tx.clone(),
    };

    tokio::spawn(async move {
        state.run(rx).await;
    });

    Handle { tx, cache, load_multiplier_bits }
}

struct State {
    records: HashMap<(SensorId, AttributeId), AttentionRecord>,
    by_sensor: HashMap<SensorId, HashSet<AttributeId>>,
    pins: HashMap<SensorId, HashSet<UserId>>,
    batteries: HashMap<UserId, BatteryState>,
    generations: HashMap<(SensorId, AttributeId, BoostKind), u64>,
    cache: Arc<Cache>,
    bus: Arc<Bus>,
    battery_cap_low: AttentionCap,
    battery_cap_critical: AttentionCap,
    self_tx: mpsc::Sender<Command>,
}

impl State {
    async fn run(&mut self, mut rx: mpsc::Receiver<Command>) {
        let mut sweep = tokio::time::interval(SWEEP_EVERY);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
                _ = sweep.tick() => self.sweep_stale(),
            }
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::RegisterView { sensor_id, attribute_id, user_id } => {
                self.record_mut(&sensor_id, &attribute_id).viewers.insert(user_id);
                self.touch_and_recompute(&sensor_id, &attribute_id);
            }
            Command::UnregisterView { sensor_id, attribute_id, user_id } => {
                if let Some(r) = self.records.get_mut(&(sensor_id.clone(), attribute_id.clone())) {
                    r.viewers.remove(&user_id);
                    r.touch();
                }
                self.recompute_and_broadcast(&sensor_id, &attribute_id);
            }
            Command::RegisterHover { sensor_id, attribute_id, user_id } => {
                let r = self.record_mut(&sensor_id, &attribute_id);
                r.hovered.insert(user_id);
                r.hover_boost_expiry = None;
                self.touch_and_recompute(&sensor_id, &attribute_id);
            }
            Command::UnregisterHover { sensor_id, attribute_id, user_id } => {
                if let Some(r) = self.records.get_mut(&(sensor_id.clone(), attribute_id.clone())) {
                    r.hovered.remove(&user_id);
                    r.touch();
                }
                self.arm_boost(&sensor_id, &attribute_id, BoostKind::Hover, HOVER_BOOST);
                self.recompute_and_broadcast(&sensor_id, &attribute_id);
            }
            Command::RegisterFocus { sensor_id, attribute_id, user_id } => {
                let r = self.record_mut(&sensor_id, &attribute_id);
                r.focused.insert(user_id);
                r.focus_boost_expiry = None;
                self.touch_and_recompute(&sensor_id, &attribute_id);
            }
            Command::UnregisterFocus { sensor_id, attribute_id, user_id } => {
                if let Some(r) = self.records.get_mut(&(sensor_id.clone(), attribute_id.clone())) {
                    r.focused.remove(&user_id);
                    r.touch();
                }
                self.arm_boost(&sensor_id, &attribute_id, BoostKind::Focus, FOCUS_BOOST);
                self.recompute_and_broadcast(&sensor_id, &attribute_id);
            }
            Command::PinSensor { sensor_id, user_id } => {
                self.pins.entry(sensor_id.clone()).or_default().insert(user_id);
                self.recompute_sensor_and_broadcast(&sensor_id);
            }
            Command::UnpinSensor { sensor_id, user_id } => {
                if let Some(set) = self.pins.get_mut(&sensor_id) {
                    set.remove(&user_id);
                    if set.is_empty() {
                        self.pins.remove(&sensor_id);
                    }
                }
                self.recompute_sensor_and_broadcast(&sensor_id);
            }
            Command::UnregisterAll { sensor_id, user_id } => {
                if let Some(set) = self.pins.get_mut(&sensor_id) {
                    set.remove(&user_id);
                    if set.is_empty() {
                        self.pins.remove(&sensor_id);
                    }
                }
                if let Some(attrs) = self.by_sensor.get(&sensor_id).cloned() {
                    for attribute_id in attrs {
                        if let Some(r) = self.records.get_mut(&(sensor_id.clone(), attribute_id.clone())) {
                            r.viewers.remove(&user_id);
                            r.hovered.remove(&user_id);
                            r.focused.remove(&user_id);
                            r.touch();
                        }
                        self.recompute_attribute(&sensor_id, &attribute_id);
                    }
                }
                self.publish_snapshot();
            }
            Command::ReportBattery { user_id, state, .. } => {
                self.batteries.insert(user_id, state);
                // A battery change can move any attribute this user contributes to; the
                // simplest correct response is a full recompute, which is cheap relative
                // to how rarely battery state changes.
                let keys: Vec<(SensorId, AttributeId)> = self.records.keys().cloned().collect();
                for (s, a) in keys {
                    self.recompute_attribute(&s, &a);
                }
                self.publish_snapshot();
            }
            Command::BoostExpired { sensor_id, attribute_id, kind, generation } => {
                let key = (sensor_id.clone(), attribute_id.clone(), kind);
                if self.generations.get(&key).copied() != Some(generation) {
                    return; // stale timer, superseded by a re-arm
                }
                if let Some(r) = self.records.get_mut(&(sensor_id.clone(), attribute_id.clone())) {
                    match kind {
                        BoostKind::Focus => r.focus_boost_expiry = None,
                        BoostKind::Hover => r.hover_boost_expiry = None,
                    }
                }
                self.recompute_and_broadcast(&sensor_id, &attribute_id);
            }
        }
    }

    fn record_mut(&mut self, sensor_id: &str, attribute_id: &str) -> &mut AttentionRecord {
        self.by_sensor.entry(sensor_id.to_string()).or_default().insert(attribute_id.to_string());
        self.records
            .entry((sensor_id.to_string(), attribute_id.to_string()))
            .or_insert_with(AttentionRecord::new)
    }

    fn touch_and_recompute(&mut self, sensor_id: &str, attribute_id: &str) {
        self.recompute_and_broadcast(sensor_id, attribute_id);
    }

    fn arm_boost(&mut self, sensor_id: &str, attribute_id: &str, kind: BoostKind, duration: Duration) {
        let expiry = Instant::now() + duration;
        if let Some(r) = self.records.get_mut(&(sensor_id.to_string(), attribute_id.to_string())) {
            match kind {
                BoostKind::Focus => r.focus_boost_expiry = Some(expiry),
                BoostKind::Hover => r.hover_boost_expiry = Some(expiry),
            }
        } else {
            return;
        }

        let key = (sensor_id.to_string(), attribute_id.to_string(), kind);
        let generation = self.generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        let generation = *generation;

        let tx = self.self_tx.clone();
        let sensor_id = sensor_id.to_string();
        let attribute_id = attribute_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx
                .send(Command::BoostExpired { sensor_id, attribute_id, kind, generation })
                .await;
        });
    }

    fn compute_attribute_level(&self, sensor_id: &str, attribute_id: &str) -> AttentionLevel {
        let Some(record) = self.records.get(&(sensor_id.to_string(), attribute_id.to_string())) else {
            return AttentionLevel::None;
        };

        let now = Instant::now();
        let focus_boost = record.focus_boost_expiry.map(|e| e > now).unwrap_or(false);
        let hover_boost = record.hover_boost_expiry.map(|e| e > now).unwrap_or(false);

        let mut best = AttentionLevel::None;

        for user in &record.focused {
            best = best.max(self.capped(user, AttentionLevel::High));
        }
        for user in &record.hovered {
            best = best.max(self.capped(user, AttentionLevel::High));
        }
        for user in &record.viewers {
            best = best.max(self.capped(user, AttentionLevel::Medium));
        }
        if focus_boost || hover_boost {
            best = best.max(AttentionLevel::High);
        }

        if best == AttentionLevel::None {
            if record.is_empty() {
                AttentionLevel::None
            } else {
                AttentionLevel::Low
            }
        } else {
            best
        }
    }

    fn capped(&self, user_id: &str, raw: AttentionLevel) -> AttentionLevel {
        match self.batteries.get(user_id) {
            None | Some(BatteryState::Normal) => raw,
            Some(BatteryState::Low) => raw.min(cap_level(self.battery_cap_low)),
            Some(BatteryState::Critical) => raw.min(cap_level(self.battery_cap_critical)),
        }
    }

    fn recompute_attribute(&mut self, sensor_id: &str, attribute_id: &str) {
        // Drop truly-empty, non-pinned, never-boosted records immediately rather than
        // waiting for the staleness sweep, so idle attributes don't linger in the cache.
        let key = (sensor_id.to_string(), attribute_id.to_string());
        if let Some(r) = self.records.get(&key) {
            if r.is_empty() {
                self.records.remove(&key);
                if let Some(set) = self.by_sensor.get_mut(sensor_id) {
                    set.remove(attribute_id);
                }
            }
        }
    }

    fn recompute_and_broadcast(&mut self, sensor_id: &str, attribute_id: &str) {
        let before = self.cache.attention_level(sensor_id, attribute_id);
        self.recompute_attribute(sensor_id, attribute_id);
        self.publish_snapshot();
        let after = self.cache.attention_level(sensor_id, attribute_id);
        if before != after {
            self.bus.publish(
                &attention_topic(sensor_id, attribute_id),
                Message::AttentionChanged {
                    sensor_id: sensor_id.to_string(),
                    attribute_id: Some(attribute_id.to_string()),
                    level: after,
                },
            );
            self.bus.publish(
                &data_attention_topic(after),
                Message::AttentionChanged {
                    sensor_id: sensor_id.to_string(),
                    attribute_id: Some(attribute_id.to_string()),
                    level: after,
                },
            );
        }
        self.recompute_sensor_and_broadcast(sensor_id);
    }

    fn recompute_sensor_and_broadcast(&mut self, sensor_id: &str) {
        let before = self.cache.sensor_attention_level(sensor_id);
        self.publish_snapshot();
        let after = self.cache.sensor_attention_level(sensor_id);
        if before != after {
            self.bus.publish(
                &sensor_attention_topic(sensor_id),
                Message::AttentionChanged { sensor_id: sensor_id.to_string(), attribute_id: None, level: after },
            );
        }
    }

    fn sweep_stale(&mut self) {
        let now = Instant::now();
        let stale: Vec<(SensorId, AttributeId)> = self
            .records
            .iter()
            .filter(|(_, r)| now.duration_since(r.last_updated) >= STALE_AFTER)
            .map(|(k, _)| k.clone())
            .collect();

        for (sensor_id, attribute_id) in stale {
            if self.pins.get(&sensor_id).map(|s| !s.is_empty()).unwrap_or(false) {
                continue; // pins are exempt from staleness
            }
            self.records.remove(&(sensor_id.clone(), attribute_id.clone()));
            if let Some(set) = self.by_sensor.get_mut(&sensor_id) {
                set.remove(&attribute_id);
            }
            log::debug!("attention: dropped stale record for {sensor_id}/{attribute_id}");
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let mut levels = HashMap::new();
        let mut sensor_levels: HashMap<SensorId, AttentionLevel> = HashMap::new();

        for (sensor_id, attrs) in &self.by_sensor {
            let mut sensor_best = AttentionLevel::None;
            for attribute_id in attrs {
                let level = self.compute_attribute_level(sensor_id, attribute_id);
                levels.insert((sensor_id.clone(), attribute_id.clone()), level);
                sensor_best = sensor_best.max(level);
            }
            sensor_levels.insert(sensor_id.clone(), sensor_best);
        }

        let pinned: HashSet<SensorId> = self.pins.iter().filter(|(_, users)| !users.is_empty()).map(|(s, _)| s.clone()).collect();

        self.cache.store(TrackerSnapshot { levels, sensor_levels, pinned });
    }
}

fn cap_level(cap: AttentionCap) -> AttentionLevel {
    match cap {
        AttentionCap::Medium => AttentionLevel::Medium,
        AttentionCap::Low => AttentionLevel::Low,
    }
}
