//! Attention tracking: turns raw view/hover/focus/pin signals and battery
//! reports from connected users into a per-attribute `AttentionLevel`, and derives the
//! adaptive batch window each worker throttles against.
//!
//! Writes go through a single actor task (`actor::spawn`); reads hit a lock-free
//! `ArcSwap` snapshot (`cache::Cache`) so a busy writer never makes a reader wait.

mod actor;
mod cache;

pub use actor::BoostKind;
pub use cache::TrackerSnapshot;

use crate::config::Config;
use crate::pubsub::{Bus, Message, SYSTEM_LOAD};
use crate::types::{AttentionLevel, AttributeId, BatteryMetadata, BatteryState, SensorId, UserId};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Batch-window tuning for one `AttentionLevel`: `multiplier` scales the attribute
/// worker's base delay, `min_ms`/`max_ms` bound the adaptive window.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindowConfig {
    pub multiplier: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

fn batch_window_for(level: AttentionLevel) -> BatchWindowConfig {
    match level {
        AttentionLevel::High => BatchWindowConfig { multiplier: 0.2, min_ms: 100, max_ms: 500 },
        AttentionLevel::Medium => BatchWindowConfig { multiplier: 0.4, min_ms: 150, max_ms: 500 },
        AttentionLevel::Low => BatchWindowConfig { multiplier: 4.0, min_ms: 2_000, max_ms: 10_000 },
        AttentionLevel::None => BatchWindowConfig { multiplier: 10.0, min_ms: 5_000, max_ms: 30_000 },
    }
}

#[derive(Clone)]
pub struct AttentionTracker {
    handle: Arc<actor::Handle>,
}

impl AttentionTracker {
    pub fn new(bus: Arc<Bus>, config: &Config) -> Self {
        let handle = actor::spawn(bus.clone(), config.attention_battery_cap_low, config.attention_battery_cap_critical);
        let load_multiplier_bits = handle.load_multiplier_bits.clone();

        tokio::spawn(async move {
            let mut sub = bus.subscribe(SYSTEM_LOAD);
            loop {
                match sub.recv().await {
                    Some(msg) => {
                        if let Message::SystemLoadChanged { multiplier, .. } = &*msg {
                            load_multiplier_bits.store(multiplier.to_bits(), Ordering::Relaxed);
                        }
                    }
                    None => break,
                }
            }
        });

        Self { handle: Arc::new(handle) }
    }

    pub async fn register_view(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::RegisterView {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn unregister_view(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::UnregisterView {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn register_hover(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::RegisterHover {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn unregister_hover(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::UnregisterHover {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn register_focus(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::RegisterFocus {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn unregister_focus(&self, sensor_id: &SensorId, attribute_id: &AttributeId, user_id: &UserId) {
        self.send(actor::Command::UnregisterFocus {
            sensor_id: sensor_id.clone(),
            attribute_id: attribute_id.clone(),
            user_id: user_id.clone(),
        })
        .await;
    }

    pub async fn pin_sensor(&self, sensor_id: &SensorId, user_id: &UserId) {
        self.send(actor::Command::PinSensor { sensor_id: sensor_id.clone(), user_id: user_id.clone() }).await;
    }

    pub async fn unpin_sensor(&self, sensor_id: &SensorId, user_id: &UserId) {
        self.send(actor::Command::UnpinSensor { sensor_id: sensor_id.clone(), user_id: user_id.clone() }).await;
    }

    pub async fn unregister_all(&self, sensor_id: &SensorId, user_id: &UserId) {
        self.send(actor::Command::UnregisterAll { sensor_id: sensor_id.clone(), user_id: user_id.clone() }).await;
    }

    pub async fn report_battery_state(&self, user_id: &UserId, state: BatteryState, metadata: BatteryMetadata) {
        self.send(actor::Command::ReportBattery { user_id: user_id.clone(), state, metadata }).await;
    }

    async fn send(&self, cmd: actor::Command) {
        if self.handle.tx.send(cmd).await.is_err() {
            log::warn!("attention tracker actor is gone; dropping command");
        }
    }

    /// Lock-free read: never awaits, never blocks on the writer actor.
    pub fn get_attention_level(&self, sensor_id: &SensorId, attribute_id: &AttributeId) -> AttentionLevel {
        self.handle.cache.attention_level(sensor_id, attribute_id)
    }

    pub fn get_sensor_attention_level(&self, sensor_id: &SensorId) -> AttentionLevel {
        self.handle.cache.sensor_attention_level(sensor_id)
    }

    pub fn get_attention_config(&self, level: AttentionLevel) -> BatchWindowConfig {
        batch_window_for(level)
    }

    pub fn current_load_multiplier(&self) -> f64 {
        f64::from_bits(self.handle.load_multiplier_bits.load(Ordering::Relaxed))
    }

    /// Combines attention level, current system load, and any biomimetic factors into the
    /// batch window an attribute worker should use right now.
    pub fn calculate_batch_window(
        &self,
        sensor_id: &SensorId,
        attribute_id: &AttributeId,
        base_delay_ms: u64,
        factors: &crate::biomimetic::FactorProviders,
    ) -> u64 {
        let level = self.get_attention_level(sensor_id, attribute_id);
        let cfg = batch_window_for(level);
        let load_mult = self.current_load_multiplier();
        let bio_mult = factors.novelty_factor(sensor_id, attribute_id)
            * factors.predictive_factor(sensor_id)
            * factors.competitive_factor(sensor_id)
            * factors.circadian_factor();

        let raw = (base_delay_ms.max(1) as f64) * cfg.multiplier * load_mult * bio_mult;
        (raw.round() as u64).clamp(cfg.min_ms, cfg.max_ms)
    }
}
