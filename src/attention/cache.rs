//! The attention tracker's read cache: an immutable snapshot behind `ArcSwap`
//! An immutable snapshot behind `ArcSwap`. `get_attention_level`
//! and friends load the current `Arc` with no locking and no task hop — true O(1) reads
//! that never suspend, independent of how busy the writer actor is.

use crate::types::{AttentionLevel, AttributeId, SensorId};
use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct TrackerSnapshot {
    pub levels: HashMap<(SensorId, AttributeId), AttentionLevel>,
    pub sensor_levels: HashMap<SensorId, AttentionLevel>,
    pub pinned: HashSet<SensorId>,
}

pub struct Cache {
    inner: ArcSwap<TrackerSnapshot>,
}

impl Default for Cache {
    fn default() -> Self {
        Self { inner: ArcSwap::from_pointee(TrackerSnapshot::default()) }
    }
}

impl Cache {
    pub fn load(&self) -> Arc<TrackerSnapshot> {
        self.inner.load_full()
    }

    pub fn store(&self, snapshot: TrackerSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }

    pub fn attention_level(&self, sensor_id: &str, attribute_id: &str) -> AttentionLevel {
        let snap = self.load();
        if snap.pinned.contains(sensor_id) {
            return AttentionLevel::High;
        }
        snap.levels
            .get(&(sensor_id.to_string(), attribute_id.to_string()))
            .copied()
            .unwrap_or(AttentionLevel::None)
    }

    pub fn sensor_attention_level(&self, sensor_id: &str) -> AttentionLevel {
        let snap = self.load();
        if snap.pinned.contains(sensor_id) {
            return AttentionLevel::High;
        }
        snap.sensor_levels.get(sensor_id).copied().unwrap_or(AttentionLevel::None)
    }
}
