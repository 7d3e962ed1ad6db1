//! Tiered attribute store: a lock-light hot/warm ring per
//! `(sensor_id, attribute_id)`, backed by a `DashMap` so many attribute workers can write
//! their own key concurrently without contending on a single global lock. Each key's write
//! path is serialized by construction — exactly one attribute worker owns a given key.

use crate::types::{AttributeId, AttributeType, LoadLevel, Measurement, SensorId};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Instant;

const MIN_HOT_LIMIT: usize = 10;
const MIN_WARM_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub hot_limit: usize,
    pub warm_limit: usize,
}

fn base_limits_for(attribute_type: AttributeType) -> TierLimits {
    if attribute_type.is_realtime_only() {
        TierLimits { hot_limit: 1, warm_limit: 0 }
    } else {
        TierLimits { hot_limit: 1000, warm_limit: 60_000 }
    }
}

/// Scales `base` by the load level's store multipliers, clamped so a
/// degraded system still keeps a minimally useful window rather than trimming to zero.
fn scaled_limits(base: TierLimits, load: LoadLevel) -> TierLimits {
    if base.warm_limit == 0 {
        // realtime-only types are exempt from load scaling: they already hold exactly
        // the newest sample.
        return base;
    }
    let (hot_mult, warm_mult) = load.store_multipliers();
    TierLimits {
        hot_limit: ((base.hot_limit as f64 * hot_mult).round() as usize).max(MIN_HOT_LIMIT),
        warm_limit: ((base.warm_limit as f64 * warm_mult).round() as usize).max(MIN_WARM_LIMIT),
    }
}

struct TierEntry {
    hot: VecDeque<Measurement>,
    hot_count: usize,
    warm: VecDeque<Measurement>,
    attribute_type: AttributeType,
    updated_at: Instant,
}

impl TierEntry {
    fn new(attribute_type: AttributeType) -> Self {
        Self { hot: VecDeque::new(), hot_count: 0, warm: VecDeque::new(), attribute_type, updated_at: Instant::now() }
    }
}

pub struct AttributeStore {
    entries: DashMap<(SensorId, AttributeId), TierEntry>,
    hot_base: usize,
    warm_base: usize,
}

impl AttributeStore {
    pub fn new(hot_base: usize, warm_base: usize) -> Self {
        Self { entries: DashMap::new(), hot_base, warm_base }
    }

    /// No-op lifecycle hook kept for interface parity with the conceptual "tables" API;
    /// `DashMap` needs no explicit table creation.
    pub fn ensure_tables(&self) {}

    fn limits_for(&self, attribute_type: AttributeType, load: LoadLevel) -> TierLimits {
        let base = if attribute_type.is_realtime_only() {
            base_limits_for(attribute_type)
        } else {
            TierLimits { hot_limit: self.hot_base, warm_limit: self.warm_base }
        };
        scaled_limits(base, load)
    }

    pub fn current_limits(&self, attribute_type: AttributeType, load: LoadLevel) -> TierLimits {
        self.limits_for(attribute_type, load)
    }

    /// Writes one measurement, inferring its type if this is the first write for the key.
    /// Amortized: the hot ring is allowed to grow to `2 * hot_limit` before being trimmed
    /// back down in one pass (prepend-and-trim-at-2x), so a steady stream of
    /// writes pays the trim cost only every `hot_limit` insertions.
    pub fn put_attribute(&self, measurement: Measurement, load: LoadLevel) {
        let key = (measurement.sensor_id.clone(), measurement.attribute_id.clone());
        let attribute_type = AttributeType::infer(&measurement.attribute_id, &measurement.payload);

        let mut entry = self.entries.entry(key).or_insert_with(|| TierEntry::new(attribute_type));
        let limits = self.limits_for(entry.attribute_type, load);

        entry.hot.push_front(measurement);
        entry.hot_count += 1;
        entry.updated_at = Instant::now();

        if entry.hot.len() > limits.hot_limit * 2 {
            while entry.hot.len() > limits.hot_limit {
                if let Some(spilled) = entry.hot.pop_back() {
                    if limits.warm_limit > 0 {
                        entry.warm.push_front(spilled);
                    }
                }
            }
            if entry.warm.len() > limits.warm_limit {
                entry.warm.truncate(limits.warm_limit);
            }
        }
    }

    /// Most recent `n` measurements across hot then warm, newest first.
    pub fn get_attributes(&self, sensor_id: &str, attribute_id: &str, n: usize) -> Vec<Measurement> {
        let Some(entry) = self.entries.get(&(sensor_id.to_string(), attribute_id.to_string())) else {
            return Vec::new();
        };
        entry.hot.iter().chain(entry.warm.iter()).take(n).cloned().collect()
    }

    /// Ranged read: merges hot and warm, orders ascending by `timestamp_ms`, filters to
    /// `[from_ms, to_ms]` (either bound may be open), then keeps the last `limit` entries
    /// of what remains — the most recent samples in the requested window, oldest first.
    pub fn get_attribute(&self, sensor_id: &str, attribute_id: &str, from_ms: Option<i64>, to_ms: Option<i64>, limit: usize) -> Vec<Measurement> {
        let Some(entry) = self.entries.get(&(sensor_id.to_string(), attribute_id.to_string())) else {
            return Vec::new();
        };
        // hot and warm are both newest-first (`push_front`); reverse the concatenation to
        // get ascending order before filtering.
        let mut ascending: Vec<Measurement> = entry.hot.iter().chain(entry.warm.iter()).cloned().collect();
        ascending.reverse();
        ascending.retain(|m| from_ms.map_or(true, |from| m.timestamp_ms >= from) && to_ms.map_or(true, |to| m.timestamp_ms <= to));
        if ascending.len() > limit {
            ascending.drain(..ascending.len() - limit);
        }
        ascending
    }

    /// Same ranged read as `get_attribute`, without a time filter — the last `limit`
    /// samples regardless of when they landed.
    pub fn get_attribute_extended(&self, sensor_id: &str, attribute_id: &str, limit: usize) -> Vec<Measurement> {
        self.get_attribute(sensor_id, attribute_id, None, None, limit)
    }

    pub fn remove_attribute(&self, sensor_id: &str, attribute_id: &str) {
        self.entries.remove(&(sensor_id.to_string(), attribute_id.to_string()));
    }

    /// Drops every key belonging to a sensor; called on sensor teardown.
    pub fn cleanup(&self, sensor_id: &str) {
        self.entries.retain(|(s, _), _| s != sensor_id);
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn m(sensor: &str, attr: &str, ts: i64, v: f64) -> Measurement {
        Measurement::new(sensor, attr, ts, Value::Number(v))
    }

    #[test]
    fn hot_tier_trims_at_2x_and_spills_to_warm() {
        let store = AttributeStore::new(10, 100);
        for i in 0..25 {
            store.put_attribute(m("s1", "numeric", i, i as f64), LoadLevel::Normal);
        }
        // Some of these already crossed the 2x(=20) trim point and spilled into warm,
        // but nothing is lost: hot+warm together still hold everything written.
        assert_eq!(store.get_attributes("s1", "numeric", 100).len(), 25);

        for i in 25..45 {
            store.put_attribute(m("s1", "numeric", i, i as f64), LoadLevel::Normal);
        }
        let all = store.get_attributes("s1", "numeric", 1000);
        assert_eq!(all.len(), 45);
        assert_eq!(all[0].timestamp_ms, 44); // newest first
    }

    #[test]
    fn realtime_only_types_retain_a_single_sample() {
        let store = AttributeStore::new(1000, 60_000);
        for i in 0..5 {
            store.put_attribute(
                Measurement::new("s1", "skeleton_frame", i, Value::Text("joint-data".into())),
                LoadLevel::Normal,
            );
        }
        let all = store.get_attributes("s1", "skeleton_frame", 100);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].timestamp_ms, 4);
    }

    #[test]
    fn load_scales_limits_with_a_floor() {
        let store = AttributeStore::new(1000, 60_000);
        let normal = store.current_limits(AttributeType::Numeric, LoadLevel::Normal);
        let critical = store.current_limits(AttributeType::Numeric, LoadLevel::Critical);
        assert_eq!(normal.hot_limit, 1000);
        assert!(critical.hot_limit < normal.hot_limit);
        assert!(critical.hot_limit >= MIN_HOT_LIMIT);
        assert!(critical.warm_limit >= MIN_WARM_LIMIT);
    }

    #[test]
    fn missing_key_reads_as_empty() {
        let store = AttributeStore::new(1000, 60_000);
        assert!(store.get_attributes("ghost", "x", 10).is_empty());
        assert!(store.get_attribute("ghost", "x", None, None, 10).is_empty());
        assert!(store.get_attribute_extended("ghost", "x", 10).is_empty());
    }

    #[test]
    fn cleanup_drops_only_the_named_sensor() {
        let store = AttributeStore::new(1000, 60_000);
        store.put_attribute(m("s1", "numeric", 0, 1.0), LoadLevel::Normal);
        store.put_attribute(m("s2", "numeric", 0, 1.0), LoadLevel::Normal);
        store.cleanup("s1");
        assert!(store.get_attribute("s1", "numeric", None, None, 10).is_empty());
        assert!(!store.get_attribute("s2", "numeric", None, None, 10).is_empty());
    }

    #[test]
    fn ranged_read_is_ascending_and_time_filtered() {
        let store = AttributeStore::new(1000, 60_000);
        store.put_attribute(m("s1", "hr", 1000, 72.0), LoadLevel::Normal);
        store.put_attribute(m("s1", "hr", 2000, 74.0), LoadLevel::Normal);
        store.put_attribute(m("s1", "hr", 3000, 76.0), LoadLevel::Normal);

        let all = store.get_attribute("s1", "hr", Some(0), None, 10);
        let timestamps: Vec<i64> = all.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(timestamps, vec![1000, 2000, 3000]);

        let bounded = store.get_attribute("s1", "hr", Some(1000), Some(2000), 10);
        let bounded_ts: Vec<i64> = bounded.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(bounded_ts, vec![1000, 2000]);

        let capped = store.get_attribute("s1", "hr", Some(0), None, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].timestamp_ms, 3000);
    }
}
