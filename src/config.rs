//! Recognized configuration keys. The crate takes a plain in-memory `Config`;
//! loading one from YAML or any other file format is the embedder's job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub attribute_store_hot_limit: usize,
    pub attribute_store_warm_limit: usize,
    pub attention_battery_cap_low: AttentionCap,
    pub attention_battery_cap_critical: AttentionCap,
    pub replicator_pool_size: usize,
    pub sensor_hibernate_after_ms: u64,
    pub sensor_idle_check_interval_ms: u64,
    pub load_sample_interval_ms: u64,
    pub priority_attributes: HashSet<String>,
}

/// The attention-level ceiling a battery-capped user's contribution is clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionCap {
    Medium,
    Low,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attribute_store_hot_limit: 1000,
            attribute_store_warm_limit: 60_000,
            attention_battery_cap_low: AttentionCap::Medium,
            attention_battery_cap_critical: AttentionCap::Low,
            replicator_pool_size: 8,
            sensor_hibernate_after_ms: 5 * 60 * 1000,
            sensor_idle_check_interval_ms: 60 * 1000,
            load_sample_interval_ms: 1000,
            priority_attributes: ["button", "buttons"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.attribute_store_hot_limit, Config::default().attribute_store_hot_limit);
        assert_eq!(back.priority_attributes, Config::default().priority_attributes);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        // `#[serde(default)]` lets an embedder's partial JSON config only override what it cares about.
        let partial: Config = serde_json::from_str(r#"{"replicator_pool_size": 4}"#).unwrap();
        assert_eq!(partial.replicator_pool_size, 4);
        assert_eq!(partial.attribute_store_hot_limit, Config::default().attribute_store_hot_limit);
    }
}
