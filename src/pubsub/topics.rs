//! Topic-name builders. Kept as plain functions rather than an enum so callers can match
//! on the literal topic strings directly without going through this crate's types.

use crate::types::AttentionLevel;

pub const DISCOVERY_SENSORS: &str = "discovery:sensors";
pub const SYSTEM_LOAD: &str = "system:load";

pub fn data_topic(sensor_id: &str) -> String {
    format!("data:{sensor_id}")
}

pub fn data_attention_topic(level: AttentionLevel) -> String {
    format!("data:attention:{}", level.as_str())
}

pub fn attention_topic(sensor_id: &str, attribute_id: &str) -> String {
    format!("attention:{sensor_id}:{attribute_id}")
}

pub fn sensor_attention_topic(sensor_id: &str) -> String {
    format!("attention:{sensor_id}")
}

pub fn signal_topic(sensor_id: &str) -> String {
    format!("signal:{sensor_id}")
}
