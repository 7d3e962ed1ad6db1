//! Shared value types: measurements, attribute typing, attention levels, battery state.
//!
//! Ids are always `String`. Attribute ids are producer-defined and unbounded in number;
//! interning them as symbols would risk unbounded memory growth, so plain strings are used
//! as map keys throughout instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type SensorId = String;
pub type AttributeId = String;
pub type UserId = String;

/// A self-describing measurement payload. Mirrors the "number, string, or nested mapping"
/// shape from the data model without tying the crate to any particular wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Map(BTreeMap<String, Value>),
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// A single measurement for `(sensor_id, attribute_id)`.
///
/// `timestamp_ms` is a wall-clock epoch millisecond value, always caller-supplied — never
/// derived from a monotonic clock (see the crate-level docs on time sources).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sensor_id: SensorId,
    pub attribute_id: AttributeId,
    pub timestamp_ms: i64,
    pub payload: Value,
}

impl Measurement {
    pub fn new(sensor_id: impl Into<SensorId>, attribute_id: impl Into<AttributeId>, timestamp_ms: i64, payload: Value) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            attribute_id: attribute_id.into(),
            timestamp_ms,
            payload,
        }
    }
}

/// Attribute type, inferred from the attribute id (or payload shape), used only to select
/// retention limits and broadcast policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Battery,
    Geolocation,
    Skeleton,
    Pose,
    VideoFrame,
    DepthMap,
    Numeric,
    Generic,
}

impl AttributeType {
    /// "Realtime-only" types that the store retains only the newest sample of.
    pub fn is_realtime_only(self) -> bool {
        matches!(self, AttributeType::Skeleton | AttributeType::Pose | AttributeType::VideoFrame | AttributeType::DepthMap)
    }

    /// Infer a type from an attribute id and, failing that, the payload shape.
    pub fn infer(attribute_id: &str, payload: &Value) -> Self {
        let lower = attribute_id.to_ascii_lowercase();
        if lower.contains("battery") {
            return AttributeType::Battery;
        }
        if lower.contains("geo") || lower.contains("location") || lower.contains("gps") {
            return AttributeType::Geolocation;
        }
        if lower.contains("skeleton") {
            return AttributeType::Skeleton;
        }
        if lower.contains("pose") {
            return AttributeType::Pose;
        }
        if lower.contains("video") || lower.contains("frame") {
            return AttributeType::VideoFrame;
        }
        if lower.contains("depth") {
            return AttributeType::DepthMap;
        }
        match payload {
            Value::Number(_) => AttributeType::Numeric,
            _ => AttributeType::Generic,
        }
    }
}

/// Ordinal attention level: `None < Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttentionLevel {
    None,
    Low,
    Medium,
    High,
}

impl Default for AttentionLevel {
    fn default() -> Self {
        AttentionLevel::None
    }
}

impl AttentionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AttentionLevel::None => "none",
            AttentionLevel::Low => "low",
            AttentionLevel::Medium => "medium",
            AttentionLevel::High => "high",
        }
    }
}

/// Coarse system load level, published by the load monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadLevel {
    Normal,
    Elevated,
    High,
    Critical,
}

impl Default for LoadLevel {
    fn default() -> Self {
        LoadLevel::Normal
    }
}

impl LoadLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadLevel::Normal => "normal",
            LoadLevel::Elevated => "elevated",
            LoadLevel::High => "high",
            LoadLevel::Critical => "critical",
        }
    }

    /// Default delay multiplier for this load level.
    pub fn multiplier(self) -> f64 {
        match self {
            LoadLevel::Normal => 1.0,
            LoadLevel::Elevated => 1.5,
            LoadLevel::High => 3.0,
            LoadLevel::Critical => 5.0,
        }
    }

    /// Store hot/warm capacity multipliers for this load level.
    pub fn store_multipliers(self) -> (f64, f64) {
        match self {
            LoadLevel::Normal => (1.0, 1.0),
            LoadLevel::Elevated => (0.8, 0.5),
            LoadLevel::High => (0.4, 0.2),
            LoadLevel::Critical => (0.2, 0.05),
        }
    }
}

/// A user's reported battery state; caps that user's contribution to attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatteryState {
    Normal,
    Low,
    Critical,
}

/// Recognized (but not required) keys for `report_battery_state`'s metadata map. Unknown
/// keys are accepted and ignored rather than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatteryMetadata {
    pub source: Option<String>,
    pub level: Option<f64>,
    pub charging: Option<bool>,
    pub power_source: Option<String>,
    pub reason: Option<String>,
    pub reported_at: Option<i64>,
}
