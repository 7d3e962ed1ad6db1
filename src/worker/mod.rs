//! Per-stream worker tasks: one attribute worker per
//! `(sensor_id, attribute_id)`, owned by one sensor worker per `sensor_id`.

pub mod attribute;
pub mod sensor;

pub use attribute::AttributeWorkerHandle;
pub use sensor::{SensorMeta, SensorStateSnapshot, SensorWorkerHandle};
