//! pulsemesh: an adaptive telemetry fan-in/fan-out engine.
//!
//! Many concurrent "sensors" each produce one or more named "attributes" (time-series
//! streams). Three subsystems implement adaptive backpressure over that traffic:
//!
//! - [`attention`] tracks live viewer interest per `(sensor, attribute)` and derives a
//!   batch-window configuration from it.
//! - [`store`] is a tiered hot/warm ring per `(sensor, attribute)` with retention that
//!   shrinks under system load.
//! - [`worker`] runs one task per live sensor and one per live attribute, batching and
//!   throttling delivery by attention × load × priority.
//!
//! Everything else — [`pubsub`], [`load`], [`supervisor`], [`replicator`] — is the
//! plumbing that binds those three together: a topic-addressed broadcast bus, a system
//! load monitor, a sensor directory with one-for-one restart semantics, and a pool of
//! downstream replication workers.
//!
//! Time sources are never mixed: `std::time::Instant` (monotonic) drives timers, delays,
//! and staleness checks; a caller-supplied `timestamp_ms: i64` (wall-clock epoch millis)
//! is carried on every [`types::Measurement`] and never compared against an `Instant`.

pub mod attention;
pub mod biomimetic;
pub mod config;
pub mod error;
pub mod load;
pub mod pubsub;
pub mod replicator;
pub mod simulator;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use attention::AttentionTracker;
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use pubsub::Bus;
pub use replicator::ReplicatorPool;
pub use store::AttributeStore;
pub use supervisor::SensorDirectory;
