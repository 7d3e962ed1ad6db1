//! Error taxonomy: `NotFound`, `Unavailable`, `Rejected`, `Transient`.
//!
//! Most read paths in this crate return empty results rather than an error — see the
//! per-module docs. `CoreError` exists for the handful of operations (`add_sensor`,
//! `remove_sensor`, and friends) that need to surface a typed failure.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("sensor {sensor_id:?} / attribute {attribute_id:?} not found")]
    NotFound {
        sensor_id: String,
        attribute_id: Option<String>,
    },

    #[error("{what} unavailable")]
    Unavailable { what: String },

    #[error("rejected: {reason}")]
    Rejected { reason: String },

    #[error("transient failure in {source}")]
    Transient { source: String },
}

impl CoreError {
    pub fn not_found(sensor_id: impl Into<String>, attribute_id: Option<String>) -> Self {
        CoreError::NotFound {
            sensor_id: sensor_id.into(),
            attribute_id,
        }
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        CoreError::Unavailable { what: what.into() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        CoreError::Rejected { reason: reason.into() }
    }

    pub fn transient(source: impl Into<String>) -> Self {
        CoreError::Transient { source: source.into() }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
