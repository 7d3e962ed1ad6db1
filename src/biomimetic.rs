//! Pluggable "biomimetic" factor providers referenced by `calculate_batch_window`.
//! None of these are part of the core contract; each returns `1.0` when
//! the embedder hasn't supplied one, so the core stays deterministic without any
//! conditional compilation.

use crate::types::SensorId;

pub trait NoveltyFactor: Send + Sync {
    fn novelty_factor(&self, sensor_id: &SensorId, attribute_id: &str) -> f64;
}

pub trait PredictiveFactor: Send + Sync {
    fn predictive_factor(&self, sensor_id: &SensorId) -> f64;
}

pub trait CompetitiveFactor: Send + Sync {
    fn competitive_factor(&self, sensor_id: &SensorId) -> f64;
}

pub trait CircadianFactor: Send + Sync {
    fn circadian_factor(&self) -> f64;
}

/// A bundle of factor providers; any slot left `None` behaves as `1.0`.
#[derive(Clone, Default)]
pub struct FactorProviders {
    novelty: Option<std::sync::Arc<dyn NoveltyFactor>>,
    predictive: Option<std::sync::Arc<dyn PredictiveFactor>>,
    competitive: Option<std::sync::Arc<dyn CompetitiveFactor>>,
    circadian: Option<std::sync::Arc<dyn CircadianFactor>>,
}

impl FactorProviders {
    pub fn with_novelty(mut self, provider: std::sync::Arc<dyn NoveltyFactor>) -> Self {
        self.novelty = Some(provider);
        self
    }

    pub fn with_predictive(mut self, provider: std::sync::Arc<dyn PredictiveFactor>) -> Self {
        self.predictive = Some(provider);
        self
    }

    pub fn with_competitive(mut self, provider: std::sync::Arc<dyn CompetitiveFactor>) -> Self {
        self.competitive = Some(provider);
        self
    }

    pub fn with_circadian(mut self, provider: std::sync::Arc<dyn CircadianFactor>) -> Self {
        self.circadian = Some(provider);
        self
    }

    pub fn novelty_factor(&self, sensor_id: &SensorId, attribute_id: &str) -> f64 {
        self.novelty.as_ref().map(|p| p.novelty_factor(sensor_id, attribute_id)).unwrap_or(1.0)
    }

    pub fn predictive_factor(&self, sensor_id: &SensorId) -> f64 {
        self.predictive.as_ref().map(|p| p.predictive_factor(sensor_id)).unwrap_or(1.0)
    }

    pub fn competitive_factor(&self, sensor_id: &SensorId) -> f64 {
        self.competitive.as_ref().map(|p| p.competitive_factor(sensor_id)).unwrap_or(1.0)
    }

    pub fn circadian_factor(&self) -> f64 {
        self.circadian.as_ref().map(|p| p.circadian_factor()).unwrap_or(1.0)
    }
}
