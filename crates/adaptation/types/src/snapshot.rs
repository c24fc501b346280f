//! Metric snapshots delivered by the external collector each tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AdaptationError, AdaptationResult};

/// Identifies a monitored component. Each component owns one loop instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reject blank identifiers.
    pub fn validate(&self) -> AdaptationResult<()> {
        if self.0.trim().is_empty() {
            return Err(AdaptationError::validation("component_id is missing"));
        }
        Ok(())
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which direction of change counts as an improvement for a metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricPolarity {
    #[default]
    #[serde(rename = "higher_better")]
    HigherIsBetter,
    #[serde(rename = "lower_better")]
    LowerIsBetter,
}

impl MetricPolarity {
    /// Orient a raw relative change so that positive always means better.
    pub fn orient(self, relative: f64) -> f64 {
        match self {
            MetricPolarity::HigherIsBetter => relative,
            MetricPolarity::LowerIsBetter => -relative,
        }
    }
}

/// Metric name → polarity. Metrics not listed are higher-is-better.
pub type PolarityMap = BTreeMap<String, MetricPolarity>;

/// One tick of measurements for a component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub component_id: ComponentId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
    /// Raw sample sets backing each scalar, when the collector keeps them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sample_sets: BTreeMap<String, Vec<f64>>,
}

impl MetricSnapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new<K, I>(component_id: impl Into<ComponentId>, metrics: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Self {
            component_id: component_id.into(),
            timestamp: Utc::now(),
            metrics: metrics.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            sample_sets: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach the raw samples behind one metric.
    pub fn with_samples(mut self, metric: impl Into<String>, samples: Vec<f64>) -> Self {
        self.sample_sets.insert(metric.into(), samples);
        self
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied()
    }

    pub fn samples(&self, metric: &str) -> Option<&[f64]> {
        self.sample_sets.get(metric).map(Vec::as_slice)
    }

    /// Boundary check: identifier present, every value finite.
    pub fn validate(&self) -> AdaptationResult<()> {
        self.component_id.validate()?;
        for (name, value) in &self.metrics {
            if name.trim().is_empty() {
                return Err(AdaptationError::validation("metric with empty name"));
            }
            if !value.is_finite() {
                return Err(AdaptationError::validation(format!(
                    "metric `{}` of component `{}` is not finite ({})",
                    name, self.component_id, value
                )));
            }
        }
        for (name, samples) in &self.sample_sets {
            if let Some(bad) = samples.iter().find(|v| !v.is_finite()) {
                return Err(AdaptationError::validation(format!(
                    "sample set `{}` of component `{}` contains non-finite value {}",
                    name, self.component_id, bad
                )));
            }
        }
        Ok(())
    }
}
