//! Delta results: normalized change between two snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::{ComponentId, MetricPolarity};

/// How the confidence of a delta was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMethod {
    /// Two-sample test over raw sample sets.
    StatisticalTest,
    /// Mean of per-metric normalized magnitudes (scalar-only snapshots).
    Magnitude,
}

/// Change of one metric between baseline and current snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub baseline: f64,
    pub current: f64,
    /// `current - baseline`.
    pub absolute: f64,
    /// Relative change clamped to `[-1, 1]`, before polarity.
    pub relative: f64,
    /// Relative change oriented so that positive means better.
    pub oriented: f64,
    pub polarity: MetricPolarity,
    pub improvement: bool,
    /// Two-sided p-value when sample sets were tested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Cohen's d over the pooled standard deviation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_size: Option<f64>,
}

/// Per-metric and aggregate delta for one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaResult {
    pub component_id: ComponentId,
    pub computed_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricDelta>,
    /// Weighted sum of oriented deltas over configured dimensions.
    pub aggregate: f64,
    pub confidence: f64,
    pub significant: bool,
    pub method: ConfidenceMethod,
    /// Overall p-value (Bonferroni-corrected minimum) when tested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Weighted dimensions absent from one of the snapshots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl DeltaResult {
    /// Oriented per-metric deltas, the gradient input of weight learning.
    pub fn components(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|(name, m)| (name.clone(), m.oriented))
            .collect()
    }

    pub fn improving_metrics(&self) -> impl Iterator<Item = &str> {
        self.metrics
            .iter()
            .filter(|(_, m)| m.improvement)
            .map(|(name, _)| name.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricDelta> {
        self.metrics.get(name)
    }
}
