//! Delta calculation between a current and a baseline snapshot.
//!
//! Per metric the relative change is normalized to `[-1, 1]` and oriented by
//! polarity; the aggregate is the weighted sum over configured dimensions.
//! Confidence comes from a pooled two-sample t-test when both snapshots carry
//! raw samples, otherwise from the mean normalized magnitude.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use maple_adaptation_types::{
    AdaptationError, AdaptationResult, AdaptiveWeights, ConfidenceMethod, DeltaResult,
    MetricDelta, MetricSnapshot, PolarityMap,
};

use crate::stats::{self, TwoSampleTest};

/// Guard against division by zero and vanishing spread.
pub const DELTA_EPSILON: f64 = 1e-8;

/// p-value below which a tested delta is significant.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Magnitude confidence at which an untested delta counts as significant.
pub const DEFAULT_MAGNITUDE_SIGNIFICANCE: f64 = 0.05;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    pub epsilon: f64,
    pub significance_level: f64,
    pub magnitude_significance: f64,
    /// Bonferroni-correct the smallest p-value when several metrics are tested.
    pub bonferroni: bool,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            epsilon: DELTA_EPSILON,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            magnitude_significance: DEFAULT_MAGNITUDE_SIGNIFICANCE,
            bonferroni: false,
        }
    }
}

impl DeltaConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(AdaptationError::validation("delta epsilon must be positive"));
        }
        for (name, v) in [
            ("significance_level", self.significance_level),
            ("magnitude_significance", self.magnitude_significance),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(AdaptationError::validation(format!(
                    "delta {} must be within [0, 1], got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct DeltaCalculator {
    config: DeltaConfig,
}

impl DeltaCalculator {
    pub fn new(config: DeltaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    /// Compare `current` against `baseline`.
    ///
    /// Rejects non-finite input and mismatched components; otherwise total.
    pub fn calculate(
        &self,
        current: &MetricSnapshot,
        baseline: &MetricSnapshot,
        polarity: &PolarityMap,
        weights: &AdaptiveWeights,
    ) -> AdaptationResult<DeltaResult> {
        current.validate()?;
        baseline.validate()?;
        if current.component_id != baseline.component_id {
            return Err(AdaptationError::validation(format!(
                "cannot compare snapshots of `{}` and `{}`",
                current.component_id, baseline.component_id
            )));
        }

        let mut metrics = BTreeMap::new();
        let mut tests: Vec<TwoSampleTest> = Vec::new();

        for (name, &cur) in &current.metrics {
            let Some(base) = baseline.value(name) else {
                continue;
            };
            let relative = self.relative_change(cur, base);
            let pol = polarity.get(name).copied().unwrap_or_default();
            let oriented = pol.orient(relative);

            let test = match (baseline.samples(name), current.samples(name)) {
                (Some(b), Some(c)) => stats::pooled_t_test(b, c, self.config.epsilon),
                _ => None,
            };
            if let Some(t) = test {
                tests.push(t);
            }

            metrics.insert(
                name.clone(),
                MetricDelta {
                    baseline: base,
                    current: cur,
                    absolute: cur - base,
                    relative,
                    oriented,
                    polarity: pol,
                    improvement: oriented > 0.0,
                    p_value: test.map(|t| t.p_value),
                    effect_size: test.map(|t| t.effect_size),
                },
            );
        }

        let mut aggregate = 0.0;
        let mut excluded = Vec::new();
        for (dim, w) in weights.iter() {
            match metrics.get(dim) {
                Some(m) => aggregate += w * m.oriented,
                None => excluded.push(dim.to_string()),
            }
        }
        if !excluded.is_empty() {
            debug!(
                component = %current.component_id,
                missing = ?excluded,
                "weighted dimensions missing from snapshot pair; excluded from aggregate"
            );
        }

        let (confidence, significant, method, p_value) = if tests.is_empty() {
            let magnitudes: Vec<f64> = metrics.values().map(|m| m.relative.abs()).collect();
            let confidence = stats::mean(&magnitudes).clamp(0.0, 1.0);
            (
                confidence,
                confidence >= self.config.magnitude_significance && !magnitudes.is_empty(),
                ConfidenceMethod::Magnitude,
                None,
            )
        } else {
            let confidence = stats::mean(
                &tests.iter().map(|t| 1.0 - t.p_value).collect::<Vec<_>>(),
            )
            .clamp(0.0, 1.0);
            let min_p = tests.iter().map(|t| t.p_value).fold(1.0, f64::min);
            let p = if self.config.bonferroni {
                (min_p * tests.len() as f64).min(1.0)
            } else {
                min_p
            };
            (
                confidence,
                p < self.config.significance_level,
                ConfidenceMethod::StatisticalTest,
                Some(p),
            )
        };

        Ok(DeltaResult {
            component_id: current.component_id.clone(),
            computed_at: Utc::now(),
            metrics,
            aggregate: aggregate.clamp(-1.0, 1.0),
            confidence,
            significant,
            method,
            p_value,
            excluded,
        })
    }

    /// Relative change clamped to `[-1, 1]`.
    pub fn relative_change(&self, current: f64, baseline: f64) -> f64 {
        let raw = if baseline != 0.0 {
            (current - baseline) / baseline.abs().max(self.config.epsilon)
        } else if current > 0.0 {
            1.0
        } else {
            0.0
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(-1.0, 1.0)
        }
    }
}
