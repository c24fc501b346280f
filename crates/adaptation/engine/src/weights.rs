//! Outcome-driven weight learning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use maple_adaptation_types::{
    AdaptationError, AdaptationOutcome, AdaptationResult, AdaptiveWeights,
};

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_WEIGHT_FLOOR: f64 = 0.01;

/// Gradient sign applied on success.
pub const SUCCESS_FACTOR: f64 = 1.0;
/// Gradient sign applied on failure.
pub const FAILURE_FACTOR: f64 = -0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub learning_rate: f64,
    /// Minimum weight any dimension may hold.
    pub floor: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            floor: DEFAULT_WEIGHT_FLOOR,
        }
    }
}

impl WeightConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(AdaptationError::validation(
                "weight learning_rate must be finite and non-negative",
            ));
        }
        if !self.floor.is_finite() || !(0.0..1.0).contains(&self.floor) {
            return Err(AdaptationError::validation("weight floor must be within [0, 1)"));
        }
        Ok(())
    }

    /// Reject weight vectors too wide for the floor (`n · floor > 1`).
    pub fn check_dimensions(&self, dimensions: usize) -> AdaptationResult<()> {
        if dimensions as f64 * self.floor > 1.0 + f64::EPSILON {
            return Err(AdaptationError::validation(format!(
                "{} dimensions cannot each hold the weight floor {}",
                dimensions, self.floor
            )));
        }
        Ok(())
    }
}

/// Gradient-style learner keeping weights on the simplex.
#[derive(Clone, Debug, Default)]
pub struct WeightLearner {
    config: WeightConfig,
}

impl WeightLearner {
    pub fn new(config: WeightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    /// Nudge each weight by `learning_rate · factor · delta_i`, then project
    /// back onto the floored simplex.
    ///
    /// Dimensions absent from `components` receive no gradient.
    pub fn update(
        &self,
        weights: &AdaptiveWeights,
        outcome: &AdaptationOutcome,
        components: &BTreeMap<String, f64>,
    ) -> AdaptiveWeights {
        let factor = if outcome.success {
            SUCCESS_FACTOR
        } else {
            FAILURE_FACTOR
        };
        let raw: BTreeMap<String, f64> = weights
            .iter()
            .map(|(dim, w)| {
                let delta = components
                    .get(dim)
                    .copied()
                    .filter(|d| d.is_finite())
                    .unwrap_or(0.0);
                let gradient = factor * delta;
                (dim.to_string(), (w + self.config.learning_rate * gradient).max(self.config.floor))
            })
            .collect();
        let updated = AdaptiveWeights::projected(raw, self.config.floor);
        trace!(
            cycle = %outcome.cycle_id,
            success = outcome.success,
            weights = ?updated.as_map(),
            "weights updated"
        );
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_adaptation_types::ComponentId;
    use std::time::Duration;
    use uuid::Uuid;

    fn outcome(success: bool) -> AdaptationOutcome {
        if success {
            AdaptationOutcome::success(
                Uuid::new_v4(),
                ComponentId::new("search"),
                "s",
                BTreeMap::new(),
                Duration::from_millis(1),
            )
        } else {
            AdaptationOutcome::failure(
                Uuid::new_v4(),
                ComponentId::new("search"),
                "s",
                "boom",
                Duration::from_millis(1),
            )
        }
    }

    fn components(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn success_moves_weight_toward_improving_dimension() {
        let learner = WeightLearner::default();
        let w = AdaptiveWeights::uniform(["a", "b"]);
        let updated = learner.update(&w, &outcome(true), &components(&[("a", 0.5), ("b", -0.5)]));
        assert!(updated.get("a").unwrap() > 0.5);
        assert!(updated.get("b").unwrap() < 0.5);
        assert!(updated.is_on_simplex(DEFAULT_WEIGHT_FLOOR));
    }

    #[test]
    fn failure_moves_weight_away_at_half_strength() {
        let learner = WeightLearner::new(WeightConfig {
            learning_rate: 0.1,
            floor: 0.01,
        });
        let w = AdaptiveWeights::uniform(["a", "b"]);
        let up = learner.update(&w, &outcome(true), &components(&[("a", 1.0)]));
        let down = learner.update(&w, &outcome(false), &components(&[("a", 1.0)]));
        assert!(down.get("a").unwrap() < 0.5);
        let gain = up.get("a").unwrap() - 0.5;
        let loss = 0.5 - down.get("a").unwrap();
        assert!(loss < gain);
    }

    #[test]
    fn one_sided_outcomes_never_breach_floor() {
        let learner = WeightLearner::new(WeightConfig {
            learning_rate: 0.5,
            floor: 0.05,
        });
        let mut w = AdaptiveWeights::uniform(["a", "b", "c"]);
        let grad = components(&[("a", 1.0), ("b", -1.0), ("c", -1.0)]);
        for _ in 0..500 {
            w = learner.update(&w, &outcome(true), &grad);
        }
        assert!(w.is_on_simplex(0.05));
        assert!((w.get("b").unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn missing_components_get_no_gradient() {
        let learner = WeightLearner::default();
        let w = AdaptiveWeights::uniform(["a", "b"]);
        let updated = learner.update(&w, &outcome(true), &BTreeMap::new());
        assert!((updated.get("a").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn config_validation() {
        assert!(WeightConfig::default().validate().is_ok());
        assert!(WeightConfig { learning_rate: -1.0, floor: 0.01 }.validate().is_err());
        assert!(WeightConfig { learning_rate: 0.1, floor: 1.0 }.validate().is_err());
        assert!(WeightConfig::default().check_dimensions(100).is_ok());
        assert!(WeightConfig { learning_rate: 0.1, floor: 0.2 }.check_dimensions(6).is_err());
    }
}
