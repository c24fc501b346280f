//! Context-sensitive threshold adaptation.
//!
//! Five multiplicative modifiers scale every tier by the same factor, so the
//! base ordering is preserved before flooring. Flooring may collapse tiers
//! at the bottom; those are lifted to keep the set strictly increasing.

use serde::{Deserialize, Serialize};

use maple_adaptation_types::{Context, ThresholdSet};

pub const THRESHOLD_FLOOR: f64 = 0.001;

/// Number of recent deltas consulted by the learning modifier.
pub const LEARNING_WINDOW: usize = 10;
/// Below this many deltas the learning modifier stays neutral.
pub const LEARNING_MIN_SAMPLES: usize = 5;

const HIGH_PERFORMANCE_MEAN: f64 = 0.1;
const LOW_PERFORMANCE_MEAN: f64 = 0.02;

/// Factors applied to the base tiers for one evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdModifiers {
    pub risk: f64,
    pub resource: f64,
    pub time: f64,
    pub strategic: f64,
    pub learning: f64,
}

impl ThresholdModifiers {
    pub fn product(&self) -> f64 {
        self.risk * self.resource * self.time * self.strategic * self.learning
    }
}

/// Adjusted thresholds plus the modifiers that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdjustedThresholds {
    pub thresholds: ThresholdSet,
    pub modifiers: ThresholdModifiers,
}

/// Stateless; every method is a pure function of its arguments.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThresholdManager;

impl ThresholdManager {
    /// Adjust `base` for `context` and the component's recent deltas
    /// (oldest first).
    pub fn compute(base: &ThresholdSet, context: &Context, history: &[f64]) -> ThresholdSet {
        Self::compute_with_modifiers(base, context, history).thresholds
    }

    pub fn compute_with_modifiers(
        base: &ThresholdSet,
        context: &Context,
        history: &[f64],
    ) -> AdjustedThresholds {
        let modifiers = Self::modifiers(context, history);
        let factor = modifiers.product();

        let mut tiers = base.tiers().map(|t| (t * factor).max(THRESHOLD_FLOOR));
        for i in 1..tiers.len() {
            if tiers[i] <= tiers[i - 1] {
                tiers[i] = tiers[i - 1] + THRESHOLD_FLOOR;
            }
        }

        AdjustedThresholds {
            thresholds: ThresholdSet::from_tiers(tiers),
            modifiers,
        }
    }

    pub fn modifiers(context: &Context, history: &[f64]) -> ThresholdModifiers {
        ThresholdModifiers {
            risk: 1.0 + context.risk_level * 0.5,
            resource: 1.0 + (1.0 - context.resource_availability) * 0.3,
            time: 1.0 - context.time_pressure * 0.2,
            strategic: 1.0 - context.strategic_importance * 0.3,
            learning: Self::learning_modifier(history),
        }
    }

    /// Loosen after sustained strong deltas, tighten after weak ones.
    pub fn learning_modifier(history: &[f64]) -> f64 {
        let start = history.len().saturating_sub(LEARNING_WINDOW);
        let recent = &history[start..];
        if recent.len() < LEARNING_MIN_SAMPLES {
            return 1.0;
        }
        let avg = recent.iter().sum::<f64>() / recent.len() as f64;
        if avg > HIGH_PERFORMANCE_MEAN {
            0.8
        } else if avg < LOW_PERFORMANCE_MEAN {
            1.2
        } else {
            1.0
        }
    }
}
