//! Candidate strategies and the goals they are scored against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdaptationError, AdaptationResult};

pub const DEFAULT_STRATEGY_CONFIDENCE: f64 = 0.5;

/// Risk factors attached to a strategy.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    /// Intrinsic risk of applying the strategy, `>= 0`.
    #[serde(default)]
    pub base_risk: f64,
    /// Free-form labels for auditing (e.g. "restarts_service").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factors: Vec<String>,
}

/// A named candidate action with learned confidence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Expected value of each metric after applying the strategy.
    #[serde(default)]
    pub expected_outcomes: BTreeMap<String, f64>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    /// Resource name → amount required.
    #[serde(default)]
    pub resource_requirements: BTreeMap<String, f64>,
    /// Steps the executor performs; their count drives complexity risk.
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub risk: RiskProfile,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
}

fn default_confidence() -> f64 {
    DEFAULT_STRATEGY_CONFIDENCE
}

impl Strategy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            expected_outcomes: BTreeMap::new(),
            confidence_score: DEFAULT_STRATEGY_CONFIDENCE,
            resource_requirements: BTreeMap::new(),
            actions: Vec::new(),
            risk: RiskProfile::default(),
            success_count: 0,
            failure_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_expected_outcome(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.expected_outcomes.insert(metric.into(), value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence;
        self
    }

    pub fn with_resource_requirement(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.resource_requirements.insert(resource.into(), amount);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn with_base_risk(mut self, base_risk: f64) -> Self {
        self.risk.base_risk = base_risk;
        self
    }

    pub fn validate(&self) -> AdaptationResult<()> {
        if self.id.trim().is_empty() {
            return Err(AdaptationError::validation("strategy id is empty"));
        }
        if !self.confidence_score.is_finite() || !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(AdaptationError::validation(format!(
                "strategy `{}` confidence must be within [0, 1], got {}",
                self.id, self.confidence_score
            )));
        }
        if !self.risk.base_risk.is_finite() || self.risk.base_risk < 0.0 {
            return Err(AdaptationError::validation(format!(
                "strategy `{}` base risk must be finite and non-negative",
                self.id
            )));
        }
        let amounts = self
            .expected_outcomes
            .iter()
            .chain(self.resource_requirements.iter());
        for (name, value) in amounts {
            if !value.is_finite() {
                return Err(AdaptationError::validation(format!(
                    "strategy `{}` has non-finite value for `{}`",
                    self.id, name
                )));
            }
        }
        if self.resource_requirements.values().any(|v| *v < 0.0) {
            return Err(AdaptationError::validation(format!(
                "strategy `{}` has a negative resource requirement",
                self.id
            )));
        }
        Ok(())
    }

    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        (total > 0).then(|| self.success_count as f64 / total as f64)
    }
}

/// One metric target within a goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalTarget {
    pub metric: String,
    pub target: f64,
    #[serde(default = "default_priority")]
    pub priority: f64,
}

fn default_priority() -> f64 {
    1.0
}

/// What the component should move towards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    #[serde(default)]
    pub targets: Vec<GoalTarget>,
}

impl Goal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, metric: impl Into<String>, target: f64, priority: f64) -> Self {
        self.targets.push(GoalTarget {
            metric: metric.into(),
            target,
            priority,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn validate(&self) -> AdaptationResult<()> {
        for t in &self.targets {
            if !t.target.is_finite() || !t.priority.is_finite() || t.priority < 0.0 {
                return Err(AdaptationError::validation(format!(
                    "goal target `{}` must have a finite target and non-negative priority",
                    t.metric
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_validation() {
        let s = Strategy::new("cache-warmup")
            .with_expected_outcome("accuracy", 0.9)
            .with_resource_requirement("cpu", 0.2)
            .with_action("warm cache")
            .with_confidence(0.8);
        assert!(s.validate().is_ok());
        assert_eq!(s.actions.len(), 1);
        assert!(s.success_rate().is_none());
    }

    #[test]
    fn invalid_strategies_rejected() {
        assert!(Strategy::new("").validate().is_err());
        assert!(Strategy::new("a").with_confidence(1.5).validate().is_err());
        assert!(Strategy::new("a").with_base_risk(-0.1).validate().is_err());
        assert!(Strategy::new("a")
            .with_resource_requirement("cpu", -1.0)
            .validate()
            .is_err());
        assert!(Strategy::new("a")
            .with_expected_outcome("x", f64::INFINITY)
            .validate()
            .is_err());
    }

    #[test]
    fn strategy_deserializes_with_defaults() {
        let s: Strategy = serde_json::from_str(r#"{"id":"noop"}"#).unwrap();
        assert_eq!(s.confidence_score, DEFAULT_STRATEGY_CONFIDENCE);
        assert!(s.expected_outcomes.is_empty());
    }

    #[test]
    fn goal_validation() {
        assert!(Goal::new().with_target("accuracy", 0.95, 1.0).validate().is_ok());
        assert!(Goal::new().with_target("accuracy", 0.95, -1.0).validate().is_err());
        let g: Goal = serde_json::from_str(r#"{"targets":[{"metric":"a","target":1.0}]}"#).unwrap();
        assert_eq!(g.targets[0].priority, 1.0);
    }
}
