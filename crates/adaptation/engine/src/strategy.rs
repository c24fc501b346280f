//! Multi-criteria strategy selection and the per-component registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use maple_adaptation_types::{
    AdaptationError, AdaptationResult, Context, Goal, Strategy,
};

pub const DEFAULT_MIN_SCORE: f64 = 0.5;
pub const DEFAULT_CONFIDENCE_LEARNING_RATE: f64 = 0.1;
pub const DEFAULT_COMPLEXITY_RISK_PER_ACTION: f64 = 0.05;
pub const DEFAULT_RESOURCE_RISK_WEIGHT: f64 = 0.2;

const PERFORMANCE_WEIGHT: f64 = 0.3;
const RESOURCE_WEIGHT: f64 = 0.2;
const RISK_WEIGHT: f64 = 0.2;
const CONFIDENCE_WEIGHT: f64 = 0.3;

/// Utility of a resource requirement the context cannot cover.
const INSUFFICIENT_RESOURCE_PENALTY: f64 = -0.5;
const CONFIDENCE_RISK_FACTOR: f64 = 0.3;
/// Performance utility when the goal names no targets.
const NEUTRAL_PERFORMANCE: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub min_score: f64,
    pub confidence_learning_rate: f64,
    pub complexity_risk_per_action: f64,
    pub resource_risk_weight: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_MIN_SCORE,
            confidence_learning_rate: DEFAULT_CONFIDENCE_LEARNING_RATE,
            complexity_risk_per_action: DEFAULT_COMPLEXITY_RISK_PER_ACTION,
            resource_risk_weight: DEFAULT_RESOURCE_RISK_WEIGHT,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        if !self.min_score.is_finite() {
            return Err(AdaptationError::validation("strategy min_score must be finite"));
        }
        if !self.confidence_learning_rate.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_learning_rate)
        {
            return Err(AdaptationError::validation(
                "strategy confidence_learning_rate must be within [0, 1]",
            ));
        }
        for (name, v) in [
            ("complexity_risk_per_action", self.complexity_risk_per_action),
            ("resource_risk_weight", self.resource_risk_weight),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(AdaptationError::validation(format!(
                    "strategy {} must be finite and non-negative",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UtilityBreakdown {
    pub performance: f64,
    pub resource: f64,
    pub risk: f64,
    pub confidence: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredStrategy {
    pub strategy: Strategy,
    pub utility: f64,
    /// `utility · confidence_score`.
    pub final_score: f64,
    pub breakdown: UtilityBreakdown,
}

#[derive(Clone, Debug, Default)]
pub struct StrategySelector {
    config: StrategyConfig,
}

impl StrategySelector {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Highest-scoring strategy, if it clears `min_score`.
    ///
    /// Equal scores resolve to the lexicographically smallest id.
    pub fn select<'a, I>(&self, strategies: I, goal: &Goal, context: &Context) -> Option<ScoredStrategy>
    where
        I: IntoIterator<Item = &'a Strategy>,
    {
        let mut best: Option<ScoredStrategy> = None;
        for strategy in strategies {
            let scored = self.score(strategy, goal, context);
            let better = match &best {
                None => true,
                Some(b) => {
                    scored.final_score > b.final_score
                        || (scored.final_score == b.final_score && scored.strategy.id < b.strategy.id)
                }
            };
            if better {
                best = Some(scored);
            }
        }

        match best {
            Some(b) if b.final_score >= self.config.min_score => Some(b),
            Some(b) => {
                debug!(
                    strategy = %b.strategy.id,
                    score = b.final_score,
                    min_score = self.config.min_score,
                    "best strategy below minimum score"
                );
                None
            }
            None => None,
        }
    }

    pub fn score(&self, strategy: &Strategy, goal: &Goal, context: &Context) -> ScoredStrategy {
        let breakdown = UtilityBreakdown {
            performance: Self::performance_utility(strategy, goal),
            resource: Self::resource_utility(strategy, context),
            risk: self.risk_utility(strategy, context),
            confidence: strategy.confidence_score,
        };
        let utility = PERFORMANCE_WEIGHT * breakdown.performance
            + RESOURCE_WEIGHT * breakdown.resource
            + RISK_WEIGHT * breakdown.risk
            + CONFIDENCE_WEIGHT * breakdown.confidence;
        ScoredStrategy {
            strategy: strategy.clone(),
            utility,
            final_score: utility * strategy.confidence_score,
            breakdown,
        }
    }

    /// Priority-weighted closeness of expected outcomes to goal targets.
    pub fn performance_utility(strategy: &Strategy, goal: &Goal) -> f64 {
        if goal.is_empty() {
            return NEUTRAL_PERFORMANCE;
        }
        let scores: Vec<(f64, f64)> = goal
            .targets
            .iter()
            .map(|t| {
                let u = strategy
                    .expected_outcomes
                    .get(&t.metric)
                    .map(|expected| (1.0 - (expected - t.target).abs()).max(0.0))
                    .unwrap_or(0.0);
                (u, t.priority)
            })
            .collect();
        let total_priority: f64 = scores.iter().map(|(_, p)| p).sum();
        if total_priority <= f64::EPSILON {
            return scores.iter().map(|(u, _)| u).sum::<f64>() / scores.len() as f64;
        }
        scores.iter().map(|(u, p)| u * p).sum::<f64>() / total_priority
    }

    pub fn resource_utility(strategy: &Strategy, context: &Context) -> f64 {
        if strategy.resource_requirements.is_empty() {
            return 1.0;
        }
        let total: f64 = strategy
            .resource_requirements
            .iter()
            .map(|(name, &required)| {
                let available = context.available(name);
                if required <= available {
                    if available <= f64::EPSILON {
                        1.0
                    } else {
                        1.0 - required / available
                    }
                } else {
                    INSUFFICIENT_RESOURCE_PENALTY
                }
            })
            .sum();
        total / strategy.resource_requirements.len() as f64
    }

    pub fn risk_utility(&self, strategy: &Strategy, context: &Context) -> f64 {
        let complexity = self.config.complexity_risk_per_action * strategy.actions.len() as f64;
        let resource = self.config.resource_risk_weight * Self::resource_pressure(strategy, context);
        let confidence = (1.0 - strategy.confidence_score) * CONFIDENCE_RISK_FACTOR;
        1.0 / (1.0 + strategy.risk.base_risk + complexity + resource + confidence)
    }

    /// Mean share of each available resource the strategy would consume.
    fn resource_pressure(strategy: &Strategy, context: &Context) -> f64 {
        if strategy.resource_requirements.is_empty() {
            return 0.0;
        }
        let total: f64 = strategy
            .resource_requirements
            .iter()
            .map(|(name, &required)| {
                let available = context.available(name);
                if available <= f64::EPSILON {
                    if required > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    (required / available).min(1.0)
                }
            })
            .sum();
        total / strategy.resource_requirements.len() as f64
    }

    /// Move confidence toward 1 on success or 0 on failure.
    pub fn update_confidence(&self, strategy: &mut Strategy, success: bool) {
        let target = if success { 1.0 } else { 0.0 };
        let lr = self.config.confidence_learning_rate;
        strategy.confidence_score =
            (strategy.confidence_score + lr * (target - strategy.confidence_score)).clamp(0.0, 1.0);
        if success {
            strategy.success_count += 1;
        } else {
            strategy.failure_count += 1;
        }
    }
}

/// Strategies known to one component, keyed by id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Strategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a strategy, returning the previous entry.
    pub fn register(&mut self, strategy: Strategy) -> AdaptationResult<Option<Strategy>> {
        strategy.validate()?;
        Ok(self.strategies.insert(strategy.id.clone(), strategy))
    }

    pub fn remove(&mut self, id: &str) -> Option<Strategy> {
        self.strategies.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Strategy> {
        self.strategies.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.values()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Apply an outcome to the strategy's confidence; returns the new score.
    pub fn record_outcome(
        &mut self,
        selector: &StrategySelector,
        id: &str,
        success: bool,
    ) -> AdaptationResult<f64> {
        let strategy = self
            .strategies
            .get_mut(id)
            .ok_or_else(|| AdaptationError::StrategyNotFound(id.to_string()))?;
        selector.update_confidence(strategy, success);
        Ok(strategy.confidence_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal() -> Goal {
        Goal::new()
            .with_target("accuracy", 0.95, 2.0)
            .with_target("search_time_ms", 0.5, 1.0)
    }

    #[test]
    fn performance_utility_is_priority_weighted() {
        let s = Strategy::new("s")
            .with_expected_outcome("accuracy", 0.95)
            .with_expected_outcome("search_time_ms", 3.0);
        // accuracy exact (1.0, priority 2), latency far off (0.0, priority 1).
        let u = StrategySelector::performance_utility(&s, &goal());
        assert!((u - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(StrategySelector::performance_utility(&s, &Goal::new()), 0.5);
        assert_eq!(
            StrategySelector::performance_utility(&Strategy::new("empty"), &goal()),
            0.0
        );
    }

    #[test]
    fn resource_utility_penalizes_shortfall() {
        let ctx = Context::new("c")
            .with_available_resource("cpu", 4.0)
            .with_available_resource("memory", 1.0);
        let s = Strategy::new("s")
            .with_resource_requirement("cpu", 1.0)
            .with_resource_requirement("memory", 2.0);
        let u = StrategySelector::resource_utility(&s, &ctx);
        assert!((u - (0.75 - 0.5) / 2.0).abs() < 1e-12);
        assert_eq!(StrategySelector::resource_utility(&Strategy::new("free"), &ctx), 1.0);
    }

    #[test]
    fn risk_utility_components() {
        let selector = StrategySelector::default();
        let ctx = Context::new("c").with_available_resource("cpu", 2.0);
        let s = Strategy::new("s")
            .with_base_risk(0.2)
            .with_action("a")
            .with_action("b")
            .with_resource_requirement("cpu", 1.0)
            .with_confidence(0.5);
        // 1 / (1 + 0.2 + 0.1 + 0.2·0.5 + 0.5·0.3)
        let expected = 1.0 / (1.0 + 0.2 + 0.1 + 0.1 + 0.15);
        assert!((selector.risk_utility(&s, &ctx) - expected).abs() < 1e-12);
    }

    #[test]
    fn selects_highest_final_score() {
        let selector = StrategySelector::default();
        let ctx = Context::new("c");
        let strong = Strategy::new("strong")
            .with_expected_outcome("accuracy", 0.95)
            .with_expected_outcome("search_time_ms", 0.5)
            .with_confidence(0.9);
        let weak = Strategy::new("weak")
            .with_expected_outcome("accuracy", 0.95)
            .with_confidence(0.6);
        let picked = selector.select([&weak, &strong], &goal(), &ctx).unwrap();
        assert_eq!(picked.strategy.id, "strong");
        assert!((picked.final_score - picked.utility * 0.9).abs() < 1e-12);
    }

    #[test]
    fn below_min_score_yields_none() {
        let selector = StrategySelector::default();
        let s = Strategy::new("timid").with_confidence(0.2);
        assert!(selector.select([&s], &goal(), &Context::new("c")).is_none());
        assert!(selector.select(std::iter::empty::<&Strategy>(), &goal(), &Context::new("c")).is_none());
    }

    #[test]
    fn ties_resolve_by_id() {
        let selector = StrategySelector::default();
        let a = Strategy::new("alpha").with_confidence(0.9);
        let b = Strategy::new("beta").with_confidence(0.9);
        let picked = selector.select([&b, &a], &Goal::new(), &Context::new("c")).unwrap();
        assert_eq!(picked.strategy.id, "alpha");
    }

    #[test]
    fn confidence_learning() {
        let selector = StrategySelector::default();
        let mut registry = StrategyRegistry::new();
        registry.register(Strategy::new("s").with_confidence(0.5)).unwrap();

        let c = registry.record_outcome(&selector, "s", true).unwrap();
        assert!((c - 0.55).abs() < 1e-12);
        let c = registry.record_outcome(&selector, "s", false).unwrap();
        assert!((c - 0.495).abs() < 1e-12);

        let s = registry.get("s").unwrap();
        assert_eq!((s.success_count, s.failure_count), (1, 1));
        assert!(matches!(
            registry.record_outcome(&selector, "missing", true),
            Err(AdaptationError::StrategyNotFound(_))
        ));
    }

    #[test]
    fn registry_validates_and_replaces() {
        let mut registry = StrategyRegistry::new();
        assert!(registry.register(Strategy::new("")).is_err());
        assert!(registry.register(Strategy::new("s")).unwrap().is_none());
        assert!(registry.register(Strategy::new("s").with_confidence(0.7)).unwrap().is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("s").is_some());
        assert!(registry.is_empty());
    }
}
