//! Per-component state owned by one loop instance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use maple_adaptation_types::{
    AdaptationError, AdaptationResult, AdaptiveWeights, ComponentId, DecisionSummary, Goal,
    MetricPolarity, MetricSnapshot, PolarityMap, Strategy, ThresholdSet,
};

use crate::decision::{DecisionConfig, DecisionHistory};
use crate::delta::DeltaConfig;
use crate::strategy::{StrategyConfig, StrategyRegistry};
use crate::trend::{TrendAnalyzer, TrendConfig};
use crate::weights::WeightConfig;

/// Tuning for every engine component.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub delta: DeltaConfig,
    pub weights: WeightConfig,
    /// Base thresholds for components without overrides.
    pub thresholds: ThresholdSet,
    pub trend: TrendConfig,
    pub decision: DecisionConfig,
    pub strategy: StrategyConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        self.delta.validate()?;
        self.weights.validate()?;
        self.thresholds.validate()?;
        self.trend.validate()?;
        self.decision.validate()?;
        self.strategy.validate()?;
        Ok(())
    }
}

/// A dispatched strategy awaiting its outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAdaptation {
    pub strategy_id: String,
    /// Oriented per-metric deltas of the deciding cycle.
    pub delta_components: BTreeMap<String, f64>,
    pub dispatched_at: DateTime<Utc>,
}

/// Everything learned about one component.
///
/// Created on registration, torn down on deregistration, persisted between.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub component_id: ComponentId,
    pub weights: AdaptiveWeights,
    #[serde(default)]
    pub polarity: PolarityMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_overrides: Option<ThresholdSet>,
    #[serde(default)]
    pub goal: Goal,
    pub trend: TrendAnalyzer,
    pub decisions: DecisionHistory,
    #[serde(default)]
    pub strategies: StrategyRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<MetricSnapshot>,
    #[serde(default)]
    pub pending: BTreeMap<Uuid, PendingAdaptation>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentState {
    pub fn new(
        component_id: impl Into<ComponentId>,
        weights: AdaptiveWeights,
        config: &EngineConfig,
    ) -> AdaptationResult<Self> {
        let component_id = component_id.into();
        component_id.validate()?;
        config.weights.check_dimensions(weights.len())?;
        let floor = config.weights.floor;
        let weights = if weights.is_on_simplex(floor) {
            weights
        } else {
            AdaptiveWeights::projected(weights.as_map().clone(), floor)
        };
        Ok(Self {
            component_id,
            weights,
            polarity: PolarityMap::new(),
            threshold_overrides: None,
            goal: Goal::default(),
            trend: TrendAnalyzer::new(config.trend.clone()),
            decisions: DecisionHistory::new(config.decision.history_capacity),
            strategies: StrategyRegistry::new(),
            baseline: None,
            pending: BTreeMap::new(),
            updated_at: Utc::now(),
        })
    }

    pub fn with_polarity(mut self, metric: impl Into<String>, polarity: MetricPolarity) -> Self {
        self.polarity.insert(metric.into(), polarity);
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> AdaptationResult<Self> {
        goal.validate()?;
        self.goal = goal;
        Ok(self)
    }

    pub fn with_threshold_overrides(mut self, thresholds: ThresholdSet) -> AdaptationResult<Self> {
        thresholds.validate()?;
        self.threshold_overrides = Some(thresholds);
        Ok(self)
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> AdaptationResult<Self> {
        self.strategies.register(strategy)?;
        Ok(self)
    }

    /// Base tiers before context adjustment.
    pub fn base_thresholds(&self, config: &EngineConfig) -> ThresholdSet {
        self.threshold_overrides.unwrap_or(config.thresholds)
    }

    /// Check a restored state and fit its buffers to the current config.
    pub fn restore(mut self, config: &EngineConfig) -> AdaptationResult<Self> {
        self.component_id.validate()?;
        if !self.weights.is_on_simplex(config.weights.floor) {
            return Err(AdaptationError::Persistence(format!(
                "stored weights of `{}` are not normalized above the floor {}",
                self.component_id, config.weights.floor
            )));
        }
        if let Some(t) = &self.threshold_overrides {
            t.validate()
                .map_err(|e| AdaptationError::Persistence(e.to_string()))?;
        }
        self.trend.reconfigure(config.trend.clone());
        self.decisions.resize(config.decision.history_capacity);
        Ok(self)
    }

    pub fn summary(&self) -> DecisionSummary {
        self.decisions.summary(&self.component_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_adaptation_types::Context;

    fn state() -> ComponentState {
        let weights = AdaptiveWeights::new([("search_time_ms", 0.3), ("accuracy", 0.4)]).unwrap();
        ComponentState::new("search", weights, &EngineConfig::default())
            .unwrap()
            .with_polarity("search_time_ms", MetricPolarity::LowerIsBetter)
            .with_strategy(Strategy::new("cache-warmup").with_confidence(0.8))
            .unwrap()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        let mut bad = EngineConfig::default();
        bad.thresholds = ThresholdSet::new(0.3, 0.2, 0.1, 0.05);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn too_many_dimensions_for_floor() {
        let mut config = EngineConfig::default();
        config.weights.floor = 0.4;
        let weights = AdaptiveWeights::uniform(["a", "b", "c"]);
        assert!(ComponentState::new("c", weights, &config).is_err());
    }

    #[test]
    fn overrides_take_precedence() {
        let config = EngineConfig::default();
        let s = state();
        assert_eq!(s.base_thresholds(&config), ThresholdSet::default());
        let custom = ThresholdSet::new(0.02, 0.06, 0.2, 0.4);
        let s = s.with_threshold_overrides(custom).unwrap();
        assert_eq!(s.base_thresholds(&config), custom);
        assert!(state()
            .with_threshold_overrides(ThresholdSet::new(0.1, 0.1, 0.2, 0.3))
            .is_err());
    }

    #[test]
    fn serde_round_trip() {
        let mut s = state();
        s.trend.append(0.12, &Context::new("search"));
        s.baseline = Some(MetricSnapshot::new("search", [("accuracy", 0.9)]));
        let json = serde_json::to_string_pretty(&s).unwrap();
        let restored: ComponentState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, s);
        let restored = restored.restore(&EngineConfig::default()).unwrap();
        assert_eq!(restored.weights, s.weights);
    }

    #[test]
    fn restore_rejects_denormalized_weights() {
        let mut value = serde_json::to_value(state()).unwrap();
        value["weights"] = serde_json::json!({"accuracy": 0.9, "search_time_ms": 0.9});
        let tampered: ComponentState = serde_json::from_value(value).unwrap();
        assert!(matches!(
            tampered.restore(&EngineConfig::default()),
            Err(AdaptationError::Persistence(_))
        ));
    }

    #[test]
    fn zero_weight_is_lifted_to_floor() {
        let config = EngineConfig::default();
        let weights = AdaptiveWeights::new([("a", 0.0), ("b", 1.0)]).unwrap();
        let s = ComponentState::new("c", weights, &config).unwrap();
        assert!(s.weights.is_on_simplex(config.weights.floor));
        assert!(s.weights.get("a").unwrap() >= config.weights.floor - 1e-12);
        assert!(s.weights.get("b").unwrap() > s.weights.get("a").unwrap());
    }

    #[test]
    fn weights_above_floor_are_kept_as_given() {
        let weights = AdaptiveWeights::new([("search_time_ms", 0.3), ("accuracy", 0.4)]).unwrap();
        let s = ComponentState::new("search", weights.clone(), &EngineConfig::default()).unwrap();
        assert_eq!(s.weights, weights);
    }

    #[test]
    fn restore_rejects_weights_below_floor() {
        let mut value = serde_json::to_value(state()).unwrap();
        value["weights"] = serde_json::json!({"accuracy": 0.0, "search_time_ms": 1.0});
        let tampered: ComponentState = serde_json::from_value(value).unwrap();
        assert!(matches!(
            tampered.restore(&EngineConfig::default()),
            Err(AdaptationError::Persistence(_))
        ));
    }
}
