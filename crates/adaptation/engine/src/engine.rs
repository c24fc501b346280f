//! Engine façade: runs one evaluation over a component's state.
//!
//! Evaluation never mutates state. It stages the trend update, thresholds
//! and decision in an [`Evaluation`]; the caller commits it once the cycle
//! has completed. A cycle that times out or is superseded simply drops its
//! evaluation.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use maple_adaptation_types::{
    reasons, AdaptationError, AdaptationOutcome, AdaptationResult, AdaptiveWeights, ComponentId,
    Context, Decision, DecisionRecord, DeltaResult, MetricSnapshot, TrendState,
};

use crate::decision::DecisionEngine;
use crate::delta::DeltaCalculator;
use crate::state::{ComponentState, EngineConfig, PendingAdaptation};
use crate::strategy::{ScoredStrategy, StrategySelector};
use crate::thresholds::{AdjustedThresholds, ThresholdManager, LEARNING_WINDOW};
use crate::weights::WeightLearner;

/// Staged result of evaluating one snapshot.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub cycle_id: Uuid,
    pub snapshot: MetricSnapshot,
    pub context: Context,
    /// `None` for the first snapshot, which only establishes the baseline.
    pub delta: Option<DeltaResult>,
    pub trend: TrendState,
    pub thresholds: AdjustedThresholds,
    pub decision: Decision,
}

impl Evaluation {
    pub fn delta_components(&self) -> BTreeMap<String, f64> {
        self.delta
            .as_ref()
            .map(DeltaResult::components)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdaptationEngine {
    config: EngineConfig,
    calculator: DeltaCalculator,
    learner: WeightLearner,
    rules: DecisionEngine,
    selector: StrategySelector,
}

impl AdaptationEngine {
    pub fn new(config: EngineConfig) -> AdaptationResult<Self> {
        config.validate()?;
        Ok(Self {
            calculator: DeltaCalculator::new(config.delta.clone()),
            learner: WeightLearner::new(config.weights.clone()),
            rules: DecisionEngine::default(),
            selector: StrategySelector::new(config.strategy.clone()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn selector(&self) -> &StrategySelector {
        &self.selector
    }

    /// Fresh state for a newly registered component.
    pub fn new_state(
        &self,
        component_id: impl Into<ComponentId>,
        weights: AdaptiveWeights,
    ) -> AdaptationResult<ComponentState> {
        ComponentState::new(component_id, weights, &self.config)
    }

    /// Evaluate `snapshot` against the committed state.
    pub fn evaluate(
        &self,
        state: &ComponentState,
        snapshot: MetricSnapshot,
        context: Context,
    ) -> AdaptationResult<Evaluation> {
        snapshot.validate()?;
        context.validate()?;
        for (what, id) in [
            ("snapshot", &snapshot.component_id),
            ("context", &context.component_id),
        ] {
            if *id != state.component_id {
                return Err(AdaptationError::validation(format!(
                    "{} for `{}` submitted to component `{}`",
                    what, id, state.component_id
                )));
            }
        }

        let cycle_id = Uuid::new_v4();
        let base = state.base_thresholds(&self.config);
        let history = state.trend.recent(LEARNING_WINDOW);
        let thresholds = ThresholdManager::compute_with_modifiers(&base, &context, &history);

        let Some(baseline) = &state.baseline else {
            let decision = Decision::review(
                reasons::BASELINE_ESTABLISHED,
                0.0,
                "first snapshot recorded as baseline",
            );
            return Ok(Evaluation {
                cycle_id,
                snapshot,
                context,
                delta: None,
                trend: state.trend.detect(),
                thresholds,
                decision,
            });
        };

        let delta = self
            .calculator
            .calculate(&snapshot, baseline, &state.polarity, &state.weights)?;

        let mut trend = state.trend.clone();
        trend.append(delta.aggregate, &context);
        let trend_state = trend.detect();

        let decision = self
            .rules
            .decide(delta.aggregate, &context, &thresholds.thresholds, &trend_state)
            .with_reason(format!(
                "delta confidence {:.3} ({:?}, significant: {})",
                delta.confidence, delta.method, delta.significant
            ));

        debug!(
            component = %state.component_id,
            cycle = %cycle_id,
            aggregate = delta.aggregate,
            action = %decision.action,
            rule = %decision.rule,
            "snapshot evaluated"
        );

        Ok(Evaluation {
            cycle_id,
            snapshot,
            context,
            delta: Some(delta),
            trend: trend_state,
            thresholds,
            decision,
        })
    }

    /// Best registered strategy for the evaluation's context.
    pub fn select_strategy(
        &self,
        state: &ComponentState,
        evaluation: &Evaluation,
    ) -> Option<ScoredStrategy> {
        self.selector
            .select(state.strategies.iter(), &state.goal, &evaluation.context)
    }

    /// Apply a completed cycle: trend window, baseline roll-forward,
    /// decision history and, for dispatched strategies, the pending entry.
    pub fn commit(
        &self,
        state: &mut ComponentState,
        evaluation: Evaluation,
        decision: Decision,
        dispatched: Option<String>,
    ) -> DecisionRecord {
        let Evaluation {
            cycle_id,
            snapshot,
            context,
            delta,
            ..
        } = evaluation;

        if let Some(d) = &delta {
            state.trend.append(d.aggregate, &context);
            if let Some(strategy_id) = dispatched {
                state.pending.insert(
                    cycle_id,
                    PendingAdaptation {
                        strategy_id,
                        delta_components: d.components(),
                        dispatched_at: Utc::now(),
                    },
                );
            }
        }
        state.baseline = Some(snapshot);

        let record = DecisionRecord {
            cycle_id,
            component_id: state.component_id.clone(),
            decision,
            delta,
        };
        state.decisions.push(record.clone());
        state.touch();
        record
    }

    /// Feed an executor outcome back into weights and strategy confidence.
    ///
    /// Each dispatched cycle accepts exactly one outcome.
    pub fn apply_outcome(
        &self,
        state: &mut ComponentState,
        outcome: &AdaptationOutcome,
    ) -> AdaptationResult<AdaptiveWeights> {
        if outcome.component_id != state.component_id {
            return Err(AdaptationError::validation(format!(
                "outcome for `{}` delivered to component `{}`",
                outcome.component_id, state.component_id
            )));
        }
        let pending = state
            .pending
            .remove(&outcome.cycle_id)
            .ok_or_else(|| AdaptationError::UnknownCycle(outcome.cycle_id.to_string()))?;

        if pending.strategy_id != outcome.strategy_id {
            warn!(
                component = %state.component_id,
                cycle = %outcome.cycle_id,
                dispatched = %pending.strategy_id,
                reported = %outcome.strategy_id,
                "outcome names a different strategy than was dispatched"
            );
        }

        state.weights = self
            .learner
            .update(&state.weights, outcome, &pending.delta_components);

        if let Err(e) =
            state
                .strategies
                .record_outcome(&self.selector, &pending.strategy_id, outcome.success)
        {
            warn!(component = %state.component_id, error = %e, "strategy confidence not updated");
        }
        state.touch();
        Ok(state.weights.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maple_adaptation_types::{DecisionAction, MetricPolarity, Strategy};
    use std::time::Duration;

    fn engine() -> AdaptationEngine {
        AdaptationEngine::new(EngineConfig::default()).unwrap()
    }

    fn search_state(engine: &AdaptationEngine) -> ComponentState {
        let weights = AdaptiveWeights::new([("search_time_ms", 0.3), ("accuracy", 0.4)]).unwrap();
        engine
            .new_state("search", weights)
            .unwrap()
            .with_polarity("search_time_ms", MetricPolarity::LowerIsBetter)
            .with_strategy(
                Strategy::new("index-tuning")
                    .with_expected_outcome("accuracy", 0.95)
                    .with_confidence(0.9),
            )
            .unwrap()
    }

    fn run_cycle(
        engine: &AdaptationEngine,
        state: &mut ComponentState,
        metrics: [(&str, f64); 2],
    ) -> DecisionRecord {
        let eval = engine
            .evaluate(state, MetricSnapshot::new("search", metrics), Context::new("search"))
            .unwrap();
        let decision = eval.decision.clone();
        engine.commit(state, eval, decision, None)
    }

    #[test]
    fn first_snapshot_establishes_baseline() {
        let engine = engine();
        let mut state = search_state(&engine);
        let record = run_cycle(&engine, &mut state, [("search_time_ms", 150.0), ("accuracy", 0.85)]);
        assert_eq!(record.decision.action, DecisionAction::Review);
        assert!(record.decision.is_tagged(reasons::BASELINE_ESTABLISHED));
        assert!(state.baseline.is_some());
        assert!(state.trend.is_empty());
    }

    #[test]
    fn improvement_is_accepted() {
        let engine = engine();
        let mut state = search_state(&engine);
        run_cycle(&engine, &mut state, [("search_time_ms", 150.0), ("accuracy", 0.85)]);
        let record = run_cycle(&engine, &mut state, [("search_time_ms", 120.0), ("accuracy", 0.92)]);
        assert_eq!(record.decision.action, DecisionAction::Accept);
        let delta = record.delta.unwrap();
        assert_eq!(delta.improving_metrics().count(), 2);
        assert!(delta.aggregate > 0.0);
        assert_eq!(state.trend.len(), 1);
        assert_eq!(state.baseline.as_ref().unwrap().value("search_time_ms"), Some(120.0));
    }

    #[test]
    fn evaluate_does_not_mutate() {
        let engine = engine();
        let mut state = search_state(&engine);
        run_cycle(&engine, &mut state, [("search_time_ms", 150.0), ("accuracy", 0.85)]);
        let before = state.clone();
        let _ = engine
            .evaluate(
                &state,
                MetricSnapshot::new("search", [("search_time_ms", 100.0)]),
                Context::new("search"),
            )
            .unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn invalid_input_rejected() {
        let engine = engine();
        let state = search_state(&engine);
        let err = engine
            .evaluate(
                &state,
                MetricSnapshot::new("search", [("accuracy", f64::INFINITY)]),
                Context::new("search"),
            )
            .unwrap_err();
        assert!(err.is_rejected_input());
        assert!(engine
            .evaluate(
                &state,
                MetricSnapshot::new("other", [("accuracy", 0.9)]),
                Context::new("other"),
            )
            .is_err());
        assert!(engine
            .evaluate(
                &state,
                MetricSnapshot::new("search", [("accuracy", 0.9)]),
                Context::new("search").with_risk_level(2.0),
            )
            .is_err());
    }

    #[test]
    fn outcome_updates_weights_and_confidence_once() {
        let engine = engine();
        let mut state = search_state(&engine);
        run_cycle(&engine, &mut state, [("search_time_ms", 150.0), ("accuracy", 0.85)]);

        let eval = engine
            .evaluate(
                &state,
                MetricSnapshot::new("search", [("search_time_ms", 150.0), ("accuracy", 0.95)]),
                Context::new("search"),
            )
            .unwrap();
        let chosen = engine.select_strategy(&state, &eval).unwrap();
        let decision = eval.decision.clone();
        let cycle_id = eval.cycle_id;
        engine.commit(&mut state, eval, decision, Some(chosen.strategy.id.clone()));
        assert_eq!(state.pending.len(), 1);

        let before = state.weights.get("accuracy").unwrap();
        let outcome = AdaptationOutcome::success(
            cycle_id,
            state.component_id.clone(),
            "index-tuning",
            BTreeMap::new(),
            Duration::from_millis(10),
        );
        let weights = engine.apply_outcome(&mut state, &outcome).unwrap();
        assert!(weights.get("accuracy").unwrap() > before);
        assert!(weights.is_on_simplex(engine.config().weights.floor));
        assert!(state.strategies.get("index-tuning").unwrap().confidence_score > 0.9);
        assert!(state.pending.is_empty());

        assert!(matches!(
            engine.apply_outcome(&mut state, &outcome),
            Err(AdaptationError::UnknownCycle(_))
        ));
    }
}
