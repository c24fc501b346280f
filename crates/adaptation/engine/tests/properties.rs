//! Property tests over the deterministic engine components.

use std::collections::BTreeMap;
use std::time::Duration;

use maple_adaptation_engine::*;
use maple_adaptation_types::{
    AdaptationOutcome, AdaptiveWeights, ComponentId, Context, DecisionAction, MetricPolarity,
    MetricSnapshot, PolarityMap, ThresholdSet, TrendState, SIMPLEX_TOLERANCE,
};
use proptest::prelude::*;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const DIMS: [&str; 4] = ["latency", "accuracy", "throughput", "error_rate"];

fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1e9f64..1e9,
        -10.0f64..10.0,
        Just(0.0),
        Just(1e-12),
    ]
}

fn arb_metrics() -> impl Strategy<Value = BTreeMap<String, f64>> {
    prop::collection::vec(arb_value(), DIMS.len()).prop_map(|values| {
        DIMS.iter()
            .zip(values)
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    })
}

fn arb_weights() -> impl Strategy<Value = AdaptiveWeights> {
    prop::collection::vec(0.001f64..10.0, DIMS.len()).prop_map(|raw| {
        AdaptiveWeights::new(DIMS.iter().copied().zip(raw)).expect("positive weights")
    })
}

fn arb_polarity() -> impl Strategy<Value = PolarityMap> {
    prop::collection::vec(any::<bool>(), DIMS.len()).prop_map(|flags| {
        DIMS.iter()
            .zip(flags)
            .map(|(k, lower)| {
                let p = if lower {
                    MetricPolarity::LowerIsBetter
                } else {
                    MetricPolarity::HigherIsBetter
                };
                (k.to_string(), p)
            })
            .collect()
    })
}

fn arb_context() -> impl Strategy<Value = Context> {
    (0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0, 0.0f64..=1.0).prop_map(|(r, a, t, s)| {
        Context::new("svc")
            .with_risk_level(r)
            .with_resource_availability(a)
            .with_time_pressure(t)
            .with_strategic_importance(s)
    })
}

fn arb_updates() -> impl Strategy<Value = Vec<(bool, Vec<f64>)>> {
    prop::collection::vec(
        (any::<bool>(), prop::collection::vec(-1.0f64..=1.0, DIMS.len())),
        1..200,
    )
}

fn snapshot(metrics: BTreeMap<String, f64>) -> MetricSnapshot {
    MetricSnapshot::new("svc", metrics)
}

fn outcome(success: bool) -> AdaptationOutcome {
    if success {
        AdaptationOutcome::success(
            Uuid::new_v4(),
            ComponentId::new("svc"),
            "s",
            BTreeMap::new(),
            Duration::ZERO,
        )
    } else {
        AdaptationOutcome::failure(Uuid::new_v4(), ComponentId::new("svc"), "s", "failed", Duration::ZERO)
    }
}

fn learn(weights: AdaptiveWeights, updates: &[(bool, Vec<f64>)], learner: &WeightLearner) -> AdaptiveWeights {
    updates.iter().fold(weights, |w, (success, grads)| {
        let components = DIMS
            .iter()
            .zip(grads)
            .map(|(k, g)| (k.to_string(), *g))
            .collect();
        learner.update(&w, &outcome(*success), &components)
    })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Per-metric and aggregate deltas stay in [-1, 1]; confidence in [0, 1].
    #[test]
    fn deltas_are_bounded(
        current in arb_metrics(),
        baseline in arb_metrics(),
        polarity in arb_polarity(),
        weights in arb_weights(),
    ) {
        let result = DeltaCalculator::default()
            .calculate(&snapshot(current), &snapshot(baseline), &polarity, &weights)
            .unwrap();
        prop_assert!((-1.0..=1.0).contains(&result.aggregate));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        for m in result.metrics.values() {
            prop_assert!((-1.0..=1.0).contains(&m.relative));
            prop_assert!((-1.0..=1.0).contains(&m.oriented));
            prop_assert_eq!(m.improvement, m.oriented > 0.0);
        }
    }

    /// Tested confidence and p-values stay in [0, 1].
    #[test]
    fn tested_confidence_is_bounded(
        base in prop::collection::vec(-100.0f64..100.0, 2..30),
        cur in prop::collection::vec(-100.0f64..100.0, 2..30),
    ) {
        let baseline = MetricSnapshot::new("svc", [("latency", base[0])]).with_samples("latency", base);
        let current = MetricSnapshot::new("svc", [("latency", cur[0])]).with_samples("latency", cur);
        let weights = AdaptiveWeights::uniform(["latency"]);
        let result = DeltaCalculator::default()
            .calculate(&current, &baseline, &PolarityMap::new(), &weights)
            .unwrap();
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        let p = result.p_value.unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert_eq!(result.significant, p < 0.05);
    }

    /// Weights stay on the floored simplex after any sequence of updates.
    #[test]
    fn learner_keeps_weights_on_simplex(
        initial in arb_weights(),
        updates in arb_updates(),
        rate in 0.0f64..2.0,
        floor in 0.0f64..0.25,
    ) {
        let learner = WeightLearner::new(WeightConfig { learning_rate: rate, floor });
        let w = learn(initial, &updates, &learner);
        prop_assert!((w.sum() - 1.0).abs() <= SIMPLEX_TOLERANCE);
        prop_assert!(w.min_weight() >= floor - SIMPLEX_TOLERANCE);
        prop_assert_eq!(w.len(), DIMS.len());
    }

    /// The aggregate equals the weighted sum of oriented deltas for learned weights.
    #[test]
    fn aggregate_matches_weighted_sum(
        initial in arb_weights(),
        updates in arb_updates(),
        current in arb_metrics(),
        baseline in arb_metrics(),
        polarity in arb_polarity(),
    ) {
        let weights = learn(initial, &updates, &WeightLearner::default());
        let result = DeltaCalculator::default()
            .calculate(&snapshot(current), &snapshot(baseline), &polarity, &weights)
            .unwrap();
        let expected: f64 = weights
            .iter()
            .map(|(d, w)| w * result.metric(d).unwrap().oriented)
            .sum();
        prop_assert!((result.aggregate - expected).abs() <= 1e-9);
    }

    /// Threshold adaptation is pure and keeps tiers strictly ordered.
    #[test]
    fn thresholds_pure_and_ordered(
        ctx in arb_context(),
        history in prop::collection::vec(-1.0f64..=1.0, 0..30),
        scale in 0.0001f64..2.0,
    ) {
        let base = ThresholdSet::new(0.01 * scale, 0.05 * scale, 0.15 * scale, 0.30 * scale);
        let a = ThresholdManager::compute(&base, &ctx, &history);
        let b = ThresholdManager::compute(&base, &ctx, &history);
        prop_assert_eq!(a, b);
        prop_assert!(a.is_strictly_ordered());
        prop_assert!(a.minimal >= thresholds::THRESHOLD_FLOOR);
    }

    /// Insufficient below the minimum window, a defined direction at or above it.
    #[test]
    fn trend_detection_windows(values in prop::collection::vec(-1.0f64..=1.0, 0..40)) {
        let ctx = Context::new("svc");
        let mut analyzer = TrendAnalyzer::default();
        for v in &values {
            analyzer.append(*v, &ctx);
        }
        let state = analyzer.detect();
        if values.len() < analyzer.config().min_window {
            prop_assert!(state.is_insufficient());
        } else {
            prop_assert!(!state.is_insufficient());
            prop_assert!((0.0..=1.0).contains(&state.strength));
            let p = state.prediction.unwrap();
            prop_assert!((-1.0..=1.0).contains(&p.next_value));
            prop_assert!((0.0..=1.0).contains(&p.confidence));
        }
    }

    /// Strategic, costly contexts escalate whatever the delta once risk is
    /// too high for a conditional accept and too low for a reject.
    #[test]
    fn strategic_costly_context_escalates(
        delta in -1.0f64..=1.0,
        risk in 0.51f64..=0.8,
        strategic in 0.9f64..=1.0,
        cost in 0.9f64..=1.0,
    ) {
        let ctx = Context::new("svc")
            .with_risk_level(risk)
            .with_strategic_importance(strategic)
            .with_resource_availability(1.0 - cost);
        prop_assume!(ctx.resource_cost() >= 0.9);
        let d = DecisionEngine::default().decide(
            delta,
            &ctx,
            &ThresholdSet::default(),
            &TrendState::insufficient(0),
        );
        prop_assert_eq!(d.action, DecisionAction::Escalate);
    }

    /// Decision confidence always lands in [0.1, 1].
    #[test]
    fn decision_confidence_bounded(
        delta in -1.0f64..=1.0,
        ctx in arb_context(),
        values in prop::collection::vec(-1.0f64..=1.0, 10..40),
    ) {
        let mut analyzer = TrendAnalyzer::default();
        for v in &values {
            analyzer.append(*v, &ctx);
        }
        let d = DecisionEngine::default().decide(delta, &ctx, &ThresholdSet::default(), &analyzer.detect());
        prop_assert!((0.1..=1.0).contains(&d.confidence));
    }

    /// Persisted state round-trips exactly.
    #[test]
    fn state_round_trips(
        weights in arb_weights(),
        deltas in prop::collection::vec(-1.0f64..=1.0, 0..50),
    ) {
        let config = EngineConfig::default();
        let mut state = ComponentState::new("svc", weights, &config).unwrap();
        let ctx = Context::new("svc");
        for d in &deltas {
            state.trend.append(*d, &ctx);
        }
        let store = InMemoryStore::new();
        store.save(&state).unwrap();
        let restored = store.load(&state.component_id).unwrap().unwrap();
        prop_assert_eq!(&restored.weights, &state.weights);
        prop_assert_eq!(restored.trend.values(), state.trend.values());
        prop_assert_eq!(restored, state);
    }
}
