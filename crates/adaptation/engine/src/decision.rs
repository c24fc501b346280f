//! Rule-based decisioning.
//!
//! Rules are plain records evaluated in order; the first whose condition
//! holds decides the action and its base confidence. The trend then scales
//! that confidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use maple_adaptation_types::{
    AdaptationError, AdaptationResult, ComponentId, Context, Decision, DecisionAction,
    DecisionRecord, DecisionSummary, QualityTier, ThresholdSet, TrendDirection, TrendState,
};

use crate::history::BoundedHistory;

pub const DEFAULT_DECISION_HISTORY: usize = 1000;

const MIN_ADJUSTMENT: f64 = 0.1;
const MAX_ADJUSTMENT: f64 = 1.5;

/// Everything a rule condition may look at.
#[derive(Clone, Copy, Debug)]
pub struct RuleInput<'a> {
    pub delta: f64,
    pub context: &'a Context,
    pub thresholds: &'a ThresholdSet,
}

pub type RuleCondition = fn(&RuleInput<'_>) -> bool;

#[derive(Clone, Copy)]
pub struct DecisionRule {
    pub name: &'static str,
    pub condition: RuleCondition,
    pub action: DecisionAction,
    pub base_confidence: f64,
}

impl DecisionRule {
    pub fn matches(&self, input: &RuleInput<'_>) -> bool {
        (self.condition)(input)
    }
}

impl std::fmt::Debug for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionRule")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("base_confidence", &self.base_confidence)
            .finish()
    }
}

fn accept(i: &RuleInput<'_>) -> bool {
    i.delta >= i.thresholds.minimal
        && i.context.risk_level <= 0.7
        && i.context.resource_cost() <= 0.8
}

fn escalate(i: &RuleInput<'_>) -> bool {
    i.context.strategic_importance >= 0.9 && i.context.resource_cost() >= 0.9
}

fn conditional(i: &RuleInput<'_>) -> bool {
    i.delta >= i.thresholds.minimal * 0.5
        && i.context.strategic_importance >= 0.7
        && i.context.risk_level <= 0.5
}

fn reject(i: &RuleInput<'_>) -> bool {
    i.delta < i.thresholds.minimal * 0.5 && i.context.risk_level > 0.8
}

fn always(_: &RuleInput<'_>) -> bool {
    true
}

/// Rules in priority order, ending with the catch-all.
///
/// `escalate` only decides what `accept`, `conditional` and `reject` leave
/// open, so a strategic, costly context still escalates whenever risk sits
/// in (0.5, 0.8].
pub fn default_rules() -> Vec<DecisionRule> {
    vec![
        DecisionRule {
            name: "accept",
            condition: accept,
            action: DecisionAction::Accept,
            base_confidence: 1.0,
        },
        DecisionRule {
            name: "conditional",
            condition: conditional,
            action: DecisionAction::ConditionalAccept,
            base_confidence: 0.7,
        },
        DecisionRule {
            name: "reject",
            condition: reject,
            action: DecisionAction::Reject,
            base_confidence: 0.9,
        },
        DecisionRule {
            name: "escalate",
            condition: escalate,
            action: DecisionAction::Escalate,
            base_confidence: 0.8,
        },
        DecisionRule {
            name: "default",
            condition: always,
            action: DecisionAction::Review,
            base_confidence: 0.5,
        },
    ]
}

#[derive(Clone, Debug)]
pub struct DecisionEngine {
    rules: Vec<DecisionRule>,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl DecisionEngine {
    pub fn new(rules: Vec<DecisionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DecisionRule] {
        &self.rules
    }

    pub fn decide(
        &self,
        delta: f64,
        context: &Context,
        thresholds: &ThresholdSet,
        trend: &TrendState,
    ) -> Decision {
        let input = RuleInput {
            delta,
            context,
            thresholds,
        };
        let tier = thresholds.classify(delta);

        let Some(rule) = self.rules.iter().find(|r| r.matches(&input)) else {
            return Decision::new(DecisionAction::Review, 0.5, "default", delta)
                .with_tier(tier)
                .with_reason("no rule matched");
        };

        let confidence = Self::adjust_confidence(rule.base_confidence, trend);
        Decision::new(rule.action, confidence, rule.name, delta)
            .with_tier(tier)
            .with_reason(format!(
                "rule `{}` matched: delta {:.4} vs minimal {:.4}, risk {:.2}, resource cost {:.2}, strategic {:.2}",
                rule.name,
                delta,
                thresholds.minimal,
                context.risk_level,
                context.resource_cost(),
                context.strategic_importance
            ))
            .with_reason(format!(
                "trend {} (strength {:.2}, volatility {:.2}, {} samples)",
                trend.direction, trend.strength, trend.volatility, trend.sample_count
            ))
    }

    /// Scale a base confidence by trend direction, strength and volatility.
    pub fn adjust_confidence(base: f64, trend: &TrendState) -> f64 {
        if trend.is_insufficient() {
            return base.clamp(MIN_ADJUSTMENT, MAX_ADJUSTMENT).min(1.0);
        }
        let mut c = base;
        match trend.direction {
            TrendDirection::Improving => c *= 1.1,
            TrendDirection::Declining => c *= 0.9,
            _ => {}
        }
        c *= 0.8 + 0.4 * trend.strength;
        c *= 1.2 - trend.volatility;
        c.clamp(MIN_ADJUSTMENT, MAX_ADJUSTMENT).min(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub history_capacity: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_DECISION_HISTORY,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        if self.history_capacity == 0 {
            return Err(AdaptationError::validation(
                "decision history capacity must be positive",
            ));
        }
        Ok(())
    }
}

/// Bounded record of a component's decisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionHistory {
    records: BoundedHistory<DecisionRecord>,
}

impl Default for DecisionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_DECISION_HISTORY)
    }
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: BoundedHistory::new(capacity),
        }
    }

    pub fn resize(&mut self, capacity: usize) {
        self.records.resize(capacity);
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &DecisionRecord> {
        self.records.last_n(n)
    }

    pub fn latest(&self) -> Option<&DecisionRecord> {
        self.records.latest()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self, component_id: &ComponentId) -> DecisionSummary {
        let mut action_distribution = BTreeMap::new();
        let mut total_confidence = 0.0;
        for r in self.records.iter() {
            *action_distribution.entry(r.decision.action).or_insert(0) += 1;
            total_confidence += r.decision.confidence;
        }
        let total = self.records.len();
        let avg_confidence = if total == 0 {
            0.0
        } else {
            total_confidence / total as f64
        };
        DecisionSummary {
            component_id: component_id.clone(),
            total,
            action_distribution,
            avg_confidence,
            quality_tier: QualityTier::from_confidence(avg_confidence),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn insufficient() -> TrendState {
        TrendState::insufficient(0)
    }

    fn trend(direction: TrendDirection, strength: f64, volatility: f64) -> TrendState {
        TrendState {
            direction,
            strength,
            volatility,
            acceleration: 0.0,
            recent_performance: 0.0,
            slope: 0.0,
            prediction: None,
            sample_count: 20,
        }
    }

    fn thresholds() -> ThresholdSet {
        ThresholdSet::default()
    }

    #[test]
    fn accept_fires_first() {
        let ctx = Context::new("c").with_risk_level(0.3).with_resource_cost(0.5);
        let d = DecisionEngine::default().decide(0.02, &ctx, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::Accept);
        assert_eq!(d.rule, "accept");
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn small_delta_under_high_risk_rejects() {
        let ctx = Context::new("c").with_risk_level(0.9);
        let d = DecisionEngine::default().decide(0.003, &ctx, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::Reject);
        assert!((d.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn strategic_and_costly_escalates_for_any_delta() {
        let ctx = Context::new("c")
            .with_strategic_importance(0.95)
            .with_resource_cost(0.95);
        let engine = DecisionEngine::default();
        for delta in [-1.0, -0.1, 0.0, 0.003, 0.02, 0.5, 1.0] {
            for risk in [0.55, 0.7, 0.8] {
                let ctx = ctx.clone().with_risk_level(risk);
                let d = engine.decide(delta, &ctx, &thresholds(), &insufficient());
                assert_eq!(d.action, DecisionAction::Escalate, "delta {delta} risk {risk}");
                assert_eq!(d.rule, "escalate");
            }
        }
    }

    #[test]
    fn earlier_rules_shadow_escalation() {
        let ctx = Context::new("c")
            .with_strategic_importance(0.95)
            .with_resource_cost(0.95);
        let engine = DecisionEngine::default();

        let low_risk = ctx.clone().with_risk_level(0.3);
        let d = engine.decide(0.02, &low_risk, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::ConditionalAccept);

        let high_risk = ctx.with_risk_level(0.9);
        let d = engine.decide(0.003, &high_risk, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::Reject);
    }

    #[test]
    fn rules_follow_fixed_priority() {
        let names: Vec<_> = default_rules().iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["accept", "conditional", "reject", "escalate", "default"]);
    }

    #[test]
    fn conditional_accept_for_strategic_half_minimal() {
        let ctx = Context::new("c")
            .with_strategic_importance(0.8)
            .with_risk_level(0.4);
        let d = DecisionEngine::default().decide(0.006, &ctx, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::ConditionalAccept);
        assert!((d.confidence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn fallthrough_is_review() {
        let ctx = Context::new("c");
        let d = DecisionEngine::default().decide(0.001, &ctx, &thresholds(), &insufficient());
        assert_eq!(d.action, DecisionAction::Review);
        assert_eq!(d.rule, "default");
    }

    #[test]
    fn each_rule_condition_in_isolation() {
        let t = thresholds();
        let ctx = Context::new("c").with_risk_level(0.9);
        let input = RuleInput {
            delta: 0.0,
            context: &ctx,
            thresholds: &t,
        };
        let rules = default_rules();
        let names: Vec<_> = rules.iter().filter(|r| r.matches(&input)).map(|r| r.name).collect();
        assert_eq!(names, vec!["reject", "default"]);
    }

    #[test]
    fn trend_scales_confidence() {
        let improving = trend(TrendDirection::Improving, 1.0, 0.0);
        // 0.5 * 1.1 * 1.2 * 1.2
        assert!((DecisionEngine::adjust_confidence(0.5, &improving) - 0.792).abs() < 1e-12);

        let declining = trend(TrendDirection::Declining, 0.0, 0.5);
        // 0.9 * 0.9 * 0.8 * 0.7
        assert!((DecisionEngine::adjust_confidence(0.9, &declining) - 0.4536).abs() < 1e-12);

        let chaotic = trend(TrendDirection::Stable, 0.0, 1.2);
        assert_eq!(DecisionEngine::adjust_confidence(1.0, &chaotic), 0.1);

        assert_eq!(DecisionEngine::adjust_confidence(1.0, &improving), 1.0);
    }

    #[test]
    fn history_summary() {
        let mut history = DecisionHistory::new(3);
        let id = ComponentId::new("c");
        for (action, conf) in [
            (DecisionAction::Review, 0.1),
            (DecisionAction::Accept, 0.9),
            (DecisionAction::Accept, 0.85),
            (DecisionAction::Reject, 0.95),
        ] {
            history.push(DecisionRecord {
                cycle_id: Uuid::new_v4(),
                component_id: id.clone(),
                decision: Decision::new(action, conf, "r", 0.0),
                delta: None,
            });
        }
        let summary = history.summary(&id);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.action_distribution[&DecisionAction::Accept], 2);
        assert!(!summary.action_distribution.contains_key(&DecisionAction::Review));
        assert!((summary.avg_confidence - 0.9).abs() < 1e-12);
        assert_eq!(summary.quality_tier, QualityTier::High);
    }

    #[test]
    fn empty_history_summary() {
        let summary = DecisionHistory::default().summary(&ComponentId::new("c"));
        assert_eq!(summary.total, 0);
        assert_eq!(summary.quality_tier, QualityTier::Low);
    }
}
