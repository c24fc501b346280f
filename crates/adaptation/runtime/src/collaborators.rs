//! Contracts of the external collaborators and the bundled implementations.
//!
//! The loop only consumes these contracts: where metrics come from, how a
//! safety rule engine reaches its verdict, and how strategies are executed
//! stay outside this crate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use maple_adaptation_types::{
    AdaptationOutcome, AdaptationResult, ComponentId, Context, Decision, DecisionAction,
    MetricSnapshot, Strategy,
};

/// What the safety gate is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub cycle_id: Uuid,
    pub component_id: ComponentId,
    pub action: DecisionAction,
    pub strategy: Strategy,
    pub decision_confidence: f64,
    pub aggregate_delta: f64,
    pub context: Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: ViolationSeverity,
    pub rule: String,
    pub message: String,
}

impl Violation {
    pub fn new(severity: ViolationSeverity, rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            rule: rule.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.rule, self.message)
    }
}

/// Pass/fail result of the safety gate. Anything not approved is a veto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub approved: bool,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl SafetyVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            violations: Vec::new(),
        }
    }

    pub fn veto(violations: Vec<Violation>) -> Self {
        Self {
            approved: false,
            violations,
        }
    }
}

/// What the executor is asked to carry out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationPlan {
    pub cycle_id: Uuid,
    pub component_id: ComponentId,
    pub strategy: Strategy,
    pub decision: Decision,
    /// Oriented per-metric deltas that motivated the plan.
    pub delta_components: BTreeMap<String, f64>,
}

/// Delivers metric snapshots on demand.
#[async_trait]
pub trait MetricSource: Send + Sync {
    async fn fetch(&self, component_id: &ComponentId) -> AdaptationResult<MetricSnapshot>;
}

/// External safety rule engine.
#[async_trait]
pub trait SafetyGate: Send + Sync {
    async fn validate(&self, proposed: &ProposedAction) -> AdaptationResult<SafetyVerdict>;
}

/// Carries out an approved strategy.
#[async_trait]
pub trait StrategyExecutor: Send + Sync {
    async fn execute(&self, plan: &AdaptationPlan) -> AdaptationResult<AdaptationOutcome>;
}

/// Receives ESCALATE decisions. Fire-and-forget from the loop's view.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn notify(&self, decision: &Decision, context: &Context) -> AdaptationResult<()>;
}

/// Approves everything.
#[derive(Debug, Default, Clone)]
pub struct AllowAllGate;

#[async_trait]
impl SafetyGate for AllowAllGate {
    async fn validate(&self, _proposed: &ProposedAction) -> AdaptationResult<SafetyVerdict> {
        Ok(SafetyVerdict::approve())
    }
}

/// Reports success without side effects, echoing the strategy's expected
/// outcomes as realized metrics.
#[derive(Debug, Default, Clone)]
pub struct DryRunExecutor;

#[async_trait]
impl StrategyExecutor for DryRunExecutor {
    async fn execute(&self, plan: &AdaptationPlan) -> AdaptationResult<AdaptationOutcome> {
        let started = Instant::now();
        info!(
            component = %plan.component_id,
            cycle = %plan.cycle_id,
            strategy = %plan.strategy.id,
            "dry run: strategy not executed"
        );
        Ok(AdaptationOutcome::success(
            plan.cycle_id,
            plan.component_id.clone(),
            plan.strategy.id.clone(),
            plan.strategy.expected_outcomes.clone(),
            started.elapsed(),
        ))
    }
}

/// Logs escalations at warn level.
#[derive(Debug, Default, Clone)]
pub struct LogEscalationSink;

#[async_trait]
impl EscalationSink for LogEscalationSink {
    async fn notify(&self, decision: &Decision, context: &Context) -> AdaptationResult<()> {
        warn!(
            component = %context.component_id,
            confidence = decision.confidence,
            delta = decision.delta,
            strategic_importance = context.strategic_importance,
            resource_cost = context.resource_cost(),
            "decision escalated"
        );
        Ok(())
    }
}

/// The collaborators one loop talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub safety_gate: Arc<dyn SafetyGate>,
    pub executor: Arc<dyn StrategyExecutor>,
    pub escalation: Arc<dyn EscalationSink>,
}

impl Collaborators {
    pub fn new(
        safety_gate: Arc<dyn SafetyGate>,
        executor: Arc<dyn StrategyExecutor>,
        escalation: Arc<dyn EscalationSink>,
    ) -> Self {
        Self {
            safety_gate,
            executor,
            escalation,
        }
    }

    /// Allow-all gate, dry-run executor, logging escalation sink.
    pub fn dry_run() -> Self {
        Self::new(
            Arc::new(AllowAllGate),
            Arc::new(DryRunExecutor),
            Arc::new(LogEscalationSink),
        )
    }

    pub fn with_safety_gate(mut self, gate: Arc<dyn SafetyGate>) -> Self {
        self.safety_gate = gate;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn StrategyExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_escalation(mut self, sink: Arc<dyn EscalationSink>) -> Self {
        self.escalation = sink;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::dry_run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> AdaptationPlan {
        AdaptationPlan {
            cycle_id: Uuid::new_v4(),
            component_id: ComponentId::new("search"),
            strategy: Strategy::new("cache-warmup").with_expected_outcome("accuracy", 0.93),
            decision: Decision::new(DecisionAction::Accept, 0.9, "accept", 0.1),
            delta_components: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn dry_run_echoes_expected_outcomes() {
        let plan = plan();
        let outcome = DryRunExecutor.execute(&plan).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.cycle_id, plan.cycle_id);
        assert_eq!(outcome.realized_metrics.get("accuracy"), Some(&0.93));
    }

    #[tokio::test]
    async fn allow_all_approves() {
        let plan = plan();
        let proposed = ProposedAction {
            cycle_id: plan.cycle_id,
            component_id: plan.component_id.clone(),
            action: DecisionAction::Accept,
            strategy: plan.strategy.clone(),
            decision_confidence: 0.9,
            aggregate_delta: 0.1,
            context: Context::new("search"),
        };
        let verdict = AllowAllGate.validate(&proposed).await.unwrap();
        assert!(verdict.approved);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn violation_display() {
        let v = Violation::new(ViolationSeverity::Critical, "max_replicas", "would exceed 10 replicas");
        assert_eq!(v.to_string(), "[critical] max_replicas: would exceed 10 replicas");
        assert!(ViolationSeverity::Critical > ViolationSeverity::Low);
    }
}
