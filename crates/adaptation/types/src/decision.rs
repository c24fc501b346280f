//! Governed decisions and their summary statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delta::DeltaResult;
use crate::snapshot::ComponentId;
use crate::thresholds::SignificanceTier;

/// Rule tags attached to decisions that no rule produced.
pub mod reasons {
    pub const EXTERNAL_TIMEOUT: &str = "external_timeout";
    pub const EXTERNAL_FAILURE: &str = "external_failure";
    pub const SUPERSEDED: &str = "superseded";
    pub const BASELINE_ESTABLISHED: &str = "baseline_established";
    pub const NO_VIABLE_STRATEGY: &str = "no_viable_strategy";
    pub const SAFETY_VETO: &str = "safety_veto";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Accept,
    ConditionalAccept,
    Reject,
    Escalate,
    Review,
}

impl DecisionAction {
    /// Whether the decision proceeds to strategy selection.
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Accept | Self::ConditionalAccept)
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accept => "ACCEPT",
            Self::ConditionalAccept => "CONDITIONAL_ACCEPT",
            Self::Reject => "REJECT",
            Self::Escalate => "ESCALATE",
            Self::Review => "REVIEW",
        };
        write!(f, "{}", s)
    }
}

/// Result of one evaluation cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub confidence: f64,
    /// Name of the rule (or reason tag) that produced the decision.
    pub rule: String,
    pub reasoning: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Aggregate delta the decision was made on.
    pub delta: f64,
    pub tier: SignificanceTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
}

impl Decision {
    pub fn new(action: DecisionAction, confidence: f64, rule: impl Into<String>, delta: f64) -> Self {
        Self {
            action,
            confidence,
            rule: rule.into(),
            reasoning: Vec::new(),
            timestamp: Utc::now(),
            delta,
            tier: SignificanceTier::None,
            strategy_id: None,
        }
    }

    /// REVIEW tagged with a reason, used when a cycle cannot conclude.
    pub fn review(reason: &str, delta: f64, detail: impl Into<String>) -> Self {
        let mut d = Self::new(DecisionAction::Review, 0.5, reason, delta);
        d.reasoning.push(detail.into());
        d
    }

    pub fn with_reason(mut self, line: impl Into<String>) -> Self {
        self.reasoning.push(line.into());
        self
    }

    pub fn with_tier(mut self, tier: SignificanceTier) -> Self {
        self.tier = tier;
        self
    }

    /// Downgrade to REJECT after a safety veto.
    pub fn vetoed<I, S>(mut self, violations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = self.action;
        self.action = DecisionAction::Reject;
        self.rule = reasons::SAFETY_VETO.to_string();
        self.reasoning
            .push(format!("safety gate vetoed {} decision", previous));
        self.reasoning.extend(violations.into_iter().map(Into::into));
        self
    }

    pub fn is_tagged(&self, reason: &str) -> bool {
        self.rule == reason
    }
}

/// Decision as kept in the bounded history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub cycle_id: Uuid,
    pub component_id: ComponentId,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaResult>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Good,
    Moderate,
    Low,
}

impl QualityTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Good
        } else if confidence >= 0.4 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

/// Summary statistics over a component's decision history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub component_id: ComponentId,
    pub total: usize,
    pub action_distribution: BTreeMap<DecisionAction, u64>,
    pub avg_confidence: f64,
    pub quality_tier: QualityTier,
}
