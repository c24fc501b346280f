//! Realized results of executing a strategy.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::ComponentId;

/// Produced by the external executor, consumed once by weight learning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptationOutcome {
    /// Cycle that dispatched the strategy.
    pub cycle_id: Uuid,
    pub component_id: ComponentId,
    pub strategy_id: String,
    pub success: bool,
    #[serde(default)]
    pub realized_metrics: BTreeMap<String, f64>,
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl AdaptationOutcome {
    pub fn success(
        cycle_id: Uuid,
        component_id: ComponentId,
        strategy_id: impl Into<String>,
        realized_metrics: BTreeMap<String, f64>,
        duration: Duration,
    ) -> Self {
        Self {
            cycle_id,
            component_id,
            strategy_id: strategy_id.into(),
            success: true,
            realized_metrics,
            duration,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        cycle_id: Uuid,
        component_id: ComponentId,
        strategy_id: impl Into<String>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            cycle_id,
            component_id,
            strategy_id: strategy_id.into(),
            success: false,
            realized_metrics: BTreeMap::new(),
            duration,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }
}
