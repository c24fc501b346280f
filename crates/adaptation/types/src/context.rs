//! Situational context supplied with each evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdaptationError, AdaptationResult};
use crate::snapshot::ComponentId;

pub const DEFAULT_RISK_LEVEL: f64 = 0.3;
pub const DEFAULT_RESOURCE_AVAILABILITY: f64 = 0.7;
pub const DEFAULT_TIME_PRESSURE: f64 = 0.3;
pub const DEFAULT_STRATEGIC_IMPORTANCE: f64 = 0.5;

fn default_risk_level() -> f64 {
    DEFAULT_RISK_LEVEL
}

fn default_resource_availability() -> f64 {
    DEFAULT_RESOURCE_AVAILABILITY
}

fn default_time_pressure() -> f64 {
    DEFAULT_TIME_PRESSURE
}

fn default_strategic_importance() -> f64 {
    DEFAULT_STRATEGIC_IMPORTANCE
}

/// Parameters modulating thresholds and decision rules.
///
/// Every scalar lives in `[0, 1]`; [`Context::validate`] enforces it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub component_id: ComponentId,
    #[serde(default = "default_risk_level")]
    pub risk_level: f64,
    #[serde(default = "default_resource_availability")]
    pub resource_availability: f64,
    #[serde(default = "default_time_pressure")]
    pub time_pressure: f64,
    #[serde(default = "default_strategic_importance")]
    pub strategic_importance: f64,
    /// Named resource budgets consulted by strategy selection.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub available_resources: BTreeMap<String, f64>,
}

impl Context {
    pub fn new(component_id: impl Into<ComponentId>) -> Self {
        Self {
            component_id: component_id.into(),
            risk_level: DEFAULT_RISK_LEVEL,
            resource_availability: DEFAULT_RESOURCE_AVAILABILITY,
            time_pressure: DEFAULT_TIME_PRESSURE,
            strategic_importance: DEFAULT_STRATEGIC_IMPORTANCE,
            available_resources: BTreeMap::new(),
        }
    }

    pub fn with_risk_level(mut self, risk_level: f64) -> Self {
        self.risk_level = risk_level;
        self
    }

    pub fn with_resource_availability(mut self, availability: f64) -> Self {
        self.resource_availability = availability;
        self
    }

    /// Set availability from the complementary cost view.
    pub fn with_resource_cost(mut self, cost: f64) -> Self {
        self.resource_availability = 1.0 - cost;
        self
    }

    pub fn with_time_pressure(mut self, time_pressure: f64) -> Self {
        self.time_pressure = time_pressure;
        self
    }

    pub fn with_strategic_importance(mut self, importance: f64) -> Self {
        self.strategic_importance = importance;
        self
    }

    pub fn with_available_resource(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.available_resources.insert(name.into(), amount);
        self
    }

    /// Cost of acting under current resource conditions.
    pub fn resource_cost(&self) -> f64 {
        1.0 - self.resource_availability
    }

    /// Amount available for a named resource, falling back to the scalar
    /// availability when no budget is registered for it.
    pub fn available(&self, resource: &str) -> f64 {
        self.available_resources
            .get(resource)
            .copied()
            .unwrap_or(self.resource_availability)
    }

    pub fn validate(&self) -> AdaptationResult<()> {
        self.component_id.validate()?;
        let fields = [
            ("risk_level", self.risk_level),
            ("resource_availability", self.resource_availability),
            ("time_pressure", self.time_pressure),
            ("strategic_importance", self.strategic_importance),
        ];
        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(AdaptationError::validation(format!(
                    "context field `{}` must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        for (name, amount) in &self.available_resources {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(AdaptationError::validation(format!(
                    "available resource `{}` must be finite and non-negative, got {}",
                    name, amount
                )));
            }
        }
        Ok(())
    }
}
