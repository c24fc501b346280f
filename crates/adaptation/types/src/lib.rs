//! # maple-adaptation-types
//!
//! Shared data model for the adaptive decision loop: what a metric tick looks
//! like, how change between ticks is expressed, and what a governed decision
//! carries.
//!
//! ```text
//!   MetricSnapshot ─► DeltaResult ─► TrendState ─► ThresholdSet ─► Decision
//!                                                                   │
//!                               Strategy ◄── Goal + Context ◄───────┘
//!                                   │
//!                                   ▼
//!                           AdaptationOutcome ─► AdaptiveWeights
//! ```

#![deny(unsafe_code)]

pub mod context;
pub mod decision;
pub mod delta;
pub mod error;
pub mod outcome;
pub mod snapshot;
pub mod strategy;
pub mod thresholds;
pub mod trend;
pub mod weights;

pub use context::Context;
pub use decision::{
    reasons, Decision, DecisionAction, DecisionRecord, DecisionSummary, QualityTier,
};
pub use delta::{ConfidenceMethod, DeltaResult, MetricDelta};
pub use error::{AdaptationError, AdaptationResult};
pub use outcome::AdaptationOutcome;
pub use snapshot::{ComponentId, MetricPolarity, MetricSnapshot, PolarityMap};
pub use strategy::{Goal, GoalTarget, RiskProfile, Strategy};
pub use thresholds::{SignificanceTier, ThresholdSet};
pub use trend::{TrendDirection, TrendPrediction, TrendState};
pub use weights::{AdaptiveWeights, SIMPLEX_TOLERANCE};
