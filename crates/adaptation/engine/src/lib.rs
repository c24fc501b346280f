//! # maple-adaptation-engine
//!
//! Deterministic core of the adaptation loop. Every component here is
//! synchronous and free of I/O apart from [`persistence`]; the runtime crate
//! wires them to collaborators.
//!
//! ## Architecture
//!
//! ```text
//!   MetricSnapshot ──► DeltaCalculator ──► aggregate delta + confidence
//!                                               │
//!                      TrendAnalyzer ◄──────────┤  (staged append)
//!                           │                   │
//!   Context ──► ThresholdManager ──► tiers      │
//!                           │                   ▼
//!                           └──────────► DecisionEngine ──► Decision
//!                                                              │ actionable
//!                                                              ▼
//!                                       StrategySelector ──► Strategy
//!                                                              │ executor
//!                                                              ▼
//!                         WeightLearner ◄──────────── AdaptationOutcome
//! ```
//!
//! [`AdaptationEngine::evaluate`] stages a cycle without touching
//! [`ComponentState`]; [`AdaptationEngine::commit`] applies it and
//! [`AdaptationEngine::apply_outcome`] feeds results back.
//!
//! ## Quick Start
//!
//! ```rust
//! use maple_adaptation_engine::{AdaptationEngine, EngineConfig};
//! use maple_adaptation_types::{AdaptiveWeights, Context, DecisionAction, MetricPolarity, MetricSnapshot};
//!
//! let engine = AdaptationEngine::new(EngineConfig::default()).unwrap();
//! let weights = AdaptiveWeights::new([("search_time_ms", 0.3), ("accuracy", 0.4)]).unwrap();
//! let mut state = engine
//!     .new_state("search", weights)
//!     .unwrap()
//!     .with_polarity("search_time_ms", MetricPolarity::LowerIsBetter);
//!
//! for metrics in [[("search_time_ms", 150.0), ("accuracy", 0.85)], [("search_time_ms", 120.0), ("accuracy", 0.92)]] {
//!     let eval = engine
//!         .evaluate(&state, MetricSnapshot::new("search", metrics), Context::new("search"))
//!         .unwrap();
//!     let decision = eval.decision.clone();
//!     engine.commit(&mut state, eval, decision, None);
//! }
//! assert_eq!(state.decisions.latest().unwrap().decision.action, DecisionAction::Accept);
//! ```

#![deny(unsafe_code)]

pub mod decision;
pub mod delta;
pub mod engine;
pub mod history;
pub mod persistence;
pub mod state;
pub mod stats;
pub mod strategy;
pub mod thresholds;
pub mod trend;
pub mod weights;

pub use decision::{default_rules, DecisionConfig, DecisionEngine, DecisionHistory, DecisionRule, RuleInput};
pub use delta::{DeltaCalculator, DeltaConfig};
pub use engine::{AdaptationEngine, Evaluation};
pub use history::BoundedHistory;
pub use persistence::{InMemoryStore, JsonFileStore, StatePersistence};
pub use state::{ComponentState, EngineConfig, PendingAdaptation};
pub use strategy::{ScoredStrategy, StrategyConfig, StrategyRegistry, StrategySelector, UtilityBreakdown};
pub use thresholds::{AdjustedThresholds, ThresholdManager, ThresholdModifiers};
pub use trend::{TrendAnalyzer, TrendConfig, TrendPoint};
pub use weights::{WeightConfig, WeightLearner};
