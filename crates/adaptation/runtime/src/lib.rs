//! # maple-adaptation-runtime
//!
//! Async shell around the adaptation engine: one [`ComponentLoop`] per
//! monitored component, the collaborator contracts it talks to, and the
//! [`AdaptationService`] that routes snapshots between them.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────────┐
//!  MetricSource ───► │ AdaptationService                        │
//!  submit_snapshot ─►│   component_id ─► ComponentLoop          │
//!                    │                     │ evaluate (engine)  │
//!                    │                     ├─► SafetyGate       │
//!                    │                     ├─► StrategyExecutor │
//!                    │                     └─► EscalationSink   │
//!                    └──────────────┬───────────────────────────┘
//!                                   ▼
//!                           StatePersistence
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maple_adaptation_runtime::{AdaptationConfig, AdaptationService, Collaborators, ComponentRegistration};
//! use maple_adaptation_types::{ComponentId, MetricPolarity};
//!
//! # async fn run() -> Result<(), maple_adaptation_types::AdaptationError> {
//! let service = AdaptationService::new(AdaptationConfig::default(), Collaborators::dry_run())?;
//! service
//!     .register(
//!         ComponentRegistration::new("search", [("search_time_ms", 0.3), ("accuracy", 0.4)])
//!             .with_polarity("search_time_ms", MetricPolarity::LowerIsBetter),
//!     )
//!     .await?;
//!
//! let id = ComponentId::new("search");
//! let metrics = [("search_time_ms".to_string(), 120.0), ("accuracy".to_string(), 0.92)];
//! let decision = service.submit_snapshot(&id, metrics.into_iter().collect()).await?;
//! println!("{} ({:.2})", decision.action, decision.confidence);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod service;
pub mod telemetry;

pub use collaborators::{
    AdaptationPlan, AllowAllGate, Collaborators, DryRunExecutor, EscalationSink, LogEscalationSink,
    MetricSource, ProposedAction, SafetyGate, SafetyVerdict, StrategyExecutor, Violation,
    ViolationSeverity,
};
pub use config::{AdaptationConfig, LoggingConfig, PersistenceConfig, RuntimeConfig};
pub use coordinator::{ComponentLoop, CyclePhase};
pub use service::{AdaptationService, ComponentRegistration};
pub use telemetry::init_tracing;
