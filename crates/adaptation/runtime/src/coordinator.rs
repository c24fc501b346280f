//! Per-component loop: drives one snapshot through the cycle
//!
//! ```text
//! Collecting ─► Evaluating ─► Deciding ─┬─► SelectingStrategy ─► SafetyCheck ─► Applying
//!     ▲                                 │ REJECT / REVIEW / ESCALATE                │
//!     └─────────────────────────────────┴───────────────────────────────────────────┤
//!                                                                                   ▼ dispatch
//!                                               execution task: executor ─► apply_outcome
//! ```
//!
//! Cycles for one component never overlap. Each submission bumps a
//! generation counter; a cycle that sees a newer generation while waiting on
//! the safety gate gives up without committing anything.
//!
//! An approved cycle commits the decision with its strategy marked pending,
//! then hands the plan to a detached execution task and returns. Executions
//! are never superseded: the task observes the executor under its own
//! timeout and learns from whatever comes back, failures included.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use maple_adaptation_engine::{AdaptationEngine, ComponentState, Evaluation, StatePersistence};
use maple_adaptation_types::{
    reasons, AdaptationError, AdaptationOutcome, AdaptationResult, AdaptiveWeights, ComponentId,
    Context, Decision, DecisionAction, DecisionSummary, MetricSnapshot,
};

use crate::collaborators::{AdaptationPlan, Collaborators, ProposedAction, StrategyExecutor};
use crate::config::RuntimeConfig;

/// Where the component's current cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    Collecting,
    Evaluating,
    Deciding,
    SelectingStrategy,
    SafetyCheck,
    /// Committing the decision and dispatching the execution task.
    Applying,
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Collecting => "COLLECTING",
            Self::Evaluating => "EVALUATING",
            Self::Deciding => "DECIDING",
            Self::SelectingStrategy => "SELECTING_STRATEGY",
            Self::SafetyCheck => "SAFETY_CHECK",
            Self::Applying => "APPLYING",
        };
        write!(f, "{}", s)
    }
}

/// Resets the phase to `Collecting` however the cycle ends.
struct PhaseGuard<'a> {
    phase: &'a watch::Sender<CyclePhase>,
}

impl<'a> PhaseGuard<'a> {
    fn enter(phase: &'a watch::Sender<CyclePhase>, first: CyclePhase) -> Self {
        phase.send_replace(first);
        Self { phase }
    }

    fn advance(&self, next: CyclePhase) {
        self.phase.send_replace(next);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(CyclePhase::Collecting);
    }
}

/// Counts one dispatched execution until dropped.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn start(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Why a collaborator call did not produce a value.
#[derive(Debug)]
enum Interruption {
    Superseded,
    TimedOut {
        collaborator: &'static str,
        limit: Duration,
    },
    Failed {
        collaborator: &'static str,
        error: AdaptationError,
    },
}

impl Interruption {
    fn into_decision(self, delta: f64) -> Decision {
        match self {
            Interruption::Superseded => Decision::review(
                reasons::SUPERSEDED,
                delta,
                "a newer snapshot arrived before the cycle completed",
            ),
            Interruption::TimedOut {
                collaborator,
                limit,
            } => {
                let error = timeout_error(collaborator, limit);
                Decision::review(reasons::EXTERNAL_TIMEOUT, delta, error.to_string())
            }
            Interruption::Failed {
                collaborator,
                error,
            } => Decision::review(
                reasons::EXTERNAL_FAILURE,
                delta,
                format!("{}: {}", collaborator, error),
            ),
        }
    }
}

fn timeout_error(collaborator: &str, limit: Duration) -> AdaptationError {
    AdaptationError::ExternalTimeout {
        collaborator: collaborator.to_string(),
        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Resolves once the generation moves past `generation`.
async fn superseded(rx: &mut watch::Receiver<u64>, generation: u64) {
    if rx.wait_for(|current| *current != generation).await.is_err() {
        // Sender gone: nothing can supersede us any more.
        std::future::pending::<()>().await;
    }
}

/// Run a collaborator call under its timeout and the supersession signal.
async fn guarded<T, F>(
    collaborator: &'static str,
    limit: Duration,
    rx: &mut watch::Receiver<u64>,
    generation: u64,
    call: F,
) -> Result<T, Interruption>
where
    F: Future<Output = AdaptationResult<T>>,
{
    tokio::select! {
        biased;
        _ = superseded(rx, generation) => Err(Interruption::Superseded),
        result = tokio::time::timeout(limit, call) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(Interruption::Failed { collaborator, error }),
            Err(_) => Err(Interruption::TimedOut { collaborator, limit }),
        },
    }
}

/// One adaptation loop instance, owning one component's state.
pub struct ComponentLoop {
    component_id: ComponentId,
    engine: Arc<AdaptationEngine>,
    state: Arc<Mutex<ComponentState>>,
    collaborators: Collaborators,
    persistence: Arc<dyn StatePersistence>,
    timeouts: RuntimeConfig,
    context_template: Context,
    generation: watch::Sender<u64>,
    cycle_gate: Mutex<()>,
    phase: watch::Sender<CyclePhase>,
    executions: Arc<watch::Sender<usize>>,
}

impl ComponentLoop {
    pub fn new(
        state: ComponentState,
        engine: Arc<AdaptationEngine>,
        collaborators: Collaborators,
        persistence: Arc<dyn StatePersistence>,
        timeouts: RuntimeConfig,
        context_template: Context,
    ) -> AdaptationResult<Self> {
        context_template.validate()?;
        if context_template.component_id != state.component_id {
            return Err(AdaptationError::validation(format!(
                "context template for `{}` given to component `{}`",
                context_template.component_id, state.component_id
            )));
        }
        let (generation, _) = watch::channel(0u64);
        let (phase, _) = watch::channel(CyclePhase::Collecting);
        let (executions, _) = watch::channel(0usize);
        Ok(Self {
            component_id: state.component_id.clone(),
            engine,
            state: Arc::new(Mutex::new(state)),
            collaborators,
            persistence,
            timeouts,
            context_template,
            generation,
            cycle_gate: Mutex::new(()),
            phase,
            executions: Arc::new(executions),
        })
    }

    pub fn component_id(&self) -> &ComponentId {
        &self.component_id
    }

    /// Context used when a snapshot arrives without one.
    pub fn context_template(&self) -> &Context {
        &self.context_template
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<CyclePhase> {
        self.phase.subscribe()
    }

    /// Number of snapshots accepted so far.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Dispatched executions whose outcome has not been learned yet.
    pub fn executions_in_flight(&self) -> usize {
        *self.executions.borrow()
    }

    /// Wait until every dispatched execution has reported back.
    pub async fn settle(&self) {
        let mut rx = self.executions.subscribe();
        // The sender lives as long as `self`.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub async fn summary(&self) -> DecisionSummary {
        self.state.lock().await.summary()
    }

    /// Copy of the committed state.
    pub async fn state(&self) -> ComponentState {
        self.state.lock().await.clone()
    }

    /// Run one cycle for `snapshot`.
    ///
    /// Invalid input is rejected before it can supersede anything. Cycles
    /// interrupted before dispatch (safety gate timeout or failure, newer
    /// snapshot) return a REVIEW decision and leave the state untouched.
    /// An approved cycle returns once its execution is dispatched.
    #[instrument(skip_all, fields(component = %self.component_id))]
    pub async fn submit(
        &self,
        snapshot: MetricSnapshot,
        context: Context,
    ) -> AdaptationResult<Decision> {
        self.check_input(&snapshot, &context)?;

        let mut my_generation = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            my_generation = *g;
        });
        let mut rx = self.generation.subscribe();

        let _cycle = tokio::select! {
            biased;
            _ = superseded(&mut rx, my_generation) => {
                debug!(generation = my_generation, "superseded while queued");
                return Ok(Interruption::Superseded.into_decision(0.0));
            }
            guard = self.cycle_gate.lock() => guard,
        };

        let phase = PhaseGuard::enter(&self.phase, CyclePhase::Evaluating);
        let (evaluation, selected) = {
            let state = self.state.lock().await;
            let evaluation = self.engine.evaluate(&state, snapshot, context)?;
            phase.advance(CyclePhase::Deciding);
            let selected = if evaluation.decision.action.is_actionable() {
                phase.advance(CyclePhase::SelectingStrategy);
                Some(self.engine.select_strategy(&state, &evaluation))
            } else {
                None
            };
            (evaluation, selected)
        };
        let cycle_id = evaluation.cycle_id;
        let delta = evaluation.decision.delta;

        let scored = match selected {
            None => {
                let decision = evaluation.decision.clone();
                if decision.action == DecisionAction::Escalate {
                    self.escalate(&decision, &evaluation.context);
                }
                self.commit(evaluation, decision.clone(), None).await;
                return Ok(decision);
            }
            Some(None) => {
                let decision = Decision::review(
                    reasons::NO_VIABLE_STRATEGY,
                    delta,
                    format!(
                        "{} decision but no strategy scored at least {}",
                        evaluation.decision.action,
                        self.engine.selector().config().min_score
                    ),
                )
                .with_tier(evaluation.decision.tier);
                self.commit(evaluation, decision.clone(), None).await;
                return Ok(decision);
            }
            Some(Some(scored)) => scored,
        };

        let mut decision = evaluation.decision.clone().with_reason(format!(
            "strategy `{}` selected with score {:.3}",
            scored.strategy.id, scored.final_score
        ));
        decision.strategy_id = Some(scored.strategy.id.clone());

        phase.advance(CyclePhase::SafetyCheck);
        let proposed = ProposedAction {
            cycle_id,
            component_id: self.component_id.clone(),
            action: decision.action,
            strategy: scored.strategy.clone(),
            decision_confidence: decision.confidence,
            aggregate_delta: delta,
            context: evaluation.context.clone(),
        };
        let verdict = match guarded(
            "safety_gate",
            self.timeouts.safety_timeout(),
            &mut rx,
            my_generation,
            self.collaborators.safety_gate.validate(&proposed),
        )
        .await
        {
            Ok(verdict) => verdict,
            Err(interruption) => return Ok(self.abandon(cycle_id, interruption, delta)),
        };

        if !verdict.approved {
            let decision = decision.vetoed(verdict.violations.iter().map(ToString::to_string));
            info!(
                cycle = %cycle_id,
                violations = verdict.violations.len(),
                "safety gate vetoed adaptation"
            );
            self.commit(evaluation, decision.clone(), None).await;
            return Ok(decision);
        }

        phase.advance(CyclePhase::Applying);
        let strategy_id = scored.strategy.id.clone();
        let plan = AdaptationPlan {
            cycle_id,
            component_id: self.component_id.clone(),
            strategy: scored.strategy,
            decision: decision.clone(),
            delta_components: evaluation.delta_components(),
        };
        self.commit(evaluation, decision.clone(), Some(strategy_id.clone()))
            .await;
        self.dispatch(plan);
        info!(
            cycle = %cycle_id,
            action = %decision.action,
            strategy = %strategy_id,
            "adaptation dispatched"
        );
        Ok(decision)
    }

    /// Feed an outcome delivered outside the cycle back into learning.
    #[instrument(skip_all, fields(component = %self.component_id, cycle = %outcome.cycle_id))]
    pub async fn apply_outcome(
        &self,
        outcome: &AdaptationOutcome,
    ) -> AdaptationResult<AdaptiveWeights> {
        let mut state = self.state.lock().await;
        let weights = self.engine.apply_outcome(&mut state, outcome)?;
        self.persist(&state);
        Ok(weights)
    }

    /// Save the committed state now.
    pub async fn flush(&self) -> AdaptationResult<()> {
        let state = self.state.lock().await;
        self.persistence.save(&state)
    }

    fn check_input(&self, snapshot: &MetricSnapshot, context: &Context) -> AdaptationResult<()> {
        snapshot.validate()?;
        context.validate()?;
        if snapshot.component_id != self.component_id || context.component_id != self.component_id {
            return Err(AdaptationError::validation(format!(
                "input for `{}` / `{}` submitted to component `{}`",
                snapshot.component_id, context.component_id, self.component_id
            )));
        }
        Ok(())
    }

    async fn commit(
        &self,
        evaluation: Evaluation,
        decision: Decision,
        dispatched: Option<String>,
    ) {
        let mut state = self.state.lock().await;
        let record = self.engine.commit(&mut state, evaluation, decision, dispatched);
        self.persist(&state);
        debug!(
            cycle = %record.cycle_id,
            action = %record.decision.action,
            rule = %record.decision.rule,
            "cycle committed"
        );
    }

    fn abandon(&self, cycle_id: Uuid, interruption: Interruption, delta: f64) -> Decision {
        match &interruption {
            Interruption::Superseded => debug!(cycle = %cycle_id, "cycle superseded"),
            Interruption::TimedOut { collaborator, limit } => warn!(
                cycle = %cycle_id,
                collaborator,
                timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                "collaborator timed out"
            ),
            Interruption::Failed { collaborator, error } => warn!(
                cycle = %cycle_id,
                collaborator,
                error = %error,
                "collaborator failed"
            ),
        }
        interruption.into_decision(delta)
    }

    /// Run the plan in a detached task and learn from its outcome.
    fn dispatch(&self, plan: AdaptationPlan) {
        let execution = Execution {
            in_flight: InFlight::start(&self.executions),
            executor: Arc::clone(&self.collaborators.executor),
            engine: Arc::clone(&self.engine),
            state: Arc::clone(&self.state),
            persistence: Arc::clone(&self.persistence),
            limit: self.timeouts.executor_timeout(),
        };
        tokio::spawn(execution.run(plan));
    }

    fn escalate(&self, decision: &Decision, context: &Context) {
        let sink = Arc::clone(&self.collaborators.escalation);
        let limit = self.timeouts.escalation_timeout();
        let decision = decision.clone();
        let context = context.clone();
        let component = self.component_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(limit, sink.notify(&decision, &context)).await {
                Ok(Ok(())) => debug!(component = %component, "escalation delivered"),
                Ok(Err(e)) => warn!(component = %component, error = %e, "escalation failed"),
                Err(_) => warn!(component = %component, "escalation timed out"),
            }
        });
    }

    fn persist(&self, state: &ComponentState) {
        if let Err(e) = self.persistence.save(state) {
            warn!(component = %self.component_id, error = %e, "failed to persist state");
        }
    }
}

/// A dispatched plan, owned by its own task.
struct Execution {
    in_flight: InFlight,
    executor: Arc<dyn StrategyExecutor>,
    engine: Arc<AdaptationEngine>,
    state: Arc<Mutex<ComponentState>>,
    persistence: Arc<dyn StatePersistence>,
    limit: Duration,
}

impl Execution {
    async fn run(self, plan: AdaptationPlan) {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.limit, self.executor.execute(&plan)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(
                    component = %plan.component_id,
                    cycle = %plan.cycle_id,
                    error = %e,
                    "executor failed"
                );
                AdaptationOutcome::failure(
                    plan.cycle_id,
                    plan.component_id.clone(),
                    plan.strategy.id.clone(),
                    e.to_string(),
                    started.elapsed(),
                )
            }
            Err(_) => {
                let error = timeout_error("executor", self.limit);
                warn!(
                    component = %plan.component_id,
                    cycle = %plan.cycle_id,
                    error = %error,
                    "executor timed out"
                );
                AdaptationOutcome::failure(
                    plan.cycle_id,
                    plan.component_id.clone(),
                    plan.strategy.id.clone(),
                    error.to_string(),
                    started.elapsed(),
                )
            }
        };

        let mut state = self.state.lock().await;
        match self.engine.apply_outcome(&mut state, &outcome) {
            Ok(_) => {
                if let Err(e) = self.persistence.save(&state) {
                    warn!(component = %plan.component_id, error = %e, "failed to persist state");
                }
                info!(
                    component = %plan.component_id,
                    cycle = %plan.cycle_id,
                    strategy = %outcome.strategy_id,
                    success = outcome.success,
                    "adaptation outcome learned"
                );
            }
            Err(e) => warn!(
                component = %plan.component_id,
                cycle = %plan.cycle_id,
                error = %e,
                "executor outcome not applied"
            ),
        }
        drop(state);
        drop(self.in_flight);
    }
}

impl std::fmt::Debug for ComponentLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentLoop")
            .field("component_id", &self.component_id)
            .field("generation", &self.generation())
            .field("phase", &self.phase())
            .field("executions_in_flight", &self.executions_in_flight())
            .finish()
    }
}
