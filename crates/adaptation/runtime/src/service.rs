//! Service surface: component registry, snapshot routing and polling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use maple_adaptation_engine::{
    AdaptationEngine, ComponentState, InMemoryStore, JsonFileStore, StatePersistence,
};
use maple_adaptation_types::{
    reasons, AdaptationError, AdaptationOutcome, AdaptationResult, AdaptiveWeights, ComponentId,
    Context, Decision, DecisionSummary, Goal, MetricPolarity, MetricSnapshot, Strategy,
    ThresholdSet,
};

use crate::collaborators::{Collaborators, MetricSource};
use crate::config::{AdaptationConfig, PersistenceConfig};
use crate::coordinator::ComponentLoop;

/// Everything needed to start adapting a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRegistration {
    pub component_id: ComponentId,
    /// Initial importance per metric; normalized on registration.
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub polarity: BTreeMap<String, MetricPolarity>,
    #[serde(default)]
    pub goal: Goal,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_overrides: Option<ThresholdSet>,
    /// Context applied to snapshots submitted without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl ComponentRegistration {
    pub fn new<K, I>(component_id: impl Into<ComponentId>, weights: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        Self {
            component_id: component_id.into(),
            weights: weights.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            polarity: BTreeMap::new(),
            goal: Goal::default(),
            strategies: Vec::new(),
            threshold_overrides: None,
            context: None,
        }
    }

    pub fn with_polarity(mut self, metric: impl Into<String>, polarity: MetricPolarity) -> Self {
        self.polarity.insert(metric.into(), polarity);
        self
    }

    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goal = goal;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_threshold_overrides(mut self, thresholds: ThresholdSet) -> Self {
        self.threshold_overrides = Some(thresholds);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    fn fresh_state(&self, engine: &AdaptationEngine) -> AdaptationResult<ComponentState> {
        let weights = AdaptiveWeights::new(self.weights.iter().map(|(k, v)| (k.clone(), *v)))?;
        let mut state = engine
            .new_state(self.component_id.clone(), weights)?
            .with_goal(self.goal.clone())?;
        state.polarity = self.polarity.clone();
        if let Some(t) = self.threshold_overrides {
            state = state.with_threshold_overrides(t)?;
        }
        for s in &self.strategies {
            state = state.with_strategy(s.clone())?;
        }
        Ok(state)
    }

    /// Restored state keeps what it learned; the registration refreshes
    /// goal and polarity, and contributes strategies the state lacks.
    fn merge_into(&self, mut state: ComponentState) -> AdaptationResult<ComponentState> {
        self.goal.validate()?;
        state.goal = self.goal.clone();
        state.polarity = self.polarity.clone();
        if let Some(t) = self.threshold_overrides {
            state = state.with_threshold_overrides(t)?;
        }
        for s in &self.strategies {
            if state.strategies.get(&s.id).is_none() {
                state.strategies.register(s.clone())?;
            }
        }
        Ok(state)
    }
}

/// Routes snapshots to per-component loops.
pub struct AdaptationService {
    config: AdaptationConfig,
    engine: Arc<AdaptationEngine>,
    collaborators: Collaborators,
    persistence: Arc<dyn StatePersistence>,
    loops: RwLock<HashMap<ComponentId, Arc<ComponentLoop>>>,
    sources: RwLock<HashMap<ComponentId, Arc<dyn MetricSource>>>,
}

impl AdaptationService {
    /// Build a service with the store named in `config.persistence`.
    pub fn new(config: AdaptationConfig, collaborators: Collaborators) -> AdaptationResult<Self> {
        let persistence: Arc<dyn StatePersistence> = match &config.persistence {
            PersistenceConfig::Memory => Arc::new(InMemoryStore::new()),
            PersistenceConfig::JsonFile { dir } => Arc::new(JsonFileStore::new(dir.clone())),
        };
        Self::with_persistence(config, collaborators, persistence)
    }

    pub fn with_persistence(
        config: AdaptationConfig,
        collaborators: Collaborators,
        persistence: Arc<dyn StatePersistence>,
    ) -> AdaptationResult<Self> {
        config.validate()?;
        let engine = Arc::new(AdaptationEngine::new(config.engine.clone())?);
        Ok(Self {
            config,
            engine,
            collaborators,
            persistence,
            loops: RwLock::new(HashMap::new()),
            sources: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    /// Create the component's loop, restoring persisted state when present.
    #[instrument(skip_all, fields(component = %registration.component_id))]
    pub async fn register(&self, registration: ComponentRegistration) -> AdaptationResult<()> {
        registration.component_id.validate()?;
        let id = registration.component_id.clone();

        let mut loops = self.loops.write().await;
        if loops.contains_key(&id) {
            return Err(AdaptationError::ComponentAlreadyRegistered(id.to_string()));
        }

        let state = match self.restore(&id) {
            Some(stored) => match registration.merge_into(stored) {
                Ok(state) => {
                    info!("restored persisted state");
                    state
                }
                Err(e) => {
                    warn!(error = %e, "persisted state incompatible with registration, starting fresh");
                    registration.fresh_state(&self.engine)?
                }
            },
            None => registration.fresh_state(&self.engine)?,
        };

        let context = registration
            .context
            .clone()
            .unwrap_or_else(|| Context::new(id.clone()));
        let component = ComponentLoop::new(
            state,
            Arc::clone(&self.engine),
            self.collaborators.clone(),
            Arc::clone(&self.persistence),
            self.config.runtime.clone(),
            context,
        )?;
        if let Err(e) = component.flush().await {
            warn!(error = %e, "failed to persist initial state");
        }
        loops.insert(id, Arc::new(component));
        Ok(())
    }

    /// Register a component that is also polled through `source`.
    pub async fn register_with_source(
        &self,
        registration: ComponentRegistration,
        source: Arc<dyn MetricSource>,
    ) -> AdaptationResult<()> {
        let id = registration.component_id.clone();
        self.register(registration).await?;
        self.sources.write().await.insert(id, source);
        Ok(())
    }

    /// Tear down the component's loop once its dispatched executions have
    /// reported back. Its persisted state is kept.
    #[instrument(skip(self))]
    pub async fn deregister(&self, component_id: &ComponentId) -> AdaptationResult<()> {
        let component = self
            .loops
            .write()
            .await
            .remove(component_id)
            .ok_or_else(|| AdaptationError::ComponentNotRegistered(component_id.to_string()))?;
        self.sources.write().await.remove(component_id);
        component.settle().await;
        if let Err(e) = component.flush().await {
            warn!(error = %e, "failed to persist final state");
        }
        info!("component deregistered");
        Ok(())
    }

    pub async fn components(&self) -> Vec<ComponentId> {
        let mut ids: Vec<_> = self.loops.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Submit plain metrics under the component's default context.
    pub async fn submit_snapshot(
        &self,
        component_id: &ComponentId,
        metrics: BTreeMap<String, f64>,
    ) -> AdaptationResult<Decision> {
        self.submit(MetricSnapshot::new(component_id.clone(), metrics))
            .await
    }

    pub async fn submit(&self, snapshot: MetricSnapshot) -> AdaptationResult<Decision> {
        let component = self.component(&snapshot.component_id).await?;
        let context = component.context_template().clone();
        component.submit(snapshot, context).await
    }

    pub async fn submit_with_context(
        &self,
        snapshot: MetricSnapshot,
        context: Context,
    ) -> AdaptationResult<Decision> {
        let component = self.component(&snapshot.component_id).await?;
        component.submit(snapshot, context).await
    }

    pub async fn get_summary(&self, component_id: &ComponentId) -> AdaptationResult<DecisionSummary> {
        Ok(self.component(component_id).await?.summary().await)
    }

    /// Copy of the component's committed state.
    pub async fn state(&self, component_id: &ComponentId) -> AdaptationResult<ComponentState> {
        Ok(self.component(component_id).await?.state().await)
    }

    /// Wait for the component's dispatched executions to report back.
    pub async fn settle(&self, component_id: &ComponentId) -> AdaptationResult<()> {
        self.component(component_id).await?.settle().await;
        Ok(())
    }

    pub async fn apply_outcome(&self, outcome: &AdaptationOutcome) -> AdaptationResult<AdaptiveWeights> {
        self.component(&outcome.component_id)
            .await?
            .apply_outcome(outcome)
            .await
    }

    /// Fetch a snapshot from the component's source and run a cycle on it.
    #[instrument(skip(self))]
    pub async fn poll_component(&self, component_id: &ComponentId) -> AdaptationResult<Decision> {
        let component = self.component(component_id).await?;
        let source = self
            .sources
            .read()
            .await
            .get(component_id)
            .cloned()
            .ok_or_else(|| {
                AdaptationError::validation(format!("component `{}` has no metric source", component_id))
            })?;

        let limit = self.config.runtime.source_timeout();
        let snapshot = match tokio::time::timeout(limit, source.fetch(component_id)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!(error = %e, "metric source failed");
                return Ok(Decision::review(
                    reasons::EXTERNAL_FAILURE,
                    0.0,
                    format!("metric_source: {}", e),
                ));
            }
            Err(_) => {
                let error = AdaptationError::ExternalTimeout {
                    collaborator: "metric_source".to_string(),
                    timeout_ms: self.config.runtime.source_timeout_ms,
                };
                warn!(error = %error, "metric source timed out");
                return Ok(Decision::review(reasons::EXTERNAL_TIMEOUT, 0.0, error.to_string()));
            }
        };

        let context = component.context_template().clone();
        component.submit(snapshot, context).await
    }

    /// Poll every component with a source each `interval` until `shutdown`
    /// flips to true.
    pub fn spawn_poller(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("poller stopped");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        let ids: Vec<ComponentId> = self.sources.read().await.keys().cloned().collect();
                        for id in ids {
                            let service = Arc::clone(&self);
                            tokio::spawn(async move {
                                match service.poll_component(&id).await {
                                    Ok(decision) => debug!(
                                        component = %id,
                                        action = %decision.action,
                                        rule = %decision.rule,
                                        "poll cycle finished"
                                    ),
                                    Err(e) => warn!(component = %id, error = %e, "poll cycle failed"),
                                }
                            });
                        }
                    }
                }
            }
        })
    }

    async fn component(&self, component_id: &ComponentId) -> AdaptationResult<Arc<ComponentLoop>> {
        self.loops
            .read()
            .await
            .get(component_id)
            .cloned()
            .ok_or_else(|| AdaptationError::ComponentNotRegistered(component_id.to_string()))
    }

    fn restore(&self, component_id: &ComponentId) -> Option<ComponentState> {
        match self.persistence.load(component_id) {
            Ok(Some(stored)) => match stored.restore(self.engine.config()) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(component = %component_id, error = %e, "discarding persisted state");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(component = %component_id, error = %e, "failed to load persisted state");
                None
            }
        }
    }
}

impl std::fmt::Debug for AdaptationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptationService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
