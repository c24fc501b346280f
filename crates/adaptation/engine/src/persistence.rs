//! State persistence: save and load per-component state across restarts.
//!
//! Provides the `StatePersistence` trait, a `JsonFileStore` keeping one JSON
//! document per component, and an `InMemoryStore` for tests and ephemeral
//! deployments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use maple_adaptation_types::{AdaptationError, AdaptationResult, ComponentId};

use crate::state::ComponentState;

/// Storage for per-component state.
///
/// Learned weights, threshold overrides, windows and the strategy registry
/// must survive restarts; losing them means relearning from scratch.
pub trait StatePersistence: Send + Sync {
    /// Persist the full state of one component, replacing any previous one.
    fn save(&self, state: &ComponentState) -> AdaptationResult<()>;

    /// Load a component's state. `Ok(None)` when nothing was stored.
    fn load(&self, component_id: &ComponentId) -> AdaptationResult<Option<ComponentState>>;

    /// Drop stored state. Removing an unknown component is not an error.
    fn remove(&self, component_id: &ComponentId) -> AdaptationResult<()>;

    /// Components with stored state.
    fn list(&self) -> AdaptationResult<Vec<ComponentId>>;
}

/// One `<dir>/<component>.json` file per component.
///
/// Writes are atomic (write to `.tmp`, then rename) so an interrupted save
/// leaves the previous state intact.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a component's state file. Characters outside
    /// `[A-Za-z0-9._-]` are replaced so ids cannot escape the directory.
    pub fn path_for(&self, component_id: &ComponentId) -> PathBuf {
        let name: String = component_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.starts_with('.') {
            format!("_{}", name)
        } else {
            name
        };
        self.dir.join(format!("{}.json", name))
    }
}

impl StatePersistence for JsonFileStore {
    fn save(&self, state: &ComponentState) -> AdaptationResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(state).map_err(|e| {
            AdaptationError::Persistence(format!("serialization failed: {}", e))
        })?;

        let path = self.path_for(&state.component_id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn load(&self, component_id: &ComponentId) -> AdaptationResult<Option<ComponentState>> {
        let path = self.path_for(component_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let state: ComponentState = serde_json::from_str(&contents).map_err(|e| {
            AdaptationError::Persistence(format!(
                "deserialization of {} failed: {}",
                path.display(),
                e
            ))
        })?;
        if state.component_id != *component_id {
            return Err(AdaptationError::Persistence(format!(
                "{} holds state for `{}`, expected `{}`",
                path.display(),
                state.component_id,
                component_id
            )));
        }
        Ok(Some(state))
    }

    fn remove(&self, component_id: &ComponentId) -> AdaptationResult<()> {
        let path = self.path_for(component_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> AdaptationResult<Vec<ComponentId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ComponentState>(&contents) {
                Ok(state) => ids.push(state.component_id),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable state file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory persistence, stored as serialized JSON so that round-trips are
/// exercised exactly as with the file store.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<ComponentId, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AdaptationResult<std::sync::MutexGuard<'_, HashMap<ComponentId, String>>> {
        self.data
            .lock()
            .map_err(|_| AdaptationError::Persistence("state store lock poisoned".into()))
    }
}

impl StatePersistence for InMemoryStore {
    fn save(&self, state: &ComponentState) -> AdaptationResult<()> {
        let json = serde_json::to_string(state)?;
        self.lock()?.insert(state.component_id.clone(), json);
        Ok(())
    }

    fn load(&self, component_id: &ComponentId) -> AdaptationResult<Option<ComponentState>> {
        let data = self.lock()?;
        match data.get(component_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn remove(&self, component_id: &ComponentId) -> AdaptationResult<()> {
        self.lock()?.remove(component_id);
        Ok(())
    }

    fn list(&self) -> AdaptationResult<Vec<ComponentId>> {
        let mut ids: Vec<ComponentId> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EngineConfig;
    use maple_adaptation_types::{AdaptiveWeights, Context, MetricPolarity, Strategy, ThresholdSet};

    fn make_state(id: &str) -> ComponentState {
        let weights = AdaptiveWeights::new([("latency", 0.3), ("accuracy", 0.7)]).unwrap();
        let mut state = ComponentState::new(id, weights, &EngineConfig::default())
            .unwrap()
            .with_polarity("latency", MetricPolarity::LowerIsBetter)
            .with_threshold_overrides(ThresholdSet::new(0.02, 0.06, 0.2, 0.4))
            .unwrap()
            .with_strategy(Strategy::new("scale-out").with_confidence(0.7))
            .unwrap();
        let ctx = Context::new(id);
        for d in [0.01, 0.05, -0.02] {
            state.trend.append(d, &ctx);
        }
        state
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("adaptation_{}_{}", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn json_save_and_load_roundtrip() {
        let dir = temp_dir("roundtrip");
        let store = JsonFileStore::new(&dir);
        let state = make_state("search");

        store.save(&state).unwrap();
        let loaded = store.load(&state.component_id).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.weights, state.weights);
        assert_eq!(loaded.threshold_overrides, state.threshold_overrides);
        assert_eq!(loaded.trend.values(), state.trend.values());
        assert!(!path_has_tmp(&dir));

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn path_has_tmp(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .unwrap()
            .any(|e| e.unwrap().path().to_string_lossy().ends_with(".tmp"))
    }

    #[test]
    fn json_load_missing_is_none() {
        let store = JsonFileStore::new(temp_dir("missing"));
        assert!(store.load(&ComponentId::new("nobody")).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn json_corrupt_file_is_persistence_error() {
        let dir = temp_dir("corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        let store = JsonFileStore::new(&dir);
        let id = ComponentId::new("search");
        std::fs::write(store.path_for(&id), "{ not json").unwrap();
        assert!(matches!(store.load(&id), Err(AdaptationError::Persistence(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_list_and_remove() {
        let dir = temp_dir("list");
        let store = JsonFileStore::new(&dir);
        store.save(&make_state("b")).unwrap();
        store.save(&make_state("a")).unwrap();
        assert_eq!(
            store.list().unwrap(),
            vec![ComponentId::new("a"), ComponentId::new("b")]
        );
        store.remove(&ComponentId::new("a")).unwrap();
        store.remove(&ComponentId::new("a")).unwrap();
        assert_eq!(store.list().unwrap(), vec![ComponentId::new("b")]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_is_sanitized() {
        let store = JsonFileStore::new("/var/lib/adapt");
        let path = store.path_for(&ComponentId::new("../etc/passwd"));
        assert_eq!(path, PathBuf::from("/var/lib/adapt/_.._etc_passwd.json"));
    }

    #[test]
    fn in_memory_roundtrip() {
        let store = InMemoryStore::new();
        let state = make_state("search");
        store.save(&state).unwrap();
        assert_eq!(store.load(&state.component_id).unwrap(), Some(state.clone()));
        assert_eq!(store.list().unwrap(), vec![state.component_id.clone()]);
        store.remove(&state.component_id).unwrap();
        assert!(store.load(&state.component_id).unwrap().is_none());
    }
}
