//! Configuration for the adaptation runtime

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use maple_adaptation_engine::EngineConfig;
use maple_adaptation_types::{AdaptationError, AdaptationResult};

/// Main runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationConfig {
    /// Engine tuning (delta, weights, thresholds, trend, decision, strategy)
    #[serde(default)]
    pub engine: EngineConfig,

    /// Collaborator timeouts and polling
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// State persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Timeouts for the external calls of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Safety gate timeout in milliseconds
    #[serde(default = "default_safety_timeout")]
    pub safety_timeout_ms: u64,

    /// Strategy executor timeout in milliseconds
    #[serde(default = "default_executor_timeout")]
    pub executor_timeout_ms: u64,

    /// Metric source timeout in milliseconds
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,

    /// Escalation sink timeout in milliseconds
    #[serde(default = "default_escalation_timeout")]
    pub escalation_timeout_ms: u64,

    /// Interval between metric source polls in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            safety_timeout_ms: default_safety_timeout(),
            executor_timeout_ms: default_executor_timeout(),
            source_timeout_ms: default_source_timeout(),
            escalation_timeout_ms: default_escalation_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl RuntimeConfig {
    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_millis(self.executor_timeout_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_millis(self.escalation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where per-component state is kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistenceConfig {
    /// In-memory only (lost on restart)
    #[default]
    Memory,

    /// One JSON file per component
    JsonFile {
        /// Directory holding the state files
        dir: PathBuf,
    },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_safety_timeout() -> u64 {
    2_000
}

fn default_executor_timeout() -> u64 {
    30_000
}

fn default_source_timeout() -> u64 {
    5_000
}

fn default_escalation_timeout() -> u64 {
    5_000
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AdaptationConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `ADAPT__*` environment variables (`ADAPT__RUNTIME__SAFETY_TIMEOUT_MS`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&AdaptationConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with ADAPT prefix
        builder = builder.add_source(
            config::Environment::with_prefix("ADAPT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> AdaptationResult<()> {
        self.engine.validate()?;
        let timeouts = [
            ("safety_timeout_ms", self.runtime.safety_timeout_ms),
            ("executor_timeout_ms", self.runtime.executor_timeout_ms),
            ("source_timeout_ms", self.runtime.source_timeout_ms),
            ("escalation_timeout_ms", self.runtime.escalation_timeout_ms),
            ("poll_interval_ms", self.runtime.poll_interval_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(AdaptationError::validation(format!(
                    "runtime {} must be positive",
                    name
                )));
            }
        }
        if let PersistenceConfig::JsonFile { dir } = &self.persistence {
            if dir.as_os_str().is_empty() {
                return Err(AdaptationError::validation("persistence dir is empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AdaptationConfig::default();
        assert!(config.validate().is_ok());
        assert!(matches!(config.persistence, PersistenceConfig::Memory));
        assert_eq!(config.runtime.safety_timeout(), Duration::from_secs(2));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = AdaptationConfig::load(None).unwrap();
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("adapt_config_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("adapt.json");
        std::fs::write(
            &path,
            r#"{
                "runtime": { "safety_timeout_ms": 250 },
                "persistence": { "type": "json_file", "dir": "/tmp/adapt-state" },
                "engine": { "strategy": { "min_score": 0.4 } }
            }"#,
        )
        .unwrap();

        let config = AdaptationConfig::load(path.to_str()).unwrap();
        assert_eq!(config.runtime.safety_timeout_ms, 250);
        assert_eq!(config.runtime.executor_timeout_ms, 30_000);
        assert_eq!(
            config.persistence,
            PersistenceConfig::JsonFile {
                dir: PathBuf::from("/tmp/adapt-state")
            }
        );
        assert!((config.engine.strategy.min_score - 0.4).abs() < 1e-12);
        assert!(config.validate().is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AdaptationConfig::default();
        config.runtime.executor_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
