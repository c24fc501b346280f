use thiserror::Error;

/// Errors surfaced by the adaptation loop.
///
/// Computation edge cases (division by zero, degenerate variance) never
/// appear here; they are absorbed by epsilon guards where they occur.
#[derive(Debug, Error)]
pub enum AdaptationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("external call timed out: {collaborator} after {timeout_ms}ms")]
    ExternalTimeout {
        collaborator: String,
        timeout_ms: u64,
    },

    #[error("external collaborator failed: {0}")]
    External(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("component not registered: {0}")]
    ComponentNotRegistered(String),

    #[error("component already registered: {0}")]
    ComponentAlreadyRegistered(String),

    #[error("strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("no pending adaptation for cycle {0}")]
    UnknownCycle(String),
}

impl AdaptationError {
    /// Shorthand for a validation failure.
    pub fn validation(detail: impl Into<String>) -> Self {
        AdaptationError::Validation(detail.into())
    }

    /// Whether this error rejects the input outright (nothing was mutated).
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, AdaptationError::Validation(_))
    }
}

impl From<std::io::Error> for AdaptationError {
    fn from(e: std::io::Error) -> Self {
        AdaptationError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AdaptationError {
    fn from(e: serde_json::Error) -> Self {
        AdaptationError::Persistence(e.to_string())
    }
}

/// Convenience type alias for adaptation results.
pub type AdaptationResult<T> = Result<T, AdaptationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = AdaptationError::ExternalTimeout {
            collaborator: "safety_gate".into(),
            timeout_ms: 2000,
        };
        let msg = e.to_string();
        assert!(msg.contains("safety_gate"));
        assert!(msg.contains("2000"));

        let e = AdaptationError::validation("metric `latency` is NaN");
        assert!(e.to_string().contains("latency"));
        assert!(e.is_rejected_input());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "state file missing");
        let err: AdaptationError = io_err.into();
        assert!(matches!(err, AdaptationError::Persistence(_)));
        assert!(err.to_string().contains("state file missing"));
        assert!(!err.is_rejected_input());
    }
}
