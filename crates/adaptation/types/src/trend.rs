//! Trend report over a component's delta history.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    /// Fewer points than the configured minimum window.
    InsufficientData,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
            Self::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

/// Linear extrapolation of the next delta.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub next_value: f64,
    pub confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendState {
    pub direction: TrendDirection,
    /// |Pearson correlation| of index against value.
    pub strength: f64,
    /// Standard deviation of raw deltas.
    pub volatility: f64,
    /// Mean second difference.
    pub acceleration: f64,
    /// Mean of the newer half minus mean of the older half.
    pub recent_performance: f64,
    pub slope: f64,
    pub prediction: Option<TrendPrediction>,
    pub sample_count: usize,
}

impl TrendState {
    pub fn insufficient(sample_count: usize) -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            strength: 0.0,
            volatility: 0.0,
            acceleration: 0.0,
            recent_performance: 0.0,
            slope: 0.0,
            prediction: None,
            sample_count,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        self.direction == TrendDirection::InsufficientData
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_state() {
        let s = TrendState::insufficient(3);
        assert!(s.is_insufficient());
        assert_eq!(s.sample_count, 3);
        assert!(s.prediction.is_none());
        assert_eq!(s.direction.to_string(), "insufficient_data");
    }
}
