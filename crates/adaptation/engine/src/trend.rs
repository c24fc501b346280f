//! Trend detection over a bounded window of aggregate deltas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use maple_adaptation_types::{
    AdaptationError, AdaptationResult, Context, TrendDirection, TrendPrediction, TrendState,
};

use crate::history::BoundedHistory;
use crate::stats;

pub const DEFAULT_TREND_CAPACITY: usize = 1000;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;
pub const DEFAULT_MIN_WINDOW: usize = 10;

/// Smoothing is applied only from this many points on.
pub const SMOOTHING_MIN_POINTS: usize = 5;
/// Slope magnitude separating a directional trend from a stable one.
pub const SLOPE_THRESHOLD: f64 = 0.001;
/// Points used for the linear prediction.
pub const PREDICTION_WINDOW: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub capacity: usize,
    pub smoothing_window: usize,
    pub min_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TREND_CAPACITY,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            min_window: DEFAULT_MIN_WINDOW,
        }
    }
}

impl TrendConfig {
    pub fn validate(&self) -> AdaptationResult<()> {
        if self.capacity == 0 || self.smoothing_window == 0 {
            return Err(AdaptationError::validation(
                "trend capacity and smoothing window must be positive",
            ));
        }
        if self.min_window < 2 || self.min_window > self.capacity {
            return Err(AdaptationError::validation(format!(
                "trend min_window must be within [2, capacity], got {}",
                self.min_window
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub delta: f64,
    pub risk_level: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Per-component delta window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalyzer {
    config: TrendConfig,
    window: BoundedHistory<TrendPoint>,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        let window = BoundedHistory::new(config.capacity);
        Self { config, window }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Apply a new configuration to a restored analyzer, trimming the window.
    pub fn reconfigure(&mut self, config: TrendConfig) {
        self.window.resize(config.capacity);
        self.config = config;
    }

    pub fn append(&mut self, delta: f64, context: &Context) {
        self.append_at(delta, context, Utc::now());
    }

    pub fn append_at(&mut self, delta: f64, context: &Context, recorded_at: DateTime<Utc>) {
        let delta = if delta.is_finite() { delta } else { 0.0 };
        self.window.push(TrendPoint {
            delta,
            risk_level: context.risk_level,
            recorded_at,
        });
    }

    /// Raw deltas, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.window.iter().map(|p| p.delta).collect()
    }

    /// The `n` most recent deltas, oldest first.
    pub fn recent(&self, n: usize) -> Vec<f64> {
        self.window.last_n(n).map(|p| p.delta).collect()
    }

    pub fn points(&self) -> impl Iterator<Item = &TrendPoint> {
        self.window.iter()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn detect(&self) -> TrendState {
        let raw = self.values();
        let n = raw.len();
        if n < self.config.min_window {
            return TrendState::insufficient(n);
        }

        let series = if n >= SMOOTHING_MIN_POINTS {
            stats::moving_average(&raw, self.config.smoothing_window)
        } else {
            raw.clone()
        };

        let fit = stats::linear_fit(&series);
        let direction = if fit.slope > SLOPE_THRESHOLD {
            TrendDirection::Improving
        } else if fit.slope < -SLOPE_THRESHOLD {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        let half = n / 2;
        let recent_performance = stats::mean(&raw[half..]) - stats::mean(&raw[..half]);

        TrendState {
            direction,
            strength: stats::index_correlation(&series).abs(),
            volatility: stats::std_dev(&raw),
            acceleration: stats::mean_second_difference(&raw),
            recent_performance,
            slope: fit.slope,
            prediction: Some(Self::predict(&raw[n.saturating_sub(PREDICTION_WINDOW)..])),
            sample_count: n,
        }
    }

    fn predict(tail: &[f64]) -> TrendPrediction {
        let fit = stats::linear_fit(tail);
        let next = fit.at(tail.len() as f64);
        TrendPrediction {
            next_value: if next.is_finite() { next.clamp(-1.0, 1.0) } else { 0.0 },
            confidence: 1.0 / (1.0 + 10.0 * fit.rmse(tail)),
        }
    }
}
