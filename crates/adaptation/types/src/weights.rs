//! Adaptive aggregation weights constrained to the probability simplex.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdaptationError, AdaptationResult};

/// Tolerance on `Σ weights = 1`.
pub const SIMPLEX_TOLERANCE: f64 = 1e-9;

/// Dimension → weight, summing to one.
///
/// Only constructed through [`AdaptiveWeights::new`] (normalizing caller
/// input) or [`AdaptiveWeights::projected`] (floor-preserving projection used
/// by weight learning), so the simplex invariant always holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdaptiveWeights {
    weights: BTreeMap<String, f64>,
}

impl AdaptiveWeights {
    /// Normalize raw non-negative weights so they sum to one.
    pub fn new<K, I>(raw: I) -> AdaptationResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        let raw: BTreeMap<String, f64> = raw.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if raw.is_empty() {
            return Err(AdaptationError::validation("weights must name at least one dimension"));
        }
        if let Some((name, w)) = raw.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(AdaptationError::validation(format!(
                "weight for `{}` must be finite and non-negative, got {}",
                name, w
            )));
        }
        let total: f64 = raw.values().sum();
        if total <= f64::EPSILON {
            return Err(AdaptationError::validation("weights sum to zero"));
        }
        Ok(Self {
            weights: raw.into_iter().map(|(k, v)| (k, v / total)).collect(),
        })
    }

    /// Equal weight for every dimension.
    pub fn uniform<K, I>(dimensions: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
    {
        let names: Vec<String> = dimensions.into_iter().map(Into::into).collect();
        let w = if names.is_empty() { 0.0 } else { 1.0 / names.len() as f64 };
        Self {
            weights: names.into_iter().map(|n| (n, w)).collect(),
        }
    }

    /// Project arbitrary values onto `{w : Σw = 1, w_i ≥ floor}`.
    ///
    /// `w_i = floor + (1 - n·floor) · excess_i / Σ excess`, with
    /// `excess_i = max(w_i - floor, 0)`. Falls back to uniform weights when
    /// no dimension has excess. A floor above `1/n` is lowered to `1/n`.
    pub fn projected(raw: BTreeMap<String, f64>, floor: f64) -> Self {
        let n = raw.len();
        if n == 0 {
            return Self { weights: raw };
        }
        let floor = floor.max(0.0).min(1.0 / n as f64);
        let excess: BTreeMap<String, f64> = raw
            .into_iter()
            .map(|(k, w)| {
                let e = if w.is_finite() { (w - floor).max(0.0) } else { 0.0 };
                (k, e)
            })
            .collect();
        let total: f64 = excess.values().sum();
        let budget = (1.0 - n as f64 * floor).max(0.0);
        let weights = if total <= f64::EPSILON {
            excess.into_keys().map(|k| (k, 1.0 / n as f64)).collect()
        } else {
            excess
                .into_iter()
                .map(|(k, e)| (k, floor + budget * e / total))
                .collect()
        };
        Self { weights }
    }

    pub fn get(&self, dimension: &str) -> Option<f64> {
        self.weights.get(dimension).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn min_weight(&self) -> f64 {
        self.weights.values().copied().fold(f64::INFINITY, f64::min)
    }

    /// Whether the vector sits on the simplex with every weight ≥ `floor`.
    pub fn is_on_simplex(&self, floor: f64) -> bool {
        !self.is_empty()
            && (self.sum() - 1.0).abs() <= SIMPLEX_TOLERANCE
            && self.min_weight() >= floor - SIMPLEX_TOLERANCE
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}
