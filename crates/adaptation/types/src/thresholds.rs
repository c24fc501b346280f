//! Significance tiers a delta must clear to justify action.

use serde::{Deserialize, Serialize};

use crate::error::{AdaptationError, AdaptationResult};

pub const DEFAULT_MINIMAL: f64 = 0.01;
pub const DEFAULT_SIGNIFICANT: f64 = 0.05;
pub const DEFAULT_SUBSTANTIAL: f64 = 0.15;
pub const DEFAULT_BREAKTHROUGH: f64 = 0.30;

/// Four escalating bars, strictly increasing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub minimal: f64,
    pub significant: f64,
    pub substantial: f64,
    pub breakthrough: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            minimal: DEFAULT_MINIMAL,
            significant: DEFAULT_SIGNIFICANT,
            substantial: DEFAULT_SUBSTANTIAL,
            breakthrough: DEFAULT_BREAKTHROUGH,
        }
    }
}

impl ThresholdSet {
    pub fn new(minimal: f64, significant: f64, substantial: f64, breakthrough: f64) -> Self {
        Self {
            minimal,
            significant,
            substantial,
            breakthrough,
        }
    }

    pub fn tiers(&self) -> [f64; 4] {
        [self.minimal, self.significant, self.substantial, self.breakthrough]
    }

    pub fn from_tiers(tiers: [f64; 4]) -> Self {
        Self::new(tiers[0], tiers[1], tiers[2], tiers[3])
    }

    pub fn is_strictly_ordered(&self) -> bool {
        let t = self.tiers();
        t.windows(2).all(|w| w[0] < w[1])
    }

    /// Positive, finite and strictly increasing.
    pub fn validate(&self) -> AdaptationResult<()> {
        if self.tiers().iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(AdaptationError::validation(format!(
                "thresholds must be positive and finite: {:?}",
                self
            )));
        }
        if !self.is_strictly_ordered() {
            return Err(AdaptationError::validation(format!(
                "thresholds must satisfy minimal < significant < substantial < breakthrough: {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Highest tier the delta clears.
    pub fn classify(&self, delta: f64) -> SignificanceTier {
        if delta >= self.breakthrough {
            SignificanceTier::Breakthrough
        } else if delta >= self.substantial {
            SignificanceTier::Substantial
        } else if delta >= self.significant {
            SignificanceTier::Significant
        } else if delta >= self.minimal {
            SignificanceTier::Minimal
        } else {
            SignificanceTier::None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceTier {
    #[default]
    None,
    Minimal,
    Significant,
    Substantial,
    Breakthrough,
}
