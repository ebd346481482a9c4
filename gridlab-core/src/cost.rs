//! Cost functions: map a statistics bag to one comparable score.
//!
//! Both rules start from a baseline metric that is present even when no
//! weighted terms were added:
//! - `WeightedSum`:     `baseline + Σ wᵢ·mᵢ`
//! - `WeightedProduct`: `baseline · Π |mᵢ|^wᵢ`
//!
//! The product takes magnitudes so that signed metrics (e.g. a negative Kelly
//! fraction) never produce a fractional power of a negative number.

use serde::{Deserialize, Serialize};

use crate::statistics::{Statistics, StatisticsError};

/// Errors raised while scoring statistics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CostError {
    #[error("cannot read metric {metric} for cost function: {source}")]
    Format {
        metric: String,
        #[source]
        source: StatisticsError,
    },
}

/// How weighted terms combine with the baseline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinationRule {
    #[default]
    WeightedSum,
    WeightedProduct,
}

impl CombinationRule {
    /// Baseline metric used when none is configured.
    pub fn default_baseline(&self) -> &'static str {
        match self {
            Self::WeightedSum => "avGain",
            Self::WeightedProduct => "avWinAvLoss",
        }
    }
}

/// One `(metric, weight)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTerm {
    pub metric: String,
    pub weight: f64,
}

/// Ordered weighted terms plus a combination rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostFunction {
    rule: CombinationRule,
    baseline: String,
    terms: Vec<CostTerm>,
}

impl Default for CostFunction {
    fn default() -> Self {
        Self::weighted_sum()
    }
}

impl CostFunction {
    pub fn new(rule: CombinationRule) -> Self {
        Self {
            rule,
            baseline: rule.default_baseline().to_string(),
            terms: Vec::new(),
        }
    }

    pub fn weighted_sum() -> Self {
        Self::new(CombinationRule::WeightedSum)
    }

    pub fn weighted_product() -> Self {
        Self::new(CombinationRule::WeightedProduct)
    }

    /// Replace the baseline metric.
    pub fn with_baseline(mut self, metric: impl Into<String>) -> Self {
        self.baseline = metric.into();
        self
    }

    pub fn add_parameter(&mut self, metric: impl Into<String>, weight: f64) {
        self.terms.push(CostTerm {
            metric: metric.into(),
            weight,
        });
    }

    pub fn rule(&self) -> CombinationRule {
        self.rule
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn terms(&self) -> &[CostTerm] {
        &self.terms
    }

    /// Score a statistics bag. Terms accumulate in insertion order.
    pub fn calculate(&self, statistics: &Statistics) -> Result<f64, CostError> {
        let read = |metric: &str| {
            statistics.metric(metric).map_err(|source| CostError::Format {
                metric: metric.to_string(),
                source,
            })
        };

        let mut score = read(&self.baseline)?;
        for term in &self.terms {
            let value = read(&term.metric)?;
            match self.rule {
                CombinationRule::WeightedSum => score += term.weight * value,
                CombinationRule::WeightedProduct => score *= value.abs().powf(term.weight),
            }
        }
        Ok(score)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
