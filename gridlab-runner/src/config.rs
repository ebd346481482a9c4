//! Serializable sweep configuration, loaded from TOML.
//!
//! ```toml
//! start_date = "2020-01-01"
//! end_date = "2023-12-31"
//! symbols = ["SPY", "QQQ"]
//! top_k = 10
//! units = 16
//! unit_timeout_secs = 600
//!
//! [cost]
//! rule = "weighted_sum"
//!
//! [[cost.terms]]
//! metric = "kelly"
//! weight = 0.3
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use gridlab_core::cost::{CombinationRule, CostFunction, CostTerm};
use gridlab_core::pipeline::SimulationSettings;

/// Upper bound on `units`; every unit is materialized before dispatch.
pub const MAX_UNITS: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum SweepConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse sweep config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize sweep config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("empty simulation period: {start} is after {end}")]
    EmptyPeriod { start: NaiveDate, end: NaiveDate },
    #[error("top_k must be at least 1")]
    ZeroTopK,
    #[error("units must be at least 1")]
    ZeroUnits,
    #[error("units must be at most {max}, got {units}")]
    TooManyUnits { units: u64, max: u64 },
    #[error("unit_timeout_secs must be positive when set")]
    ZeroTimeout,
    #[error("initial_capital must be positive and finite, got {0}")]
    BadCapital(f64),
    #[error("weight for metric {metric} must be finite, got {weight}")]
    NonFiniteWeight { metric: String, weight: f64 },
}

/// Cost function settings. Without a baseline the rule's default is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub rule: CombinationRule,
    pub baseline: Option<String>,
    pub terms: Vec<CostTerm>,
}

impl CostConfig {
    pub fn build(&self) -> CostFunction {
        let mut cost = CostFunction::new(self.rule);
        if let Some(baseline) = &self.baseline {
            cost = cost.with_baseline(baseline.clone());
        }
        for term in &self.terms {
            cost.add_parameter(term.metric.clone(), term.weight);
        }
        cost
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// First simulated date (inclusive).
    pub start_date: NaiveDate,
    /// Last simulated date (inclusive).
    pub end_date: NaiveDate,
    /// Symbols to bind; every stored symbol when absent.
    pub symbols: Option<Vec<String>>,
    pub initial_capital: f64,
    /// Ranking entries to keep.
    pub top_k: usize,
    /// Target number of work units.
    pub units: u64,
    /// Worker threads; 0 lets rayon decide.
    pub threads: usize,
    /// Wall-clock budget per unit, measured from the unit's start.
    pub unit_timeout_secs: Option<u64>,
    pub cost: CostConfig,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or(NaiveDate::MAX),
            symbols: None,
            initial_capital: 100_000.0,
            top_k: 10,
            units: 16,
            threads: 0,
            unit_timeout_secs: None,
            cost: CostConfig::default(),
        }
    }
}

impl SweepConfig {
    pub fn from_file(path: &Path) -> Result<Self, SweepConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| SweepConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, SweepConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, SweepConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SweepConfigError> {
        if self.start_date > self.end_date {
            return Err(SweepConfigError::EmptyPeriod {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.top_k == 0 {
            return Err(SweepConfigError::ZeroTopK);
        }
        if self.units == 0 {
            return Err(SweepConfigError::ZeroUnits);
        }
        if self.units > MAX_UNITS {
            return Err(SweepConfigError::TooManyUnits {
                units: self.units,
                max: MAX_UNITS,
            });
        }
        if self.unit_timeout_secs == Some(0) {
            return Err(SweepConfigError::ZeroTimeout);
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(SweepConfigError::BadCapital(self.initial_capital));
        }
        if let Some(term) = self.cost.terms.iter().find(|t| !t.weight.is_finite()) {
            return Err(SweepConfigError::NonFiniteWeight {
                metric: term.metric.clone(),
                weight: term.weight,
            });
        }
        Ok(())
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        let settings = SimulationSettings::new(self.start_date, self.end_date)
            .with_initial_capital(self.initial_capital);
        match &self.symbols {
            Some(symbols) => settings.with_symbols(symbols.clone()),
            None => settings,
        }
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }

    /// Content hash of the configuration, stable across runs.
    pub fn config_id(&self) -> Result<String, SweepConfigError> {
        let text = self.to_toml()?;
        Ok(blake3::hash(text.as_bytes()).to_hex()[..16].to_string())
    }
}
