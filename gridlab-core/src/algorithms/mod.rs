//! Strategy components: two capability traits plus the explicit registry.
//!
//! - `StockAlgorithm`: per-symbol step. Receives one `Day` and the current
//!   outputs of its sub-invocations, emits an optional value.
//! - `EodAlgorithm`: per-day step. Runs once per simulated date after every
//!   symbol has been updated; reads signals and trades through `EodContext`.
//!
//! Composition (an indicator fed by another indicator) is expressed in the
//! invocation tree and wired into an arena by the pipeline, not by inheritance.

pub mod eod;
pub mod registry;
pub mod stock;

pub use registry::{AlgorithmKind, AlgorithmRegistry, EodConstructor, RegistryError, StockConstructor};

use crate::data::Day;
use crate::definition::Invocation;
use crate::params::ParamValue;
use crate::pipeline::ledger::LedgerError;
use crate::pipeline::EodContext;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors raised by algorithm construction or by a simulation step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlgorithmError {
    /// Wrong sub-invocation count or missing / mistyped parameter.
    #[error("{0}")]
    BadArguments(String),
    #[error("ledger rejected order: {0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Failed(String),
}

// ─── Capability traits ───────────────────────────────────────────────

/// Per-symbol step. One instance per (execution, symbol).
pub trait StockAlgorithm: Send {
    /// `inputs[i]` is the output of sub-invocation `i` for this same day.
    fn process(&mut self, day: &Day, inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError>;
}

/// Per-day step. One instance per execution.
pub trait EodAlgorithm: Send {
    /// Stock executions this algorithm reads. Each must be declared.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&mut self, ctx: &mut EodContext<'_>) -> Result<(), AlgorithmError>;
}

// ─── Construction settings ───────────────────────────────────────────

/// Everything a constructor sees about one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmSettings {
    pub execution: String,
    pub algorithm: String,
    pub params: Vec<(String, ParamValue)>,
    pub sub_algorithms: usize,
}

impl AlgorithmSettings {
    pub fn from_invocation(execution: &str, invocation: &Invocation) -> Self {
        Self {
            execution: execution.to_string(),
            algorithm: invocation.algorithm.clone(),
            params: invocation.params.clone(),
            sub_algorithms: invocation.children.len(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn integer(&self, name: &str) -> Result<i64, AlgorithmError> {
        match self.get(name) {
            Some(ParamValue::Integer(v)) => Ok(*v),
            Some(other) => Err(self.bad(format!("parameter {name} should be integer, got {other}"))),
            None => Err(self.bad(format!("parameter {name} is required"))),
        }
    }

    pub fn integer_or(&self, name: &str, default: i64) -> Result<i64, AlgorithmError> {
        if self.get(name).is_none() {
            return Ok(default);
        }
        self.integer(name)
    }

    /// Real parameter. Integers are accepted and widened.
    pub fn real(&self, name: &str) -> Result<f64, AlgorithmError> {
        match self.get(name) {
            Some(v) => v
                .as_f64()
                .ok_or_else(|| self.bad(format!("parameter {name} should be numeric, got {v}"))),
            None => Err(self.bad(format!("parameter {name} is required"))),
        }
    }

    pub fn real_or(&self, name: &str, default: f64) -> Result<f64, AlgorithmError> {
        if self.get(name).is_none() {
            return Ok(default);
        }
        self.real(name)
    }

    pub fn text(&self, name: &str) -> Result<String, AlgorithmError> {
        match self.get(name) {
            Some(ParamValue::Text(v)) => Ok(v.clone()),
            Some(other) => Err(self.bad(format!("parameter {name} should be text, got {other}"))),
            None => Err(self.bad(format!("parameter {name} is required"))),
        }
    }

    pub fn text_or(&self, name: &str, default: &str) -> Result<String, AlgorithmError> {
        if self.get(name).is_none() {
            return Ok(default.to_string());
        }
        self.text(name)
    }

    /// Require exactly `count` sub-invocations.
    pub fn expect_subs(&self, count: usize) -> Result<(), AlgorithmError> {
        let got = self.sub_algorithms;
        if got == count {
            return Ok(());
        }
        let algo = &self.algorithm;
        let message = match (count, got) {
            (0, _) => format!("{algo} algorithm should not receive sub algorithms"),
            (1, 0) => format!("{algo} algorithm should receive at least one sub algorithm"),
            (1, _) => format!("{algo} algorithm should receive exactly one sub algorithm"),
            _ => format!("{algo} algorithm should receive {count} sub algorithms, got {got}"),
        };
        Err(AlgorithmError::BadArguments(message))
    }

    fn bad(&self, message: String) -> AlgorithmError {
        AlgorithmError::BadArguments(format!("{}: {message}", self.algorithm))
    }
}
