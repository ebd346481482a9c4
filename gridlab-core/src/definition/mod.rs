//! Strategy definitions: resolved invocation trees and tunable templates.
//!
//! A `StrategyTemplate` may contain tunable values; it exposes the matching
//! `ParameterSpace` and resolves any assignment of that space into a concrete
//! `ExecutionDefinition`. Definitions are pure data: they name algorithms,
//! they never hold instances.

pub mod parser;
pub mod template;

pub use parser::{parse_definition, parse_template};
pub use template::{ExecutionTemplate, InvocationTemplate, StrategyTemplate, TemplateValue};

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::params::{ParamError, ParamValue};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Stock,
    Eod,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock => write!(f, "stock"),
            Self::Eod => write!(f, "eod"),
        }
    }
}

/// Errors raised while reading, resolving, or instantiating a definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("algorithm {name} already registered")]
    DuplicateExecution { name: String },
    #[error("bad {kind} execution registration, no {name}.loadLine property")]
    MissingLoadLine { kind: ExecutionKind, name: String },
    #[error("bad algorithm load line: {line}")]
    BadLoadLine { line: String },
    #[error("bad definition line {line_no}: {line}")]
    BadLine { line_no: usize, line: String },
    #[error("algorithm {algorithm} is not registered (execution {execution})")]
    Unregistered { algorithm: String, execution: String },
    #[error("Exception while loading algo: {algorithm}( {execution} ) , exception: {reason}")]
    AlgorithmLoad {
        algorithm: String,
        execution: String,
        reason: String,
    },
    #[error("execution {execution} reads {dependency}, which is not a declared stock execution")]
    UnknownDependency { execution: String, dependency: String },
    #[error("no value for tunable {axis} in execution {execution}")]
    Unresolved { execution: String, axis: String },
    #[error(transparent)]
    Space(#[from] ParamError),
}

// ─── Resolved tree ───────────────────────────────────────────────────

/// One algorithm with its concrete parameters and sub-invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub algorithm: String,
    pub params: Vec<(String, ParamValue)>,
    pub children: Vec<Invocation>,
}

impl Invocation {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    pub fn with_child(mut self, child: Invocation) -> Self {
        self.children.push(child);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Renders in load-line syntax: `Sma(n = 5i, Input(e = close))`.
impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.algorithm)?;
        let params = self.params.iter().map(|(n, v)| format!("{n} = {v}"));
        let children = self.children.iter().map(|c| c.to_string());
        let args: Vec<String> = params.chain(children).collect();
        write!(f, "{})", args.join(", "))
    }
}

/// A named invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub name: String,
    pub invocation: Invocation,
}

impl Execution {
    pub fn new(name: impl Into<String>, invocation: Invocation) -> Self {
        Self {
            name: name.into(),
            invocation,
        }
    }
}

/// Concrete strategy: per-symbol executions and end-of-day executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDefinition {
    pub stock_executions: Vec<Execution>,
    pub eod_executions: Vec<Execution>,
}

impl ExecutionDefinition {
    /// Execution names must be unique across both lists.
    pub fn validate_names(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for e in self.stock_executions.iter().chain(&self.eod_executions) {
            if !seen.insert(e.name.as_str()) {
                return Err(ConfigError::DuplicateExecution {
                    name: e.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Stable hash of the rendered definition. Equal definitions hash equal.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(self.to_string().as_bytes());
        hash.to_hex()[..16].to_string()
    }
}

/// Renders in the text definition format understood by `parse_definition`.
impl fmt::Display for ExecutionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |list: &[Execution]| list.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(", ");
        writeln!(f, "StockExecutions = {}", names(&self.stock_executions))?;
        writeln!(f, "EodExecutions = {}", names(&self.eod_executions))?;
        for e in self.stock_executions.iter().chain(&self.eod_executions) {
            writeln!(f, "{}.loadLine = {}", e.name, e.invocation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExecutionDefinition {
        ExecutionDefinition {
            stock_executions: vec![Execution::new(
                "fast",
                Invocation::new("Sma")
                    .with_param("n", ParamValue::Integer(5))
                    .with_child(Invocation::new("Input").with_param("e", ParamValue::Text("close".into()))),
            )],
            eod_executions: vec![Execution::new(
                "trader",
                Invocation::new("ThresholdTrader").with_param("signal", ParamValue::Text("fast".into())),
            )],
        }
    }

    #[test]
    fn invocation_renders_as_load_line() {
        let def = sample();
        assert_eq!(
            def.stock_executions[0].invocation.to_string(),
            "Sma(n = 5i, Input(e = close))"
        );
    }

    #[test]
    fn fingerprint_is_stable_and_discriminating() {
        let a = sample();
        let b = sample();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);

        let mut c = sample();
        c.stock_executions[0].invocation.params[0].1 = ParamValue::Integer(6);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_hashes_the_rendered_text() {
        let def = sample();
        let expected = blake3::hash(def.to_string().as_bytes()).to_hex()[..16].to_string();
        assert_eq!(def.fingerprint(), expected);
        assert_eq!(parse_definition(&def.to_string()).unwrap().fingerprint(), expected);
    }

    #[test]
    fn duplicate_execution_names_rejected() {
        let mut def = sample();
        def.eod_executions[0].name = "fast".into();
        assert_eq!(
            def.validate_names().unwrap_err().to_string(),
            "algorithm fast already registered"
        );
    }

    #[test]
    fn rendered_definition_parses_back() {
        let def = sample();
        assert_eq!(parse_definition(&def.to_string()).unwrap(), def);
    }
}
