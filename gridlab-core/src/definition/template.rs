//! Strategy templates: definitions with tunable holes.
//!
//! Axis naming:
//! - a tunable parameter `p` of execution `e` becomes axis `e.p`;
//! - a sub-invocation at index `i` that contains tunables becomes a nested
//!   axis `e#i` whose sub-space uses the same rules without the `e` prefix
//!   (`p` for its own parameters, `#j` for its children).
//!
//! Resolution walks the same tree in the same order, so every assignment of
//! `parameter_space()` resolves to exactly one `ExecutionDefinition`.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ConfigError, Execution, ExecutionDefinition, Invocation};
use crate::params::{AxisKind, ParamError, ParamValue, ParameterAssignment, ParameterAxis, ParameterSpace};

/// A parameter slot: concrete, or an axis to sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateValue {
    Fixed(ParamValue),
    Tunable(AxisKind),
}

impl fmt::Display for TemplateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "{v}"),
            Self::Tunable(AxisKind::IntegerRange { from, to, step }) => {
                write!(f, "[{from}i:{to}i:{step}i]")
            }
            Self::Tunable(AxisKind::RealRange { from, to, step }) => {
                write!(f, "[{from}d:{to}d:{step}d]")
            }
            Self::Tunable(AxisKind::DiscreteSet { values }) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join("|"))
            }
            Self::Tunable(AxisKind::NestedSpace { .. }) => write!(f, "[..]"),
        }
    }
}

// ─── Invocation template ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationTemplate {
    pub algorithm: String,
    pub params: Vec<(String, TemplateValue)>,
    pub children: Vec<InvocationTemplate>,
}

impl InvocationTemplate {
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            params: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn fixed(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.push((name.into(), TemplateValue::Fixed(value)));
        self
    }

    pub fn tunable(mut self, name: impl Into<String>, kind: AxisKind) -> Self {
        self.params.push((name.into(), TemplateValue::Tunable(kind)));
        self
    }

    pub fn with_child(mut self, child: InvocationTemplate) -> Self {
        self.children.push(child);
        self
    }

    /// True if this node or any descendant has a tunable slot.
    pub fn has_tunables(&self) -> bool {
        self.params
            .iter()
            .any(|(_, v)| matches!(v, TemplateValue::Tunable(_)))
            || self.children.iter().any(Self::has_tunables)
    }

    fn axes(&self, scope: Option<&str>) -> Result<Vec<ParameterAxis>, ParamError> {
        let mut axes = Vec::new();
        for (name, value) in &self.params {
            if let TemplateValue::Tunable(kind) = value {
                axes.push(ParameterAxis::new(param_axis(scope, name), kind.clone())?);
            }
        }
        for (i, child) in self.children.iter().enumerate() {
            if child.has_tunables() {
                let space = ParameterSpace::new(child.axes(None)?)?;
                axes.push(ParameterAxis::nested(child_axis(scope, i), space)?);
            }
        }
        Ok(axes)
    }

    fn resolve(
        &self,
        scope: Option<&str>,
        execution: &str,
        assignment: &ParameterAssignment,
    ) -> Result<Invocation, ConfigError> {
        let unresolved = |axis: String| ConfigError::Unresolved {
            execution: execution.to_string(),
            axis,
        };

        let mut params = Vec::with_capacity(self.params.len());
        for (name, value) in &self.params {
            let concrete = match value {
                TemplateValue::Fixed(v) => v.clone(),
                TemplateValue::Tunable(_) => {
                    let axis = param_axis(scope, name);
                    assignment.get(&axis).cloned().ok_or_else(|| unresolved(axis))?
                }
            };
            params.push((name.clone(), concrete));
        }

        let empty = ParameterAssignment::new();
        let mut children = Vec::with_capacity(self.children.len());
        for (i, child) in self.children.iter().enumerate() {
            let sub = if child.has_tunables() {
                let axis = child_axis(scope, i);
                assignment
                    .get(&axis)
                    .and_then(ParamValue::as_nested)
                    .ok_or_else(|| unresolved(axis))?
            } else {
                &empty
            };
            children.push(child.resolve(None, execution, sub)?);
        }

        Ok(Invocation {
            algorithm: self.algorithm.clone(),
            params,
            children,
        })
    }
}

fn param_axis(scope: Option<&str>, name: &str) -> String {
    match scope {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

fn child_axis(scope: Option<&str>, index: usize) -> String {
    format!("{}#{index}", scope.unwrap_or(""))
}

impl fmt::Display for InvocationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.algorithm)?;
        let params = self.params.iter().map(|(n, v)| format!("{n} = {v}"));
        let children = self.children.iter().map(|c| c.to_string());
        let args: Vec<String> = params.chain(children).collect();
        write!(f, "{})", args.join(", "))
    }
}

// ─── Strategy template ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTemplate {
    pub name: String,
    pub invocation: InvocationTemplate,
}

impl ExecutionTemplate {
    pub fn new(name: impl Into<String>, invocation: InvocationTemplate) -> Self {
        Self {
            name: name.into(),
            invocation,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyTemplate {
    pub stock_executions: Vec<ExecutionTemplate>,
    pub eod_executions: Vec<ExecutionTemplate>,
}

impl StrategyTemplate {
    fn executions(&self) -> impl Iterator<Item = &ExecutionTemplate> {
        self.stock_executions.iter().chain(&self.eod_executions)
    }

    /// Every tunable slot as an axis, stock executions first, in declaration
    /// order. A template without tunables has the empty space (size 1).
    pub fn parameter_space(&self) -> Result<ParameterSpace, ParamError> {
        let mut axes = Vec::new();
        for e in self.executions() {
            axes.extend(e.invocation.axes(Some(&e.name))?);
        }
        ParameterSpace::new(axes)
    }

    /// Fill every tunable slot from `assignment`.
    pub fn resolve(&self, assignment: &ParameterAssignment) -> Result<ExecutionDefinition, ConfigError> {
        let resolve_all = |list: &[ExecutionTemplate]| {
            list.iter()
                .map(|e| -> Result<Execution, ConfigError> {
                    let invocation = e.invocation.resolve(Some(&e.name), &e.name, assignment)?;
                    Ok(Execution::new(e.name.clone(), invocation))
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let definition = ExecutionDefinition {
            stock_executions: resolve_all(&self.stock_executions)?,
            eod_executions: resolve_all(&self.eod_executions)?,
        };
        definition.validate_names()?;
        Ok(definition)
    }

    pub fn has_tunables(&self) -> bool {
        self.executions().any(|e| e.invocation.has_tunables())
    }
}

impl fmt::Display for StrategyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |list: &[ExecutionTemplate]| {
            list.iter().map(|e| e.name.as_str()).collect::<Vec<_>>().join(", ")
        };
        writeln!(f, "StockExecutions = {}", names(&self.stock_executions))?;
        writeln!(f, "EodExecutions = {}", names(&self.eod_executions))?;
        for e in self.executions() {
            writeln!(f, "{}.loadLine = {}", e.name, e.invocation)?;
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
