//! Tunable parameters: axes, composite spaces, and resolved assignments.
//!
//! A `ParameterSpace` is an ordered list of `ParameterAxis` values. Every global
//! index in `[0, size)` maps to exactly one `ParameterAssignment` through
//! mixed-radix decomposition (last axis varies fastest). Index resolution is
//! pure, which is what lets a sweep be split into independently resolvable
//! work units.

pub mod axis;
pub mod space;

pub use axis::{AxisKind, ParameterAxis};
pub use space::{LocalEnumeration, ParameterSpace};

use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Error type ──────────────────────────────────────────────────────

/// Errors raised while building or indexing a parameter space.
///
/// Any of these aborts sweep construction: no partially valid space is usable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("from should be smaller than to for {name} (from {from}, to {to})")]
    InvalidBounds {
        name: String,
        from: String,
        to: String,
    },
    #[error("step must be positive for {name}")]
    NonPositiveStep { name: String },
    #[error("bounds and step must be finite for {name}")]
    NonFinite { name: String },
    #[error("axis {name} has no values")]
    EmptyAxis { name: String },
    #[error("duplicate axis name: {name}")]
    DuplicateAxis { name: String },
    #[error("parameter space size overflows at axis {name}")]
    SpaceOverflow { name: String },
    #[error("index {index} out of range for {name} (size {size})")]
    IndexOutOfRange { name: String, index: u64, size: u64 },
}

// ─── Values ──────────────────────────────────────────────────────────

/// A single resolved parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// Value drawn from a nested sub-space: the sub-space's own assignment.
    Nested(ParameterAssignment),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view. Integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&ParameterAssignment> {
        match self {
            Self::Nested(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}i"),
            Self::Real(v) => write!(f, "{v}d"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Nested(v) => write!(f, "({v})"),
        }
    }
}

// ─── Assignment ──────────────────────────────────────────────────────

/// Resolved value per axis for one global index.
///
/// Order follows the axis order of the space that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterAssignment {
    values: Vec<(String, ParamValue)>,
}

impl ParameterAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for ParameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}
