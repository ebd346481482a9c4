//! Parameter axis: one tunable dimension with a local cursor.
//!
//! Bounds are immutable once built. The cursor (`position`) is local state used
//! only by the non-distributed enumeration fallback; `value_at` never looks at it.

use serde::{Deserialize, Serialize};

use super::{ParamError, ParamValue, ParameterSpace};

/// Slack applied when flooring real-range sizes, so `(0.5 - 0.1) / 0.1`
/// counts as 4 steps rather than 3.99999.
const REAL_SIZE_EPSILON: f64 = 1e-9;

/// The shape of an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxisKind {
    /// `from, from+step, ...` while below `to`; size is ⌊(to−from)/step⌋.
    IntegerRange { from: i64, to: i64, step: i64 },
    /// Same shape as `IntegerRange` over f64.
    RealRange { from: f64, to: f64, step: f64 },
    /// Explicit list of values.
    DiscreteSet { values: Vec<ParamValue> },
    /// A whole sub-space; each value is one of its assignments.
    NestedSpace { space: ParameterSpace },
}

impl AxisKind {
    /// Validate bounds and return the number of representable values.
    fn checked_size(&self, name: &str) -> Result<u64, ParamError> {
        let size = match self {
            Self::IntegerRange { from, to, step } => {
                if from >= to {
                    return Err(ParamError::InvalidBounds {
                        name: name.to_string(),
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                if *step <= 0 {
                    return Err(ParamError::NonPositiveStep {
                        name: name.to_string(),
                    });
                }
                let span = i128::from(*to) - i128::from(*from);
                u64::try_from(span / i128::from(*step)).map_err(|_| ParamError::SpaceOverflow {
                    name: name.to_string(),
                })?
            }
            Self::RealRange { from, to, step } => {
                if !from.is_finite() || !to.is_finite() || !step.is_finite() {
                    return Err(ParamError::NonFinite {
                        name: name.to_string(),
                    });
                }
                if from >= to {
                    return Err(ParamError::InvalidBounds {
                        name: name.to_string(),
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
                if *step <= 0.0 {
                    return Err(ParamError::NonPositiveStep {
                        name: name.to_string(),
                    });
                }
                let steps = ((to - from) / step + REAL_SIZE_EPSILON).floor();
                if steps >= u64::MAX as f64 {
                    return Err(ParamError::SpaceOverflow {
                        name: name.to_string(),
                    });
                }
                steps as u64
            }
            Self::DiscreteSet { values } => values.len() as u64,
            Self::NestedSpace { space } => space.size(),
        };

        if size == 0 {
            return Err(ParamError::EmptyAxis {
                name: name.to_string(),
            });
        }
        Ok(size)
    }
}

/// One tunable dimension of a parameter space.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "AxisRepr", into = "AxisRepr")]
pub struct ParameterAxis {
    name: String,
    kind: AxisKind,
    size: u64,
    position: u64,
}

#[derive(Serialize, Deserialize)]
struct AxisRepr {
    name: String,
    #[serde(flatten)]
    kind: AxisKind,
}

impl TryFrom<AxisRepr> for ParameterAxis {
    type Error = ParamError;

    fn try_from(repr: AxisRepr) -> Result<Self, Self::Error> {
        Self::new(repr.name, repr.kind)
    }
}

impl From<ParameterAxis> for AxisRepr {
    fn from(axis: ParameterAxis) -> Self {
        Self {
            name: axis.name,
            kind: axis.kind,
        }
    }
}

impl ParameterAxis {
    /// Build an axis, validating its bounds.
    pub fn new(name: impl Into<String>, kind: AxisKind) -> Result<Self, ParamError> {
        let name = name.into();
        let size = kind.checked_size(&name)?;
        Ok(Self {
            name,
            kind,
            size,
            position: 0,
        })
    }

    pub fn integer(name: impl Into<String>, from: i64, to: i64, step: i64) -> Result<Self, ParamError> {
        Self::new(name, AxisKind::IntegerRange { from, to, step })
    }

    pub fn real(name: impl Into<String>, from: f64, to: f64, step: f64) -> Result<Self, ParamError> {
        Self::new(name, AxisKind::RealRange { from, to, step })
    }

    pub fn discrete(name: impl Into<String>, values: Vec<ParamValue>) -> Result<Self, ParamError> {
        Self::new(name, AxisKind::DiscreteSet { values })
    }

    pub fn nested(name: impl Into<String>, space: ParameterSpace) -> Result<Self, ParamError> {
        Self::new(name, AxisKind::NestedSpace { space })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AxisKind {
        &self.kind
    }

    /// Number of representable values. Always at least 1.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Value at `index`, independent of the cursor.
    pub fn value_at(&self, index: u64) -> Result<ParamValue, ParamError> {
        if index >= self.size {
            return Err(ParamError::IndexOutOfRange {
                name: self.name.clone(),
                index,
                size: self.size,
            });
        }
        let value = match &self.kind {
            // index < size keeps the result below `to`, so it fits in i64
            AxisKind::IntegerRange { from, step, .. } => {
                let v = i128::from(*from) + i128::from(index) * i128::from(*step);
                ParamValue::Integer(v as i64)
            }
            AxisKind::RealRange { from, step, .. } => ParamValue::Real(from + index as f64 * step),
            AxisKind::DiscreteSet { values } => values[index as usize].clone(),
            AxisKind::NestedSpace { space } => ParamValue::Nested(space.assignment(index)?),
        };
        Ok(value)
    }

    // ── Cursor ───────────────────────────────────────────────────────

    /// Rewind the cursor to the first value.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Move the cursor one value forward. Saturates at `size()` (exhausted).
    pub fn advance(&mut self) {
        if self.position < self.size {
            self.position += 1;
        }
    }

    /// Value under the cursor, or `None` once exhausted.
    pub fn current(&self) -> Option<ParamValue> {
        self.value_at(self.position).ok()
    }

    /// True while the cursor points at a representable value.
    pub fn has_next(&self) -> bool {
        self.position < self.size
    }

    /// Return the value under the cursor and advance past it.
    pub fn next_value(&mut self) -> Option<ParamValue> {
        let value = self.current()?;
        self.advance();
        Some(value)
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Cloning copies the bounds and starts a fresh cursor.
impl Clone for ParameterAxis {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            size: self.size,
            position: 0,
        }
    }
}

/// Equality is structural; cursor position is ignored.
impl PartialEq for ParameterAxis {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_size_is_floor_of_span_over_step() {
        assert_eq!(ParameterAxis::integer("n", 0, 10, 1).unwrap().size(), 10);
        assert_eq!(ParameterAxis::integer("n", 5, 20, 5).unwrap().size(), 3);
        assert_eq!(ParameterAxis::integer("n", 0, 10, 3).unwrap().size(), 3);
        assert_eq!(ParameterAxis::integer("n", -4, 4, 2).unwrap().size(), 4);
    }

    #[test]
    fn integer_value_at() {
        let axis = ParameterAxis::integer("n", 5, 20, 5).unwrap();
        assert_eq!(axis.value_at(0).unwrap(), ParamValue::Integer(5));
        assert_eq!(axis.value_at(2).unwrap(), ParamValue::Integer(15));
        assert!(matches!(
            axis.value_at(3),
            Err(ParamError::IndexOutOfRange { index: 3, size: 3, .. })
        ));
    }

    #[test]
    fn from_not_below_to_is_rejected() {
        assert!(matches!(
            ParameterAxis::integer("n", 10, 10, 1),
            Err(ParamError::InvalidBounds { .. })
        ));
        assert!(matches!(
            ParameterAxis::integer("n", 11, 10, 1),
            Err(ParamError::InvalidBounds { .. })
        ));
        assert!(matches!(
            ParameterAxis::real("k", 1.0, 0.5, 0.1),
            Err(ParamError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn step_larger_than_span_is_empty() {
        assert!(matches!(
            ParameterAxis::integer("n", 0, 5, 10),
            Err(ParamError::EmptyAxis { .. })
        ));
    }

    #[test]
    fn non_positive_step_is_rejected() {
        assert!(matches!(
            ParameterAxis::integer("n", 0, 5, 0),
            Err(ParamError::NonPositiveStep { .. })
        ));
        assert!(matches!(
            ParameterAxis::real("k", 0.0, 1.0, -0.1),
            Err(ParamError::NonPositiveStep { .. })
        ));
    }

    #[test]
    fn extreme_integer_bounds_do_not_overflow() {
        let axis = ParameterAxis::integer("n", i64::MIN, i64::MAX, 1).unwrap();
        assert_eq!(axis.size(), u64::MAX);
        assert_eq!(axis.value_at(0).unwrap(), ParamValue::Integer(i64::MIN));
    }

    #[test]
    fn real_size_tolerates_representation_error() {
        let axis = ParameterAxis::real("k", 0.1, 0.5, 0.1).unwrap();
        assert_eq!(axis.size(), 4);
        let last = axis.value_at(3).unwrap().as_f64().unwrap();
        assert!((last - 0.4).abs() < 1e-12);
    }

    #[test]
    fn real_rejects_nan() {
        assert!(matches!(
            ParameterAxis::real("k", f64::NAN, 1.0, 0.1),
            Err(ParamError::NonFinite { .. })
        ));
    }

    #[test]
    fn discrete_set() {
        let axis = ParameterAxis::discrete(
            "e",
            vec![ParamValue::Text("open".into()), ParamValue::Text("close".into())],
        )
        .unwrap();
        assert_eq!(axis.size(), 2);
        assert_eq!(axis.value_at(1).unwrap(), ParamValue::Text("close".into()));
        assert!(matches!(
            ParameterAxis::discrete("e", vec![]),
            Err(ParamError::EmptyAxis { .. })
        ));
    }

    #[test]
    fn cursor_walks_every_value_once() {
        let mut axis = ParameterAxis::integer("n", 0, 10, 2).unwrap();
        let mut seen = Vec::new();
        while axis.has_next() {
            seen.push(axis.next_value().unwrap().as_i64().unwrap());
        }
        assert_eq!(seen, vec![0, 2, 4, 6, 8]);
        assert!(axis.current().is_none());

        axis.advance();
        assert_eq!(axis.position(), 5, "advance saturates when exhausted");

        axis.reset();
        assert_eq!(axis.current(), Some(ParamValue::Integer(0)));
    }

    #[test]
    fn clone_resets_cursor_and_keeps_bounds() {
        let mut axis = ParameterAxis::integer("n", 0, 10, 1).unwrap();
        axis.advance();
        axis.advance();
        let copy = axis.clone();
        assert_eq!(copy.position(), 0);
        assert_eq!(copy.kind(), axis.kind());
        assert_eq!(axis.position(), 2, "source cursor untouched");
    }

    #[test]
    fn serde_revalidates_bounds() {
        let axis = ParameterAxis::integer("n", 1, 4, 1).unwrap();
        let json = serde_json::to_string(&axis).unwrap();
        let back: ParameterAxis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, axis);

        let bad = r#"{"name":"n","kind":"integer_range","from":4,"to":1,"step":1}"#;
        assert!(serde_json::from_str::<ParameterAxis>(bad).is_err());
    }
}
