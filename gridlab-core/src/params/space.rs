//! Parameter space: ordered axes with mixed-radix addressing.
//!
//! Convention: the **last** axis varies fastest. Global index `i` decomposes as
//! an odometer reading with the last axis as the least significant digit.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{ParamError, ParameterAssignment, ParameterAxis};

/// Ordered collection of axes. Axis order defines index semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpaceRepr", into = "SpaceRepr")]
pub struct ParameterSpace {
    axes: Vec<ParameterAxis>,
    size: u64,
}

#[derive(Serialize, Deserialize)]
struct SpaceRepr {
    axes: Vec<ParameterAxis>,
}

impl TryFrom<SpaceRepr> for ParameterSpace {
    type Error = ParamError;

    fn try_from(repr: SpaceRepr) -> Result<Self, Self::Error> {
        Self::new(repr.axes)
    }
}

impl From<ParameterSpace> for SpaceRepr {
    fn from(space: ParameterSpace) -> Self {
        Self { axes: space.axes }
    }
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self::empty()
    }
}

impl ParameterSpace {
    /// Build a space. Fails on duplicate axis names or if the product of axis
    /// sizes does not fit in a `u64`.
    pub fn new(axes: Vec<ParameterAxis>) -> Result<Self, ParamError> {
        let mut names = HashSet::new();
        let mut size: u64 = 1;
        for axis in &axes {
            if !names.insert(axis.name()) {
                return Err(ParamError::DuplicateAxis {
                    name: axis.name().to_string(),
                });
            }
            size = size
                .checked_mul(axis.size())
                .ok_or_else(|| ParamError::SpaceOverflow {
                    name: axis.name().to_string(),
                })?;
        }
        Ok(Self { axes, size })
    }

    /// Space with no axes: exactly one (empty) assignment.
    pub fn empty() -> Self {
        Self {
            axes: Vec::new(),
            size: 1,
        }
    }

    pub fn axes(&self) -> &[ParameterAxis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&ParameterAxis> {
        self.axes.iter().find(|a| a.name() == name)
    }

    /// Total number of combinations (product of axis sizes), overflow-checked
    /// at construction.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Resolve a global index. Pure: does not touch any axis cursor.
    pub fn assignment(&self, index: u64) -> Result<ParameterAssignment, ParamError> {
        if index >= self.size {
            return Err(ParamError::IndexOutOfRange {
                name: "parameter space".to_string(),
                index,
                size: self.size,
            });
        }

        let mut digits = vec![0u64; self.axes.len()];
        let mut rest = index;
        for (slot, axis) in digits.iter_mut().zip(&self.axes).rev() {
            *slot = rest % axis.size();
            rest /= axis.size();
        }

        let mut assignment = ParameterAssignment::new();
        for (axis, digit) in self.axes.iter().zip(digits) {
            assignment.push(axis.name(), axis.value_at(digit)?);
        }
        Ok(assignment)
    }

    /// Local, non-distributed enumeration driven by the axis cursors.
    ///
    /// Yields the same sequence as `assignment(0..size)`. Resets every cursor
    /// first.
    pub fn enumerate(&mut self) -> LocalEnumeration<'_> {
        for axis in &mut self.axes {
            axis.reset();
        }
        LocalEnumeration {
            space: self,
            done: false,
        }
    }
}

/// Odometer over the axis cursors of a space.
pub struct LocalEnumeration<'a> {
    space: &'a mut ParameterSpace,
    done: bool,
}

impl LocalEnumeration<'_> {
    /// Step the odometer: bump the last axis, carrying into earlier axes.
    fn increment(&mut self) {
        for axis in self.space.axes.iter_mut().rev() {
            axis.advance();
            if axis.has_next() {
                return;
            }
            axis.reset();
        }
        // every axis wrapped around
        self.done = true;
    }
}

impl Iterator for LocalEnumeration<'_> {
    type Item = ParameterAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut assignment = ParameterAssignment::new();
        for axis in &self.space.axes {
            let Some(value) = axis.current() else {
                self.done = true;
                return None;
            };
            assignment.push(axis.name(), value);
        }

        self.increment();
        Some(assignment)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
