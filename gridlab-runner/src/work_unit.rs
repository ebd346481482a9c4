//! Work units: independently resolvable slices of a parameter space.
//!
//! A unit only carries `[start_index, start_index + length)` and placement
//! hints. Resolution goes through `ParameterSpace::assignment`, which is pure,
//! so a unit resolves to the same assignments on any node and in any order.
//!
//! A `WorkPackage` bundles a unit with the space and template it slices. It
//! is the byte payload handed to another process or node.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use gridlab_core::definition::StrategyTemplate;
use gridlab_core::params::{ParamError, ParameterAssignment, ParameterSpace};

/// Placement hint for units the local coordinator runs itself.
pub const LOCAL_HINT: &str = "local";

/// Marker carried by the minimal local descriptor.
pub const LOCAL_MARKER: &str = "this";

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("descriptor marker mismatch: expected \"this\", found {found:?}")]
    BadMarker { found: String },
    #[error("unit [{start}, {end}) exceeds parameter space of size {size}")]
    OutOfSpace { start: u64, end: u64, size: u64 },
    #[error("package space does not match its template's parameter space")]
    SpaceMismatch,
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error("work package encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

// ─── Descriptor contract ─────────────────────────────────────────────

/// What an external job framework needs to schedule a unit: how much work it
/// holds, where it prefers to run, and an opaque byte form.
pub trait UnitDescriptor {
    fn length(&self) -> u64;

    fn locations(&self) -> Vec<String>;

    fn to_bytes(&self) -> Result<Vec<u8>, UnitError>;
}

/// Minimal descriptor: one item of work, placed on "this" node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalDescriptor;

impl LocalDescriptor {
    /// Decode the byte form, rejecting anything but the local marker.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnitError> {
        if bytes == LOCAL_MARKER.as_bytes() {
            Ok(Self)
        } else {
            Err(UnitError::BadMarker {
                found: String::from_utf8_lossy(bytes).into_owned(),
            })
        }
    }
}

impl UnitDescriptor for LocalDescriptor {
    fn length(&self) -> u64 {
        1
    }

    fn locations(&self) -> Vec<String> {
        vec![LOCAL_MARKER.to_string()]
    }

    fn to_bytes(&self) -> Result<Vec<u8>, UnitError> {
        Ok(LOCAL_MARKER.as_bytes().to_vec())
    }
}

// ─── Work unit ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnit {
    start_index: u64,
    length: u64,
    locations: Vec<String>,
}

impl WorkUnit {
    pub fn new(start_index: u64, length: u64, locations: Vec<String>) -> Self {
        Self {
            start_index,
            length,
            locations,
        }
    }

    /// A unit placed on the local node.
    pub fn local(start_index: u64, length: u64) -> Self {
        Self::new(start_index, length, vec![LOCAL_HINT.to_string()])
    }

    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    /// One past the last global index.
    pub fn end(&self) -> u64 {
        self.start_index.saturating_add(self.length)
    }

    pub fn indices(&self) -> Range<u64> {
        self.start_index..self.end()
    }

    pub fn contains(&self, index: u64) -> bool {
        self.indices().contains(&index)
    }

    /// Fail unless the whole unit lies inside `space`.
    pub fn check_bounds(&self, space: &ParameterSpace) -> Result<(), UnitError> {
        let end = self.start_index.checked_add(self.length);
        match end {
            Some(end) if end <= space.size() => Ok(()),
            _ => Err(UnitError::OutOfSpace {
                start: self.start_index,
                end: self.end(),
                size: space.size(),
            }),
        }
    }

    /// Lazily resolve every index of the unit, in ascending order.
    pub fn resolve<'s>(
        &self,
        space: &'s ParameterSpace,
    ) -> impl Iterator<Item = Result<(u64, ParameterAssignment), ParamError>> + 's {
        self.indices()
            .map(move |index| space.assignment(index).map(|a| (index, a)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnitError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl UnitDescriptor for WorkUnit {
    fn length(&self) -> u64 {
        self.length
    }

    fn locations(&self) -> Vec<String> {
        self.locations.clone()
    }

    fn to_bytes(&self) -> Result<Vec<u8>, UnitError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ─── Work package ────────────────────────────────────────────────────

/// Everything a node needs to evaluate one unit, with no reference to the
/// coordinator that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPackage {
    pub space: ParameterSpace,
    pub template: StrategyTemplate,
    pub unit: WorkUnit,
}

impl WorkPackage {
    /// Bundle a unit with its template; the space is derived from the template.
    pub fn new(template: StrategyTemplate, unit: WorkUnit) -> Result<Self, UnitError> {
        let space = template.parameter_space()?;
        unit.check_bounds(&space)?;
        Ok(Self { space, template, unit })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, UnitError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and check the package is internally consistent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, UnitError> {
        let package: Self = serde_json::from_slice(bytes)?;
        if package.template.parameter_space()? != package.space {
            return Err(UnitError::SpaceMismatch);
        }
        package.unit.check_bounds(&package.space)?;
        Ok(package)
    }

    pub fn resolve(&self) -> impl Iterator<Item = Result<(u64, ParameterAssignment), ParamError>> + '_ {
        self.unit.resolve(&self.space)
    }
}

impl UnitDescriptor for WorkPackage {
    fn length(&self) -> u64 {
        self.unit.length
    }

    fn locations(&self) -> Vec<String> {
        self.unit.locations()
    }

    fn to_bytes(&self) -> Result<Vec<u8>, UnitError> {
        WorkPackage::to_bytes(self)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gridlab_core::definition::parse_template;

    fn template() -> StrategyTemplate {
        parse_template(
            "StockExecutions = s\n\
             s.loadLine = Sma(n = [2i:6i:1i], Input(e = [open|close]))",
        )
        .unwrap()
    }

    #[test]
    fn local_descriptor_contract() {
        let d = LocalDescriptor;
        assert_eq!(d.length(), 1);
        assert_eq!(d.locations(), vec!["this".to_string()]);
        let bytes = d.to_bytes().unwrap();
        assert_eq!(LocalDescriptor::from_bytes(&bytes).unwrap(), d);
    }

    #[test]
    fn local_descriptor_rejects_foreign_marker() {
        let err = LocalDescriptor::from_bytes(b"that").unwrap_err();
        assert!(matches!(err, UnitError::BadMarker { ref found } if found == "that"));
    }

    #[test]
    fn unit_resolves_its_own_slice() {
        let space = template().parameter_space().unwrap();
        assert_eq!(space.size(), 8);

        let unit = WorkUnit::local(3, 4);
        let resolved: Vec<_> = unit.resolve(&space).map(|r| r.unwrap()).collect();
        let indices: Vec<u64> = resolved.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![3, 4, 5, 6]);
        for (i, a) in resolved {
            assert_eq!(a, space.assignment(i).unwrap());
        }
    }

    #[test]
    fn unit_past_the_end_is_rejected() {
        let err = WorkPackage::new(template(), WorkUnit::local(6, 3)).unwrap_err();
        assert!(matches!(err, UnitError::OutOfSpace { start: 6, end: 9, size: 8 }));
    }

    #[test]
    fn unit_bytes_round_trip() {
        let unit = WorkUnit::new(10, 5, vec!["node-a".into(), "node-b".into()]);
        let back = WorkUnit::from_bytes(&unit.to_bytes().unwrap()).unwrap();
        assert_eq!(back, unit);
        assert_eq!(back.locations(), vec!["node-a", "node-b"]);
    }

    #[test]
    fn tampered_package_space_is_rejected() {
        let mut package = WorkPackage::new(template(), WorkUnit::local(0, 2)).unwrap();
        package.space = ParameterSpace::empty();
        let bytes = package.to_bytes().unwrap();
        assert!(matches!(
            WorkPackage::from_bytes(&bytes),
            Err(UnitError::SpaceMismatch)
        ));
    }
}
