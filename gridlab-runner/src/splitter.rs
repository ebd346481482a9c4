//! Work splitter: tiles `[0, size)` of a parameter space into contiguous units.

use gridlab_core::params::ParameterSpace;

use crate::work_unit::WorkUnit;

const PREALLOC_LIMIT: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("split hint must be positive, got {0:?}")]
    ZeroHint(SplitHint),
}

/// How finely to split a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitHint {
    /// Target number of units. Clamped to the space size.
    Units(u64),
    /// Upper bound on the indices per unit.
    MaxUnitSize(u64),
}

/// Split `space` into units whose ranges tile `[0, space.size())` with no gaps
/// or overlaps. Unit sizes differ by at most one.
pub fn split(space: &ParameterSpace, hint: SplitHint) -> Result<Vec<WorkUnit>, SplitError> {
    split_range(space.size(), hint)
}

/// Split a bare index range of `total` combinations.
pub fn split_range(total: u64, hint: SplitHint) -> Result<Vec<WorkUnit>, SplitError> {
    let count = match hint {
        SplitHint::Units(0) | SplitHint::MaxUnitSize(0) => return Err(SplitError::ZeroHint(hint)),
        SplitHint::Units(n) => n.min(total),
        SplitHint::MaxUnitSize(max) => total.div_ceil(max),
    };
    if count == 0 {
        return Ok(Vec::new());
    }

    // the first `extra` units take one index more than the rest
    let base = total / count;
    let extra = total % count;
    // `count` can reach the space size, so the vector grows as it fills
    let mut units = Vec::with_capacity(count.min(PREALLOC_LIMIT) as usize);
    let mut start = 0;
    for i in 0..count {
        let length = base + u64::from(i < extra);
        units.push(WorkUnit::local(start, length));
        start += length;
    }
    Ok(units)
}

/// The whole space as one local unit.
pub fn single_unit(space: &ParameterSpace) -> WorkUnit {
    WorkUnit::local(0, space.size())
}
