//! GridLab Runner: sweep orchestration on top of `gridlab-core`.
//!
//! - Work units and self-describing work packages
//! - Splitting a parameter space into contiguous units
//! - TOML sweep configuration
//! - CSV market data loading
//! - Top-K leaderboard
//! - The coordinator: dispatch, timeouts, cancellation, failure collection

pub mod config;
pub mod coordinator;
pub mod data_loader;
pub mod leaderboard;
pub mod splitter;
pub mod work_unit;

pub use config::{CostConfig, SweepConfig, SweepConfigError, MAX_UNITS};
pub use coordinator::{
    evaluate_package, evaluate_unit, Coordinator, Evaluator, FailureReason, IndexOutcome,
    SweepError, SweepOutcome, SweepProgress, UnitControl, UnitFailure, UnitReport,
};
pub use data_loader::{load_dir, load_series, LoadError};
pub use leaderboard::{InsertResult, Leaderboard, RankedEntry};
pub use splitter::{single_unit, split, split_range, SplitError, SplitHint};
pub use work_unit::{
    LocalDescriptor, UnitDescriptor, UnitError, WorkPackage, WorkUnit, LOCAL_HINT, LOCAL_MARKER,
};
