//! GridLab Core: parameter spaces, market data, algorithms, and the execution pipeline.
//!
//! This crate contains everything needed to evaluate one strategy combination:
//! - Parameter axes and spaces with pure index → assignment resolution
//! - Daily bars, read-only storage, and the clock-aligning series cursor
//! - Per-symbol and end-of-day algorithm traits plus the explicit registry
//! - Strategy templates, their text format, and resolution to definitions
//! - The pipeline state machine, arena-wired algorithm chains, and ledger
//! - Statistics and cost functions that score a finished run

pub mod algorithms;
pub mod cost;
pub mod data;
pub mod definition;
pub mod params;
pub mod pipeline;
pub mod statistics;
