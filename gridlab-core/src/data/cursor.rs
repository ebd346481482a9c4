//! Series cursor: aligns one symbol's bars to the simulation clock.
//!
//! The cursor is an explicit `{series, position}` value. Every transition
//! happens in `resolve`, and the clock handed to it must never go backwards.
//!
//! | day at cursor vs target | result | cursor |
//! |-------------------------|--------|--------|
//! | exhausted               | `None` | unchanged |
//! | equal                   | that day | moves past it |
//! | earlier (stale)         | target day if present | past the hit, or at the insertion point |
//! | later                   | `None` | unchanged |

use chrono::NaiveDate;
use std::cmp::Ordering;

use super::{Day, StockSeries};

/// The clock was driven backwards. This is a caller bug, not a data problem.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlignmentError {
    #[error("cursor for {symbol} driven backwards: {requested} after {previous}")]
    NonMonotonic {
        symbol: String,
        previous: NaiveDate,
        requested: NaiveDate,
    },
}

/// Pointer into one series, owned by a single pipeline run.
#[derive(Debug, Clone)]
pub struct SeriesCursor<'a> {
    series: &'a StockSeries,
    position: usize,
    last_target: Option<NaiveDate>,
}

impl<'a> SeriesCursor<'a> {
    /// Position the cursor at the first day on or after `start`.
    /// Starts exhausted when no such day exists.
    pub fn new(series: &'a StockSeries, start: NaiveDate) -> Self {
        Self {
            series,
            position: series.lower_bound(start),
            last_target: None,
        }
    }

    pub fn symbol(&self) -> &str {
        self.series.symbol()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.series.len()
    }

    /// Date of the next unconsumed day, if any.
    pub fn peek_date(&self) -> Option<NaiveDate> {
        self.series.days().get(self.position).map(|d| d.date)
    }

    /// Return the day for `target`, if this series has one, consuming it.
    pub fn resolve(&mut self, target: NaiveDate) -> Result<Option<&'a Day>, AlignmentError> {
        if let Some(previous) = self.last_target {
            if target < previous {
                return Err(AlignmentError::NonMonotonic {
                    symbol: self.series.symbol().to_string(),
                    previous,
                    requested: target,
                });
            }
        }
        self.last_target = Some(target);

        let days = self.series.days();
        let Some(day) = days.get(self.position) else {
            return Ok(None);
        };

        match day.date.cmp(&target) {
            Ordering::Equal => {
                self.position += 1;
                Ok(Some(day))
            }
            Ordering::Greater => Ok(None),
            Ordering::Less => {
                let tail = &days[self.position..];
                match tail.binary_search_by(|d| d.date.cmp(&target)) {
                    Ok(offset) => {
                        let hit = self.position + offset;
                        self.position = hit + 1;
                        Ok(Some(&days[hit]))
                    }
                    Err(offset) => {
                        self.position += offset;
                        Ok(None)
                    }
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
