//! StockSeries: ascending, date-unique bars for one symbol.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Day;

/// Errors raised while building a series.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("series {symbol}: dates not ascending at {date}")]
    NotAscending { symbol: String, date: NaiveDate },
    #[error("series {symbol}: duplicate date {date}")]
    DuplicateDate { symbol: String, date: NaiveDate },
}

/// Chronological bars for one symbol. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSeries {
    symbol: String,
    days: Vec<Day>,
}

impl StockSeries {
    /// Build a series, rejecting out-of-order or repeated dates.
    pub fn new(symbol: impl Into<String>, days: Vec<Day>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        for pair in days.windows(2) {
            if pair[1].date == pair[0].date {
                return Err(DataError::DuplicateDate {
                    symbol,
                    date: pair[1].date,
                });
            }
            if pair[1].date < pair[0].date {
                return Err(DataError::NotAscending {
                    symbol,
                    date: pair[1].date,
                });
            }
        }
        Ok(Self { symbol, days })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Index of the first day with `date >= target` (may equal `len()`).
    pub fn lower_bound(&self, target: NaiveDate) -> usize {
        self.days.partition_point(|d| d.date < target)
    }

    /// Dates within `[from, to]`.
    pub fn dates_between(&self, from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        let start = self.lower_bound(from);
        self.days[start..]
            .iter()
            .map(|d| d.date)
            .take_while(move |d| *d <= to)
    }
}
