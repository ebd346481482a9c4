//! Day: one symbol's bar for a single trading date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Daily OHLCV bar. Ordering and equality of series positions use `date` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Day {
    /// Field names accepted by `field`.
    pub const FIELDS: [&'static str; 5] = ["open", "high", "low", "close", "volume"];

    /// Flat bar where every price equals `close`. Handy for fixtures.
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    /// Compare by trading date.
    pub fn cmp_date(&self, other: &Day) -> Ordering {
        self.date.cmp(&other.date)
    }

    /// Named price field lookup, as used by `Input(e = ...)`.
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => None,
        }
    }
}
