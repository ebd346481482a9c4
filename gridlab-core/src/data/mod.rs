//! Market data: daily bars, per-symbol series, read-only storage, and the
//! binary-search cursor that aligns a series to the simulation clock.

pub mod cursor;
pub mod day;
pub mod series;
pub mod storage;

pub use cursor::{AlignmentError, SeriesCursor};
pub use day::Day;
pub use series::{DataError, StockSeries};
pub use storage::{InMemoryStorage, StockStorage};

/// Build a series of consecutive-calendar-day bars from close prices.
#[cfg(test)]
pub fn make_series(symbol: &str, closes: &[f64]) -> StockSeries {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let days = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Day::new(base + chrono::Duration::days(i as i64), close))
        .collect();
    StockSeries::new(symbol, days).unwrap()
}
