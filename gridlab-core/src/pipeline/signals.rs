//! Signal store and the per-day view handed to end-of-day algorithms.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::ledger::{Ledger, Position, Side};
use crate::algorithms::AlgorithmError;

/// Latest output of each (stock execution, symbol) pair.
#[derive(Debug, Clone, Default)]
pub struct SignalStore {
    latest: HashMap<String, HashMap<String, (NaiveDate, f64)>>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, execution: &str, symbol: &str, date: NaiveDate, value: f64) {
        self.latest
            .entry(execution.to_string())
            .or_default()
            .insert(symbol.to_string(), (date, value));
    }

    /// Most recent value, whatever its date.
    pub fn latest(&self, execution: &str, symbol: &str) -> Option<(NaiveDate, f64)> {
        self.latest.get(execution)?.get(symbol).copied()
    }

    /// Value produced exactly on `date`.
    pub fn value_on(&self, execution: &str, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.latest(execution, symbol)
            .filter(|(d, _)| *d == date)
            .map(|(_, v)| v)
    }
}

/// What an end-of-day algorithm may see and do on one date.
pub struct EodContext<'a> {
    date: NaiveDate,
    symbols: &'a [String],
    traded: &'a [bool],
    signals: &'a SignalStore,
    ledger: &'a mut Ledger,
}

impl<'a> EodContext<'a> {
    pub fn new(
        date: NaiveDate,
        symbols: &'a [String],
        traded: &'a [bool],
        signals: &'a SignalStore,
        ledger: &'a mut Ledger,
    ) -> Self {
        Self {
            date,
            symbols,
            traded,
            signals,
            ledger,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Every symbol bound to this run.
    pub fn symbols(&self) -> &'a [String] {
        self.symbols
    }

    /// Symbols that have a bar on this date.
    pub fn traded_symbols(&self) -> impl Iterator<Item = &'a str> + 'a {
        let traded = self.traded;
        self.symbols
            .iter()
            .zip(traded.iter())
            .filter(|(_, t)| **t)
            .map(|(s, _)| s.as_str())
    }

    /// Today's output of a stock execution for a symbol.
    pub fn signal(&self, execution: &str, symbol: &str) -> Option<f64> {
        self.signals.value_on(execution, symbol, self.date)
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.ledger.price(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.ledger.position(symbol)
    }

    pub fn equity(&self) -> f64 {
        self.ledger.equity()
    }

    pub fn buy(&mut self, symbol: &str, shares: f64) -> Result<(), AlgorithmError> {
        Ok(self.ledger.open(symbol, Side::Long, shares, self.date)?)
    }

    pub fn sell_short(&mut self, symbol: &str, shares: f64) -> Result<(), AlgorithmError> {
        Ok(self.ledger.open(symbol, Side::Short, shares, self.date)?)
    }

    pub fn close(&mut self, symbol: &str) -> Result<(), AlgorithmError> {
        self.ledger.close(symbol, self.date)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn signal_is_visible_only_on_its_date() {
        let mut store = SignalStore::new();
        store.record("fast", "SPY", date(2), 1.5);
        assert_eq!(store.value_on("fast", "SPY", date(2)), Some(1.5));
        assert_eq!(store.value_on("fast", "SPY", date(3)), None);
        assert_eq!(store.latest("fast", "SPY"), Some((date(2), 1.5)));
        assert_eq!(store.latest("slow", "SPY"), None);
    }

    #[test]
    fn context_trades_through_ledger() {
        let symbols = vec!["AAA".to_string(), "BBB".to_string()];
        let traded = vec![true, false];
        let signals = SignalStore::new();
        let mut ledger = Ledger::new(100.0);
        ledger.mark("AAA", 10.0);

        let mut ctx = EodContext::new(date(1), &symbols, &traded, &signals, &mut ledger);
        assert_eq!(ctx.traded_symbols().collect::<Vec<_>>(), vec!["AAA"]);
        ctx.buy("AAA", 2.0).unwrap();
        assert!(ctx.buy("BBB", 1.0).is_err());
        assert_eq!(ctx.position("AAA").map(|p| p.shares), Some(2.0));
        assert_eq!(ledger.cash(), 80.0);
    }
}
