//! Read-only symbol → series storage shared by concurrent runs.

use std::collections::BTreeMap;

use super::StockSeries;

/// Symbol → series lookup. Implementations are never mutated by a run and
/// may be read from many runs at once.
pub trait StockStorage: Send + Sync {
    /// All symbols, in a stable order.
    fn symbols(&self) -> Vec<String>;

    fn series(&self, symbol: &str) -> Option<&StockSeries>;
}

/// Storage backed by an ordered in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    series: BTreeMap<String, StockSeries>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the series for its symbol.
    pub fn insert(&mut self, series: StockSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl FromIterator<StockSeries> for InMemoryStorage {
    fn from_iter<I: IntoIterator<Item = StockSeries>>(iter: I) -> Self {
        let mut storage = Self::new();
        for s in iter {
            storage.insert(s);
        }
        storage
    }
}

impl StockStorage for InMemoryStorage {
    fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn series(&self, symbol: &str) -> Option<&StockSeries> {
        self.series.get(symbol)
    }
}
