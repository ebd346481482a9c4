//! Broker: drives the simulation clock over the bound symbols.
//!
//! Per date: every lane resolves its cursor, marks the ledger, and feeds its
//! stock chains; then every end-of-day slot runs once; then equity is
//! recorded. Open positions are closed on the last simulated date.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use super::graph::{EodSlot, ExecutionGraph, StockChain};
use super::ledger::{Ledger, RunRecord};
use super::signals::{EodContext, SignalStore};
use super::{RunError, SimulationSettings};
use crate::data::{SeriesCursor, StockStorage};

/// One symbol's cursor and its per-symbol chains.
struct Lane<'s> {
    symbol: String,
    cursor: SeriesCursor<'s>,
    chains: Vec<StockChain>,
}

pub struct Broker<'s> {
    lanes: Vec<Lane<'s>>,
    symbols: Vec<String>,
    eod: Vec<EodSlot>,
    dates: Vec<NaiveDate>,
    signals: SignalStore,
    ledger: Ledger,
}

impl<'s> Broker<'s> {
    /// Bind the graph to storage: one lane per symbol, one chain per stock
    /// execution per lane.
    pub fn bind(
        graph: ExecutionGraph,
        storage: &'s dyn StockStorage,
        settings: &SimulationSettings,
    ) -> Result<Self, RunError> {
        let symbols = match &settings.symbols {
            Some(list) => list.clone(),
            None => storage.symbols(),
        };

        let mut lanes = Vec::with_capacity(symbols.len());
        let mut dates = BTreeSet::new();
        for symbol in &symbols {
            let series = storage.series(symbol).ok_or_else(|| RunError::UnknownSymbol {
                symbol: symbol.clone(),
            })?;
            dates.extend(series.dates_between(settings.start, settings.end));
            let chains = graph
                .stock
                .iter()
                .map(|bp| bp.instantiate())
                .collect::<Result<Vec<_>, _>>()?;
            lanes.push(Lane {
                symbol: symbol.clone(),
                cursor: SeriesCursor::new(series, settings.start),
                chains,
            });
        }

        Ok(Self {
            lanes,
            symbols,
            eod: graph.eod,
            dates: dates.into_iter().collect(),
            signals: SignalStore::new(),
            ledger: Ledger::new(settings.initial_capital),
        })
    }

    /// Number of clock ticks this run will take.
    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    pub fn run(mut self) -> Result<RunRecord, RunError> {
        let dates = std::mem::take(&mut self.dates);
        let mut traded = vec![false; self.lanes.len()];

        for &date in &dates {
            self.step(date, &mut traded)?;
            if self.lanes.iter().all(|l| l.cursor.is_exhausted()) {
                debug!(%date, "every cursor exhausted");
                break;
            }
        }

        if let Some(&last) = dates.last() {
            self.ledger.close_all(last)?;
            self.ledger.record_equity(last);
        }
        Ok(self.ledger.into_record())
    }

    fn step(&mut self, date: NaiveDate, traded: &mut [bool]) -> Result<(), RunError> {
        for (lane, flag) in self.lanes.iter_mut().zip(traded.iter_mut()) {
            let day = lane.cursor.resolve(date)?;
            *flag = day.is_some();
            let Some(day) = day else { continue };

            self.ledger.mark(&lane.symbol, day.close);
            for chain in &mut lane.chains {
                let value = chain.process(day).map_err(|f| RunError::Algorithm {
                    execution: chain.execution().to_string(),
                    algorithm: f.algorithm,
                    symbol: Some(lane.symbol.clone()),
                    date,
                    source: f.source,
                })?;
                if let Some(v) = value {
                    self.signals.record(chain.execution(), &lane.symbol, date, v);
                }
            }
        }

        for slot in &mut self.eod {
            let mut ctx = EodContext::new(date, &self.symbols, traded, &self.signals, &mut self.ledger);
            slot.algorithm.process(&mut ctx).map_err(|source| RunError::Algorithm {
                execution: slot.execution.clone(),
                algorithm: slot.algorithm_name.clone(),
                symbol: None,
                date,
                source,
            })?;
        }

        self.ledger.record_equity(date);
        Ok(())
    }
}
