//! Ledger: cash, open positions, closed trades, and the equity curve of one run.
//!
//! Orders fill at the last marked close of the symbol. Opening against an
//! opposite position closes it first; adding to a same-side position averages
//! the entry price.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("no price known for {symbol}")]
    NoPrice { symbol: String },
    #[error("share count must be positive and finite for {symbol}, got {shares}")]
    InvalidShares { symbol: String, shares: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// An open position. `shares` is always positive; direction lives in `side`.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub shares: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: Side,
    pub shares: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    /// `pnl / (entry_price * shares)`.
    pub return_pct: f64,
}

/// Everything a statistics provider needs from a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub initial_capital: f64,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_capital: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    prices: HashMap<String, f64>,
    trades: Vec<ClosedTrade>,
    equity_curve: Vec<(NaiveDate, f64)>,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            prices: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Record the latest close for a symbol.
    pub fn mark(&mut self, symbol: &str, price: f64) {
        self.prices.insert(symbol.to_string(), price);
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions.iter().map(|(s, p)| (s.as_str(), p))
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    /// Cash plus the marked value of every open position.
    pub fn equity(&self) -> f64 {
        self.positions.iter().fold(self.cash, |acc, (symbol, p)| {
            let price = self.price(symbol).unwrap_or(p.entry_price);
            acc + p.side.sign() * p.shares * price
        })
    }

    /// Open (or add to) a position at the last marked price.
    pub fn open(&mut self, symbol: &str, side: Side, shares: f64, date: NaiveDate) -> Result<(), LedgerError> {
        if !(shares.is_finite() && shares > 0.0) {
            return Err(LedgerError::InvalidShares {
                symbol: symbol.to_string(),
                shares,
            });
        }
        let price = self.price(symbol).ok_or_else(|| LedgerError::NoPrice {
            symbol: symbol.to_string(),
        })?;

        if self.position(symbol).is_some_and(|p| p.side != side) {
            self.close(symbol, date)?;
        }

        self.cash -= side.sign() * shares * price;
        match self.positions.get_mut(symbol) {
            Some(p) => {
                let total = p.shares + shares;
                p.entry_price = (p.entry_price * p.shares + price * shares) / total;
                p.shares = total;
            }
            None => {
                self.positions.insert(
                    symbol.to_string(),
                    Position {
                        side,
                        shares,
                        entry_price: price,
                        entry_date: date,
                    },
                );
            }
        }
        Ok(())
    }

    /// Close the whole position in `symbol`. `Ok(None)` when flat.
    pub fn close(&mut self, symbol: &str, date: NaiveDate) -> Result<Option<ClosedTrade>, LedgerError> {
        if !self.positions.contains_key(symbol) {
            return Ok(None);
        }
        let exit_price = self.price(symbol).ok_or_else(|| LedgerError::NoPrice {
            symbol: symbol.to_string(),
        })?;
        let Some(p) = self.positions.remove(symbol) else {
            return Ok(None);
        };

        self.cash += p.side.sign() * p.shares * exit_price;
        let pnl = p.side.sign() * (exit_price - p.entry_price) * p.shares;
        let cost = p.entry_price * p.shares;
        let trade = ClosedTrade {
            symbol: symbol.to_string(),
            side: p.side,
            shares: p.shares,
            entry_date: p.entry_date,
            exit_date: date,
            entry_price: p.entry_price,
            exit_price,
            pnl,
            return_pct: if cost == 0.0 { 0.0 } else { pnl / cost },
        };
        self.trades.push(trade.clone());
        Ok(Some(trade))
    }

    /// Close every open position, in symbol order.
    pub fn close_all(&mut self, date: NaiveDate) -> Result<(), LedgerError> {
        let symbols: Vec<String> = self.positions.keys().cloned().collect();
        for symbol in symbols {
            self.close(&symbol, date)?;
        }
        Ok(())
    }

    /// Append today's equity to the curve. One point per simulated date.
    pub fn record_equity(&mut self, date: NaiveDate) {
        let equity = self.equity();
        match self.equity_curve.last_mut() {
            Some((last, value)) if *last == date => *value = equity,
            _ => self.equity_curve.push((date, equity)),
        }
    }

    pub fn into_record(self) -> RunRecord {
        RunRecord {
            initial_capital: self.initial_capital,
            trades: self.trades,
            equity_curve: self.equity_curve,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
