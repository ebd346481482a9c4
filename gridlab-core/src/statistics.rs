//! Statistics: the immutable metric bag produced at the end of a run.
//!
//! Metrics are looked up by name through an explicit map; nothing is resolved
//! dynamically. `StatisticsProvider` is the seam through which a finished run
//! record is turned into metrics. `LedgerStatistics` is the default provider.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::ledger::{ClosedTrade, RunRecord};

/// Trading days per year used to annualize the Sharpe ratio.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Errors raised while reading a metric.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatisticsError {
    #[error("metric {name} not present in statistics")]
    Missing { name: String },
    #[error("metric {name} cannot be parsed as a number: {raw:?}")]
    Unparseable { name: String, raw: String },
}

/// A metric as delivered by a provider. Text values are parsed on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Named metrics for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    metrics: BTreeMap<String, MetricValue>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_metric(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.into(), value.into());
        self
    }

    /// Numeric value of a metric.
    pub fn metric(&self, name: &str) -> Result<f64, StatisticsError> {
        match self.metrics.get(name) {
            None => Err(StatisticsError::Missing {
                name: name.to_string(),
            }),
            Some(MetricValue::Number(v)) => Ok(*v),
            Some(MetricValue::Text(raw)) => {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| StatisticsError::Unparseable {
                        name: name.to_string(),
                        raw: raw.clone(),
                    })
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for Statistics {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            metrics: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ─── Provider ────────────────────────────────────────────────────────

/// Turns a finished run into metrics.
pub trait StatisticsProvider: Send + Sync {
    fn statistics(&self, record: &RunRecord) -> Statistics;
}

/// Default provider: trade and equity-curve metrics from the run ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerStatistics;

impl StatisticsProvider for LedgerStatistics {
    fn statistics(&self, record: &RunRecord) -> Statistics {
        let trades = &record.trades;
        let period = record.equity_curve.len() as f64;
        let trade_count = trades.len() as f64;

        let wins: Vec<&ClosedTrade> = trades.iter().filter(|t| t.pnl > 0.0).collect();
        let losses: Vec<&ClosedTrade> = trades.iter().filter(|t| t.pnl <= 0.0).collect();

        let win_prob = ratio(wins.len() as f64, trade_count);
        let av_gain = mean(trades.iter().map(|t| t.return_pct));
        let av_win = mean(wins.iter().map(|t| t.return_pct));
        let av_loss = mean(losses.iter().map(|t| t.return_pct.abs()));
        let av_win_av_loss = ratio(av_win, av_loss);
        let kelly = if av_win_av_loss > 0.0 {
            win_prob - (1.0 - win_prob) / av_win_av_loss
        } else {
            win_prob
        };
        let max_win = wins.iter().map(|t| t.pnl).fold(0.0, f64::max);
        let max_loss = losses.iter().map(|t| t.pnl.abs()).fold(0.0, f64::max);

        let equity: Vec<f64> = record.equity_curve.iter().map(|(_, e)| *e).collect();
        let final_equity = equity.last().copied().unwrap_or(record.initial_capital);

        [
            ("period", period),
            ("tradeCount", trade_count),
            ("freq", ratio(trade_count, period)),
            ("winProb", win_prob),
            ("avGain", av_gain),
            ("avWin", av_win),
            ("avLoss", av_loss),
            ("maxWin", max_win),
            ("maxLoss", max_loss),
            ("avWinAvLoss", av_win_av_loss),
            ("kelly", kelly),
            ("sharpeRatio", sharpe(&equity)),
            ("maxDrawdown", max_drawdown(&equity)),
            ("finalEquity", final_equity),
        ]
        .into_iter()
        .collect()
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    ratio(sum, n as f64)
}

/// Annualized Sharpe of daily equity returns (risk-free rate 0).
fn sharpe(equity: &[f64]) -> f64 {
    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let mu = mean(returns.iter().copied());
    let var = returns.iter().map(|r| (r - mu).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let sd = var.sqrt();
    if sd == 0.0 {
        0.0
    } else {
        mu / sd * TRADING_DAYS_PER_YEAR.sqrt()
    }
}

/// Largest peak-to-trough decline as a positive fraction.
fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst: f64 = 0.0;
    for &e in equity {
        peak = peak.max(e);
        if peak > 0.0 {
            worst = worst.max((peak - e) / peak);
        }
    }
    worst
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ledger::Side;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn trade(pnl: f64, return_pct: f64) -> ClosedTrade {
        ClosedTrade {
            symbol: "SPY".into(),
            side: Side::Long,
            shares: 1.0,
            entry_date: date(1),
            exit_date: date(2),
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            pnl,
            return_pct,
        }
    }

    #[test]
    fn text_metrics_are_parsed() {
        let stats = Statistics::new()
            .with_metric("kelly", " 0.25 ")
            .with_metric("broken", "n/a");
        assert_eq!(stats.metric("kelly").unwrap(), 0.25);
        assert!(matches!(
            stats.metric("broken"),
            Err(StatisticsError::Unparseable { .. })
        ));
        assert!(matches!(
            stats.metric("absent"),
            Err(StatisticsError::Missing { .. })
        ));
    }

    #[test]
    fn ledger_statistics_from_trades() {
        let record = RunRecord {
            initial_capital: 1000.0,
            trades: vec![trade(20.0, 0.2), trade(-10.0, -0.1), trade(10.0, 0.1)],
            equity_curve: vec![(date(1), 1000.0), (date(2), 1100.0), (date(3), 990.0), (date(4), 1020.0)],
        };
        let stats = LedgerStatistics.statistics(&record);

        assert_eq!(stats.metric("period").unwrap(), 4.0);
        assert_eq!(stats.metric("tradeCount").unwrap(), 3.0);
        assert!((stats.metric("winProb").unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.metric("avWin").unwrap() - 0.15).abs() < 1e-12);
        assert!((stats.metric("avLoss").unwrap() - 0.1).abs() < 1e-12);
        assert!((stats.metric("avWinAvLoss").unwrap() - 1.5).abs() < 1e-12);
        // kelly = p - (1 - p) / r = 2/3 - (1/3) / 1.5
        assert!((stats.metric("kelly").unwrap() - (2.0 / 3.0 - 1.0 / 4.5)).abs() < 1e-12);
        assert_eq!(stats.metric("maxWin").unwrap(), 20.0);
        assert_eq!(stats.metric("maxLoss").unwrap(), 10.0);
        assert!((stats.metric("maxDrawdown").unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(stats.metric("finalEquity").unwrap(), 1020.0);
    }

    #[test]
    fn empty_run_has_zero_metrics() {
        let record = RunRecord {
            initial_capital: 1000.0,
            trades: vec![],
            equity_curve: vec![],
        };
        let stats = LedgerStatistics.statistics(&record);
        assert_eq!(stats.metric("tradeCount").unwrap(), 0.0);
        assert_eq!(stats.metric("kelly").unwrap(), 0.0);
        assert_eq!(stats.metric("sharpeRatio").unwrap(), 0.0);
        assert_eq!(stats.metric("finalEquity").unwrap(), 1000.0);
    }
}
