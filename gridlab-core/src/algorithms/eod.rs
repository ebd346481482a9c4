//! Built-in end-of-day algorithms. These place orders through `EodContext`.

use std::collections::HashMap;

use super::{AlgorithmError, AlgorithmSettings, EodAlgorithm};
use crate::pipeline::ledger::Side;
use crate::pipeline::EodContext;

fn positive_size(settings: &AlgorithmSettings) -> Result<f64, AlgorithmError> {
    let size = settings.real_or("size", 1.0)?;
    if !(size.is_finite() && size > 0.0) {
        return Err(AlgorithmError::BadArguments(format!(
            "{} algorithm needs size > 0, got {size}",
            settings.algorithm
        )));
    }
    Ok(size)
}

// ─── BuyAndHold ──────────────────────────────────────────────────────

/// Buys `size` shares of each symbol on its first traded day, then holds.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    size: f64,
}

impl BuyAndHold {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn EodAlgorithm>, AlgorithmError> {
        settings.expect_subs(0)?;
        Ok(Box::new(Self {
            size: positive_size(settings)?,
        }))
    }
}

impl EodAlgorithm for BuyAndHold {
    fn process(&mut self, ctx: &mut EodContext<'_>) -> Result<(), AlgorithmError> {
        let fresh: Vec<&str> = ctx
            .traded_symbols()
            .filter(|s| ctx.position(s).is_none())
            .collect();
        for symbol in fresh {
            ctx.buy(symbol, self.size)?;
        }
        Ok(())
    }
}

// ─── ThresholdTrader ─────────────────────────────────────────────────

/// Long while `signal > threshold`, flat otherwise.
#[derive(Debug, Clone)]
pub struct ThresholdTrader {
    signal: String,
    threshold: f64,
    size: f64,
}

impl ThresholdTrader {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn EodAlgorithm>, AlgorithmError> {
        settings.expect_subs(0)?;
        Ok(Box::new(Self {
            signal: settings.text("signal")?,
            threshold: settings.real_or("threshold", 0.0)?,
            size: positive_size(settings)?,
        }))
    }
}

impl EodAlgorithm for ThresholdTrader {
    fn dependencies(&self) -> Vec<String> {
        vec![self.signal.clone()]
    }

    fn process(&mut self, ctx: &mut EodContext<'_>) -> Result<(), AlgorithmError> {
        let symbols: Vec<&str> = ctx.traded_symbols().collect();
        for symbol in symbols {
            let Some(value) = ctx.signal(&self.signal, symbol) else {
                continue;
            };
            let long = ctx.position(symbol).is_some_and(|p| p.side == Side::Long);
            if value > self.threshold && !long {
                ctx.buy(symbol, self.size)?;
            } else if value <= self.threshold && long {
                ctx.close(symbol)?;
            }
        }
        Ok(())
    }
}

// ─── CrossTrader ─────────────────────────────────────────────────────

/// Long when `fast` crosses above `slow`, short when it crosses below.
#[derive(Debug, Clone)]
pub struct CrossTrader {
    fast: String,
    slow: String,
    size: f64,
    previous: HashMap<String, f64>,
}

impl CrossTrader {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn EodAlgorithm>, AlgorithmError> {
        settings.expect_subs(0)?;
        Ok(Box::new(Self {
            fast: settings.text("fast")?,
            slow: settings.text("slow")?,
            size: positive_size(settings)?,
            previous: HashMap::new(),
        }))
    }
}

impl EodAlgorithm for CrossTrader {
    fn dependencies(&self) -> Vec<String> {
        vec![self.fast.clone(), self.slow.clone()]
    }

    fn process(&mut self, ctx: &mut EodContext<'_>) -> Result<(), AlgorithmError> {
        let symbols: Vec<&str> = ctx.traded_symbols().collect();
        for symbol in symbols {
            let (Some(fast), Some(slow)) = (ctx.signal(&self.fast, symbol), ctx.signal(&self.slow, symbol)) else {
                continue;
            };
            let spread = fast - slow;
            let side = ctx.position(symbol).map(|p| p.side);
            if let Some(&prev) = self.previous.get(symbol) {
                if prev <= 0.0 && spread > 0.0 && side != Some(Side::Long) {
                    ctx.buy(symbol, self.size)?;
                } else if prev >= 0.0 && spread < 0.0 && side != Some(Side::Short) {
                    ctx.sell_short(symbol, self.size)?;
                }
            }
            self.previous.insert(symbol.to_string(), spread);
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use crate::pipeline::ledger::Ledger;
    use crate::pipeline::signals::SignalStore;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn settings(algorithm: &str, params: Vec<(&str, ParamValue)>) -> AlgorithmSettings {
        AlgorithmSettings {
            execution: "trader".into(),
            algorithm: algorithm.into(),
            params: params.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            sub_algorithms: 0,
        }
    }

    fn step(algo: &mut dyn EodAlgorithm, d: u32, signals: &SignalStore, ledger: &mut Ledger) {
        let symbols = vec!["SPY".to_string()];
        let traded = vec![true];
        let mut ctx = EodContext::new(date(d), &symbols, &traded, signals, ledger);
        algo.process(&mut ctx).unwrap();
    }

    #[test]
    fn buy_and_hold_buys_once() {
        let mut algo = BuyAndHold::build(&settings("BuyAndHold", vec![("size", ParamValue::Integer(3))])).unwrap();
        let signals = SignalStore::new();
        let mut ledger = Ledger::new(1000.0);
        ledger.mark("SPY", 10.0);
        step(algo.as_mut(), 1, &signals, &mut ledger);
        step(algo.as_mut(), 2, &signals, &mut ledger);
        assert_eq!(ledger.position("SPY").unwrap().shares, 3.0);
    }

    #[test]
    fn threshold_trader_enters_and_exits() {
        let mut algo = ThresholdTrader::build(&settings(
            "ThresholdTrader",
            vec![("signal", ParamValue::Text("mom".into())), ("threshold", ParamValue::Real(0.5))],
        ))
        .unwrap();
        assert_eq!(algo.dependencies(), vec!["mom".to_string()]);

        let mut signals = SignalStore::new();
        let mut ledger = Ledger::new(1000.0);
        ledger.mark("SPY", 10.0);

        signals.record("mom", "SPY", date(1), 1.0);
        step(algo.as_mut(), 1, &signals, &mut ledger);
        assert!(ledger.position("SPY").is_some());

        signals.record("mom", "SPY", date(2), 0.1);
        step(algo.as_mut(), 2, &signals, &mut ledger);
        assert!(ledger.position("SPY").is_none());
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn cross_trader_follows_crossings() {
        let mut algo = CrossTrader::build(&settings(
            "CrossTrader",
            vec![("fast", ParamValue::Text("f".into())), ("slow", ParamValue::Text("s".into()))],
        ))
        .unwrap();
        let mut signals = SignalStore::new();
        let mut ledger = Ledger::new(1000.0);
        ledger.mark("SPY", 10.0);

        for (d, fast) in [(1, 9.0), (2, 11.0), (3, 12.0), (4, 8.0)] {
            signals.record("f", "SPY", date(d), fast);
            signals.record("s", "SPY", date(d), 10.0);
            step(algo.as_mut(), d, &signals, &mut ledger);
            match d {
                1 => assert!(ledger.position("SPY").is_none(), "no crossing without history"),
                2 | 3 => assert_eq!(ledger.position("SPY").unwrap().side, Side::Long),
                _ => assert_eq!(ledger.position("SPY").unwrap().side, Side::Short),
            }
        }
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn missing_signal_name_is_bad_arguments() {
        assert!(matches!(
            ThresholdTrader::build(&settings("ThresholdTrader", vec![])).err(),
            Some(AlgorithmError::BadArguments(_))
        ));
    }
}
