//! Built-in per-symbol algorithms.
//!
//! Each emits `None` until it has enough history, and treats a `None` input
//! as "no value today" without advancing its own state.

use std::collections::VecDeque;

use super::{AlgorithmError, AlgorithmSettings, StockAlgorithm};
use crate::data::Day;

// ─── Input ───────────────────────────────────────────────────────────

/// Raw bar field. `Input(e = close)`.
#[derive(Debug, Clone)]
pub struct Input {
    field: String,
}

impl Input {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        settings.expect_subs(0)?;
        let field = settings.text_or("e", "close")?;
        if !Day::FIELDS.contains(&field.as_str()) {
            return Err(AlgorithmError::BadArguments(format!(
                "Input algorithm does not know field {field}"
            )));
        }
        Ok(Box::new(Self { field }))
    }
}

impl StockAlgorithm for Input {
    fn process(&mut self, day: &Day, _inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        Ok(day.field(&self.field))
    }
}

// ─── Sma ─────────────────────────────────────────────────────────────

/// Longest accepted `Sma` window, roughly four centuries of trading days.
pub const MAX_SMA_WINDOW: i64 = 100_000;

/// Simple moving average over `n` values of its single input.
#[derive(Debug, Clone)]
pub struct Sma {
    n: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        settings.expect_subs(1)?;
        let n = settings.integer("n")?;
        if !(1..=MAX_SMA_WINDOW).contains(&n) {
            return Err(AlgorithmError::BadArguments(format!(
                "Sma algorithm needs 1 <= n <= {MAX_SMA_WINDOW}, got {n}"
            )));
        }
        Ok(Box::new(Self::new(n as usize)))
    }

    pub fn new(n: usize) -> Self {
        Self {
            n,
            // grows with the data; `n` alone never sizes an allocation
            window: VecDeque::new(),
            sum: 0.0,
        }
    }
}

impl StockAlgorithm for Sma {
    fn process(&mut self, _day: &Day, inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        let Some(value) = inputs.first().copied().flatten() else {
            return Ok(None);
        };
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.n {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        if self.window.len() < self.n {
            return Ok(None);
        }
        Ok(Some(self.sum / self.n as f64))
    }
}

// ─── Ema ─────────────────────────────────────────────────────────────

/// Exponential moving average, smoothing factor `P` in (0, 1].
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        settings.expect_subs(1)?;
        let alpha = settings.real("P")?;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(AlgorithmError::BadArguments(format!(
                "Ema algorithm needs 0 < P <= 1, got {alpha}"
            )));
        }
        Ok(Box::new(Self { alpha, value: None }))
    }
}

impl StockAlgorithm for Ema {
    fn process(&mut self, _day: &Day, inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        let Some(x) = inputs.first().copied().flatten() else {
            return Ok(None);
        };
        let next = match self.value {
            None => x,
            Some(prev) => prev + self.alpha * (x - prev),
        };
        self.value = Some(next);
        Ok(Some(next))
    }
}

// ─── Diff ────────────────────────────────────────────────────────────

/// First input minus second input.
#[derive(Debug, Clone, Copy)]
pub struct Diff;

impl Diff {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        settings.expect_subs(2)?;
        Ok(Box::new(Self))
    }
}

impl StockAlgorithm for Diff {
    fn process(&mut self, _day: &Day, inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        match inputs {
            [Some(a), Some(b)] => Ok(Some(a - b)),
            _ => Ok(None),
        }
    }
}

// ─── Level ───────────────────────────────────────────────────────────

/// Constant `f`.
#[derive(Debug, Clone, Copy)]
pub struct Level {
    value: f64,
}

impl Level {
    pub fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        settings.expect_subs(0)?;
        Ok(Box::new(Self {
            value: settings.real("f")?,
        }))
    }
}

impl StockAlgorithm for Level {
    fn process(&mut self, _day: &Day, _inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        Ok(Some(self.value))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
