//! Sweep tests: ranking, partial failure, fail-fast spaces, timeouts,
//! cancellation, and node-side evaluation of serialized packages.

use std::cell::{Cell, RefCell};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use gridlab_core::algorithms::{AlgorithmError, AlgorithmRegistry, AlgorithmSettings, StockAlgorithm};
use gridlab_core::data::{Day, InMemoryStorage, StockSeries, StockStorage};
use gridlab_core::definition::{parse_template, ExecutionTemplate, InvocationTemplate, StrategyTemplate};
use gridlab_core::params::AxisKind;
use gridlab_runner::{
    evaluate_package, split, Coordinator, FailureReason, SplitHint, SweepConfig, SweepError,
    SweepProgress, UnitControl, UnitFailure, WorkPackage,
};

// ── Fixtures ─────────────────────────────────────────────────────────

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn wave(symbol: &str, n: usize) -> StockSeries {
    let days = (0..n)
        .map(|i| {
            let close = match i {
                i if i < 10 => 100.0,
                i if i < 25 => 100.0 + (i - 9) as f64 * 2.0,
                i => 130.0 - (i - 24) as f64 * 2.0,
            };
            Day::new(base() + chrono::Duration::days(i as i64), close)
        })
        .collect();
    StockSeries::new(symbol, days).unwrap()
}

fn storage() -> Arc<dyn StockStorage> {
    let storage: InMemoryStorage = vec![wave("AAA", 45), wave("BBB", 40)].into_iter().collect();
    Arc::new(storage)
}

fn config(units: u64, top_k: usize) -> SweepConfig {
    SweepConfig {
        start_date: base(),
        end_date: base() + chrono::Duration::days(60),
        initial_capital: 10_000.0,
        top_k,
        units,
        threads: 2,
        ..SweepConfig::default()
    }
}

const CROSSOVER: &str = "
    StockExecutions = fast, slow
    EodExecutions = trader
    fast.loadLine = Sma(n = [2i:6i:1i], Input(e = close))
    slow.loadLine = Sma(n = [6i:12i:2i], Input(e = close))
    trader.loadLine = CrossTrader(fast = fast, slow = slow, size = 10d)
";

/// Fails when `armed == 1`, panics when `armed == 3`.
struct Tripwire {
    armed: i64,
}

impl Tripwire {
    fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        Ok(Box::new(Self {
            armed: settings.integer("armed")?,
        }))
    }
}

impl StockAlgorithm for Tripwire {
    fn process(&mut self, day: &Day, _inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        match self.armed {
            1 => Err(AlgorithmError::Failed("tripped".into())),
            3 => panic!("wire snapped"),
            _ => Ok(Some(day.close)),
        }
    }
}

/// Sleeps `ms` milliseconds per day.
struct Sleepy {
    ms: u64,
}

impl Sleepy {
    fn build(settings: &AlgorithmSettings) -> Result<Box<dyn StockAlgorithm>, AlgorithmError> {
        Ok(Box::new(Self {
            ms: settings.integer("ms")? as u64,
        }))
    }
}

impl StockAlgorithm for Sleepy {
    fn process(&mut self, day: &Day, _inputs: &[Option<f64>]) -> Result<Option<f64>, AlgorithmError> {
        std::thread::sleep(Duration::from_millis(self.ms));
        Ok(Some(day.close))
    }
}

fn registry() -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::with_builtins();
    registry.register_stock("Tripwire", Tripwire::build).unwrap();
    registry.register_stock("Sleepy", Sleepy::build).unwrap();
    registry
}

/// One short series so a sleepy run costs exactly one sleep.
fn one_day_storage() -> Arc<dyn StockStorage> {
    let storage: InMemoryStorage = vec![StockSeries::new("AAA", vec![Day::new(base(), 10.0)]).unwrap()]
        .into_iter()
        .collect();
    Arc::new(storage)
}

// ── Ranking ──────────────────────────────────────────────────────────

#[test]
fn full_sweep_ranks_every_combination() {
    let template = parse_template(CROSSOVER).unwrap();
    let coordinator = Coordinator::new(registry(), storage(), &config(5, 100)).unwrap();
    let outcome = coordinator.sweep(&template).unwrap();

    assert_eq!(outcome.config_id, config(5, 100).config_id().unwrap());
    assert_eq!(outcome.total, 12);
    assert_eq!(outcome.evaluated, 12);
    assert!(outcome.failures.is_empty());
    assert!(!outcome.cancelled);
    assert!(outcome.is_accounted());
    assert_eq!(outcome.ranking.len(), 12);
    for pair in outcome.ranking.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].index < pair[1].index)
        );
    }
}

#[test]
fn ranking_does_not_depend_on_unit_count() {
    let template = parse_template(CROSSOVER).unwrap();
    let run = |units| {
        Coordinator::new(registry(), storage(), &config(units, 4))
            .unwrap()
            .sweep(&template)
            .unwrap()
            .ranking
    };
    assert_eq!(run(1), run(7));
}

#[test]
fn top_k_bounds_the_ranking() {
    let template = parse_template(CROSSOVER).unwrap();
    let outcome = Coordinator::new(registry(), storage(), &config(3, 2))
        .unwrap()
        .sweep(&template)
        .unwrap();
    assert_eq!(outcome.ranking.len(), 2);
    assert_eq!(outcome.evaluated, 12);
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn failing_combinations_do_not_abort_siblings() {
    let template = parse_template("StockExecutions = w\nw.loadLine = Tripwire(armed = [0i:4i:1i])").unwrap();
    let outcome = Coordinator::new(registry(), storage(), &config(2, 10))
        .unwrap()
        .sweep(&template)
        .unwrap();

    let ranked: Vec<u64> = {
        let mut v: Vec<u64> = outcome.ranking.iter().map(|e| e.index).collect();
        v.sort();
        v
    };
    assert_eq!(ranked, vec![0, 2]);
    assert_eq!(outcome.failures.len(), 2);

    let tripped = &outcome.failures[0];
    assert_eq!(tripped.index, 1);
    assert!(matches!(&tripped.reason, FailureReason::Run(msg) if msg.contains("tripped")));

    let snapped = &outcome.failures[1];
    assert_eq!(snapped.index, 3);
    assert_eq!(snapped.reason, FailureReason::Panicked("wire snapped".into()));
    assert!(outcome.is_accounted());
}

#[test]
fn configuration_errors_are_per_combination() {
    // Sma rejects n = 0; the other values are fine
    let template = parse_template(
        "StockExecutions = s\ns.loadLine = Sma(n = [0i:3i:1i], Input(e = close))",
    )
    .unwrap();
    let outcome = Coordinator::new(registry(), storage(), &config(1, 10))
        .unwrap()
        .sweep(&template)
        .unwrap();
    assert_eq!(outcome.evaluated, 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 0);
    assert!(matches!(outcome.failures[0].reason, FailureReason::Config(_)));
}

#[test]
fn invalid_space_fails_before_dispatch() {
    let template = StrategyTemplate {
        stock_executions: vec![ExecutionTemplate::new(
            "s",
            InvocationTemplate::new("Sma").tunable(
                "n",
                AxisKind::IntegerRange {
                    from: 5,
                    to: 1,
                    step: 1,
                },
            ),
        )],
        eod_executions: vec![],
    };
    let err = Coordinator::new(registry(), storage(), &config(1, 10))
        .unwrap()
        .sweep(&template)
        .unwrap_err();
    assert!(matches!(err, SweepError::Space(_)));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let err = Coordinator::new(registry(), storage(), &config(0, 10)).err();
    assert!(matches!(err, Some(SweepError::Config(_))));
}

// ── Timeouts and cancellation ────────────────────────────────────────

#[test]
fn timed_out_unit_reports_unfinished_indices() {
    let template =
        parse_template("StockExecutions = z\nz.loadLine = Sleepy(ms = 200i, tag = [0i:6i:1i])").unwrap();
    let coordinator = Coordinator::new(registry(), one_day_storage(), &config(1, 10))
        .unwrap()
        .with_unit_timeout(Some(Duration::from_millis(500)));
    let outcome = coordinator.sweep(&template).unwrap();

    assert_eq!(outcome.total, 6);
    assert!(outcome.is_accounted());
    assert!(outcome.ranking.iter().any(|e| e.index == 0));
    assert!(outcome.ranking.iter().all(|e| e.index < 3));
    assert!(!outcome.failures.is_empty());
    assert!(outcome.failures.iter().all(|f| f.reason == FailureReason::Timeout));
    assert_eq!(outcome.failures.last().unwrap().index, 5);
}

#[test]
fn hung_unit_does_not_hold_up_the_queue() {
    // index 0 sleeps far past the timeout on the only worker thread
    let template = parse_template("StockExecutions = z\nz.loadLine = Sleepy(ms = [10000i|0i])").unwrap();
    let config = SweepConfig {
        threads: 1,
        ..config(2, 10)
    };
    let timeout = Duration::from_millis(300);
    let coordinator = Coordinator::new(registry(), one_day_storage(), &config)
        .unwrap()
        .with_unit_timeout(Some(timeout));

    let started = Instant::now();
    let outcome = coordinator.sweep(&template).unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < timeout * 10, "sweep took {elapsed:?}");
    assert_eq!(outcome.evaluated, 1);
    assert_eq!(outcome.ranking[0].index, 1);
    assert_eq!(
        outcome.failures,
        vec![UnitFailure {
            index: 0,
            reason: FailureReason::Timeout
        }]
    );
    assert!(outcome.is_accounted());
}

#[test]
fn cancelled_before_start_scores_nothing() {
    let template = parse_template(CROSSOVER).unwrap();
    let coordinator = Coordinator::new(registry(), storage(), &config(3, 10)).unwrap();
    coordinator.cancel_handle().store(true, Ordering::Relaxed);

    let outcome = coordinator.sweep(&template).unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.ranking.is_empty());
    assert_eq!(outcome.failures.len(), 12);
    assert!(outcome.failures.iter().all(|f| f.reason == FailureReason::Cancelled));
}

#[test]
fn cancel_from_progress_callback_abandons_the_rest() {
    let template =
        parse_template("StockExecutions = z\nz.loadLine = Sleepy(ms = 50i, tag = [0i:6i:1i])").unwrap();
    let coordinator = Coordinator::new(registry(), one_day_storage(), &config(1, 10)).unwrap();
    let handle = coordinator.cancel_handle();

    let outcome = coordinator
        .sweep_with_progress(&template, Some(&|_: &SweepProgress| handle.store(true, Ordering::Relaxed)))
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.is_accounted());
    assert!(outcome.evaluated >= 1);
    assert!(outcome.failures.iter().all(|f| f.reason == FailureReason::Cancelled));
}

#[test]
fn progress_reports_best_so_far() {
    let template = parse_template(CROSSOVER).unwrap();
    let coordinator = Coordinator::new(registry(), storage(), &config(4, 3)).unwrap();
    let calls = Cell::new(0u64);
    let last = RefCell::new(None);

    let outcome = coordinator
        .sweep_with_progress(
            &template,
            Some(&|p: &SweepProgress| {
                calls.set(calls.get() + 1);
                *last.borrow_mut() = Some(p.clone());
            }),
        )
        .unwrap();

    assert_eq!(calls.get(), 12);
    let last = last.into_inner().unwrap();
    assert_eq!(last.evaluated, 12);
    assert_eq!(last.best_index, outcome.best().map(|b| b.index));
}

// ── Packages ─────────────────────────────────────────────────────────

#[test]
fn decoded_packages_evaluate_like_the_coordinator() {
    let template = parse_template(CROSSOVER).unwrap();
    let coordinator = Coordinator::new(registry(), storage(), &config(1, 100)).unwrap();
    let local = coordinator.sweep(&template).unwrap();

    let space = template.parameter_space().unwrap();
    let mut remote = Vec::new();
    for unit in split(&space, SplitHint::MaxUnitSize(5)).unwrap() {
        let bytes = WorkPackage::new(template.clone(), unit).unwrap().to_bytes().unwrap();
        let package = WorkPackage::from_bytes(&bytes).unwrap();
        let report = evaluate_package(&package, coordinator.evaluator(), &UnitControl::default());
        assert!(report.failures.is_empty());
        remote.extend(report.scored);
    }
    remote.sort_by(|a, b| a.rank_cmp(b));

    assert_eq!(remote, local.ranking);
}
