//! Sweep coordinator: enumerate → split → dispatch → evaluate → score → rank.
//!
//! The coordinator derives a parameter space from a strategy template, splits
//! it into work units, and runs each unit as a self-contained `WorkPackage` on
//! a rayon pool. Workers stream one outcome per global index back over an
//! mpsc channel; the coordinator keeps a top-K leaderboard and a failure log.
//!
//! Failure policy:
//! - a `ParamError` while building the space aborts the sweep before dispatch
//! - anything that goes wrong for one combination (resolution, simulation,
//!   scoring, a non-finite score, a panic) becomes a `UnitFailure` for that
//!   index only
//! - a unit that outlives its timeout has every unreported index recorded as
//!   timed out; late results from it are ignored, and its thread no longer
//!   counts toward the worker budget, so queued units keep moving even while
//!   the stuck evaluation runs on
//! - cancellation records every unreported index as cancelled and returns
//!   without waiting for in-flight workers
//!
//! `evaluate_unit` is the node-side entry point. The coordinator calls it for
//! local units, and a remote node calls it after `WorkPackage::from_bytes`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use gridlab_core::algorithms::AlgorithmRegistry;
use gridlab_core::cost::CostFunction;
use gridlab_core::data::StockStorage;
use gridlab_core::definition::StrategyTemplate;
use gridlab_core::params::{ParamError, ParameterAssignment, ParameterSpace};
use gridlab_core::pipeline::{Pipeline, RunError, SimulationSettings};
use gridlab_core::statistics::{LedgerStatistics, StatisticsProvider};

use crate::config::{SweepConfig, SweepConfigError};
use crate::leaderboard::{Leaderboard, RankedEntry};
use crate::splitter::{split, SplitError, SplitHint};
use crate::work_unit::{UnitDescriptor, WorkPackage, WorkUnit};

/// Longest the coordinator blocks before re-checking cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ─── Errors and failures ─────────────────────────────────────────────

/// Errors that abort a whole sweep.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid sweep config: {0}")]
    Config(#[from] SweepConfigError),
    #[error("cannot build parameter space: {0}")]
    Space(#[from] ParamError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Why one combination produced no score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Resolution or pipeline construction failed.
    Config(String),
    /// The simulation raised.
    Run(String),
    /// The cost function could not read a metric.
    Cost(String),
    NonFiniteScore(String),
    Panicked(String),
    Timeout,
    Cancelled,
    /// The worker went away without reporting.
    Lost,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Run(msg) => write!(f, "run failed: {msg}"),
            Self::Cost(msg) => write!(f, "scoring failed: {msg}"),
            Self::NonFiniteScore(score) => write!(f, "score is not finite ({score})"),
            Self::Panicked(msg) => write!(f, "worker panicked: {msg}"),
            Self::Timeout => f.write_str("unit timed out"),
            Self::Cancelled => f.write_str("sweep cancelled"),
            Self::Lost => f.write_str("worker exited without reporting"),
        }
    }
}

/// A combination that was dispatched but not scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub index: u64,
    pub reason: FailureReason,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index {}: {}", self.index, self.reason)
    }
}

pub type IndexOutcome = Result<RankedEntry, UnitFailure>;

// ─── Evaluator ───────────────────────────────────────────────────────

/// Shared, read-only inputs for scoring combinations. Cheap to clone.
#[derive(Clone)]
pub struct Evaluator {
    registry: Arc<AlgorithmRegistry>,
    storage: Arc<dyn StockStorage>,
    provider: Arc<dyn StatisticsProvider>,
    cost: CostFunction,
    settings: SimulationSettings,
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("registry", &self.registry)
            .field("cost", &self.cost)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Evaluator {
    pub fn new(
        registry: Arc<AlgorithmRegistry>,
        storage: Arc<dyn StockStorage>,
        cost: CostFunction,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            registry,
            storage,
            provider: Arc::new(LedgerStatistics),
            cost,
            settings,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn StatisticsProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn cost(&self) -> &CostFunction {
        &self.cost
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Resolve, simulate, and score one combination.
    pub fn evaluate(
        &self,
        template: &StrategyTemplate,
        index: u64,
        assignment: ParameterAssignment,
    ) -> Result<RankedEntry, FailureReason> {
        let definition = template
            .resolve(&assignment)
            .map_err(|e| FailureReason::Config(e.to_string()))?;
        let fingerprint = definition.fingerprint();

        let statistics = Pipeline::execute(
            definition,
            self.settings.clone(),
            &self.registry,
            self.storage.as_ref(),
            self.provider.as_ref(),
        )
        .map_err(|e| match e {
            RunError::Config(c) => FailureReason::Config(c.to_string()),
            other => FailureReason::Run(other.to_string()),
        })?;

        let score = self
            .cost
            .calculate(&statistics)
            .map_err(|e| FailureReason::Cost(e.to_string()))?;
        if !score.is_finite() {
            return Err(FailureReason::NonFiniteScore(score.to_string()));
        }

        Ok(RankedEntry {
            index,
            score,
            assignment,
            fingerprint,
            statistics,
        })
    }
}

// ─── Node-side evaluation ────────────────────────────────────────────

/// Stop conditions a worker checks between combinations.
#[derive(Debug, Clone, Default)]
pub struct UnitControl {
    pub cancel: Option<Arc<AtomicBool>>,
    /// Measured from the moment the unit starts evaluating.
    pub timeout: Option<Duration>,
}

impl UnitControl {
    fn stop_reason(&self, started: Instant) -> Option<FailureReason> {
        if self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
            return Some(FailureReason::Cancelled);
        }
        match self.timeout {
            Some(limit) if started.elapsed() >= limit => Some(FailureReason::Timeout),
            _ => None,
        }
    }
}

/// Evaluate every index of a package in ascending order, handing one outcome
/// per index to `sink`. Once a stop condition fires, the remaining indices are
/// reported as failures without being evaluated.
pub fn evaluate_unit(
    package: &WorkPackage,
    evaluator: &Evaluator,
    control: &UnitControl,
    mut sink: impl FnMut(IndexOutcome),
) {
    let started = Instant::now();
    let unit = &package.unit;
    debug!(start = unit.start_index(), length = unit.length(), "unit started");

    for index in unit.indices() {
        if let Some(reason) = control.stop_reason(started) {
            debug!(index, %reason, "unit stopped early");
            for rest in index..unit.end() {
                sink(Err(UnitFailure {
                    index: rest,
                    reason: reason.clone(),
                }));
            }
            return;
        }

        let outcome = package
            .space
            .assignment(index)
            .map_err(|e| FailureReason::Config(e.to_string()))
            .and_then(|assignment| {
                guarded(|| evaluator.evaluate(&package.template, index, assignment))
            });
        sink(outcome.map_err(|reason| UnitFailure { index, reason }));
    }
}

/// What one unit produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    pub unit: WorkUnit,
    pub scored: Vec<RankedEntry>,
    pub failures: Vec<UnitFailure>,
}

impl UnitReport {
    pub fn best(&self) -> Option<&RankedEntry> {
        self.scored.iter().min_by(|a, b| a.rank_cmp(b))
    }
}

/// Evaluate a whole package and collect the outcomes.
pub fn evaluate_package(package: &WorkPackage, evaluator: &Evaluator, control: &UnitControl) -> UnitReport {
    let mut report = UnitReport {
        unit: package.unit.clone(),
        scored: Vec::new(),
        failures: Vec::new(),
    };
    evaluate_unit(package, evaluator, control, |outcome| match outcome {
        Ok(entry) => report.scored.push(entry),
        Err(failure) => report.failures.push(failure),
    });
    report
}

fn guarded<T>(f: impl FnOnce() -> Result<T, FailureReason>) -> Result<T, FailureReason> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(FailureReason::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Sweep results ───────────────────────────────────────────────────

/// Snapshot handed to the progress callback after every reported index.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepProgress {
    pub total: u64,
    pub evaluated: u64,
    pub failed: u64,
    pub best_index: Option<u64>,
    pub best_score: Option<f64>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// `SweepConfig::config_id` of the configuration that produced this.
    pub config_id: String,
    /// Size of the parameter space.
    pub total: u64,
    /// Top-K entries, best first.
    pub ranking: Vec<RankedEntry>,
    /// Sorted by index.
    pub failures: Vec<UnitFailure>,
    /// Combinations that produced a score.
    pub evaluated: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl SweepOutcome {
    pub fn best(&self) -> Option<&RankedEntry> {
        self.ranking.first()
    }

    /// Every index was either scored or recorded as a failure.
    pub fn is_accounted(&self) -> bool {
        self.evaluated + self.failures.len() as u64 == self.total
    }
}

// ─── Coordinator ─────────────────────────────────────────────────────

pub struct Coordinator {
    evaluator: Evaluator,
    config_id: String,
    top_k: usize,
    units: u64,
    threads: usize,
    unit_timeout: Option<Duration>,
    cancel: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        registry: AlgorithmRegistry,
        storage: Arc<dyn StockStorage>,
        config: &SweepConfig,
    ) -> Result<Self, SweepError> {
        config.validate()?;
        let config_id = config.config_id()?;
        let evaluator = Evaluator::new(
            Arc::new(registry),
            storage,
            config.cost.build(),
            config.simulation_settings(),
        );
        Ok(Self {
            evaluator,
            config_id,
            top_k: config.top_k,
            units: config.units,
            threads: config.threads,
            unit_timeout: config.unit_timeout(),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn StatisticsProvider>) -> Self {
        self.evaluator = self.evaluator.with_provider(provider);
        self
    }

    /// Override the configured per-unit timeout.
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    /// Setting the flag abandons the current sweep. The flag is never reset.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn sweep(&self, template: &StrategyTemplate) -> Result<SweepOutcome, SweepError> {
        self.sweep_with_progress(template, None)
    }

    pub fn sweep_with_progress(
        &self,
        template: &StrategyTemplate,
        progress_cb: Option<&dyn Fn(&SweepProgress)>,
    ) -> Result<SweepOutcome, SweepError> {
        let started = Instant::now();
        let space = template.parameter_space()?;
        let units = split(&space, SplitHint::Units(self.units))?;
        let total = space.size();
        info!(
            total,
            units = units.len(),
            top_k = self.top_k,
            timeout_secs = self.unit_timeout.map(|t| t.as_secs_f64()),
            "sweep started"
        );

        let mut workers = Workers::new(self.threads)?;
        let mut pending: VecDeque<usize> = (0..units.len()).collect();
        let mut state = SweepState::new(total, self.top_k, units.into_iter().map(UnitTracker::new).collect());
        let (tx, rx) = mpsc::channel::<Event>();
        // dropped once every unit is dispatched, so a silent pool shows up as
        // a disconnect
        let mut sender = Some(tx);
        let mut cancelled = false;

        while !state.all_done() {
            if self.cancel.load(Ordering::Relaxed) {
                info!("sweep cancelled, abandoning unfinished units");
                state.abandon(FailureReason::Cancelled);
                cancelled = true;
                break;
            }

            while state.running() < workers.capacity() {
                let Some(tx) = sender.as_ref() else { break };
                let Some(slot) = pending.pop_front() else { break };
                let lane = workers.idle_lane(state.stuck())?;
                state.dispatch(slot, lane, Instant::now());
                let job = self.unit_job(&space, template, state.unit(slot), slot, tx.clone());
                workers.spawn(lane, job);
            }
            if pending.is_empty() {
                sender = None;
            }

            let wait = self
                .unit_timeout
                .and_then(|t| state.next_deadline(t))
                .map_or(POLL_INTERVAL, |d| {
                    d.saturating_duration_since(Instant::now()).min(POLL_INTERVAL)
                });
            match rx.recv_timeout(wait) {
                Ok(event) => match state.apply(event) {
                    Applied::Reported => {
                        if let Some(cb) = progress_cb {
                            cb(&state.progress(started));
                        }
                    }
                    Applied::Released(lane) => workers.release(lane),
                    Applied::Nothing => {}
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("every worker exited with units unreported");
                    state.abandon(FailureReason::Lost);
                    break;
                }
            }

            if let Some(timeout) = self.unit_timeout {
                state.expire(Instant::now(), timeout);
            }
        }

        let outcome = state.finish(self.config_id.clone(), cancelled, started.elapsed().as_secs_f64());
        info!(
            config_id = %outcome.config_id,
            total = outcome.total,
            evaluated = outcome.evaluated,
            failed = outcome.failures.len(),
            best_score = outcome.best().map(|b| b.score),
            elapsed_secs = outcome.elapsed_secs,
            "sweep finished"
        );
        Ok(outcome)
    }

    /// What one pool thread runs for one unit.
    fn unit_job(
        &self,
        space: &ParameterSpace,
        template: &StrategyTemplate,
        unit: &WorkUnit,
        slot: usize,
        tx: Sender<Event>,
    ) -> impl FnOnce() + Send + 'static {
        let package = WorkPackage {
            space: space.clone(),
            template: template.clone(),
            unit: unit.clone(),
        };
        let evaluator = self.evaluator.clone();
        let control = UnitControl {
            cancel: Some(Arc::clone(&self.cancel)),
            timeout: self.unit_timeout,
        };
        move || {
            // send errors only mean the coordinator stopped listening
            let _ = tx.send(Event::Started {
                slot,
                at: Instant::now(),
            });
            evaluate_unit(&package, &evaluator, &control, |outcome| {
                let _ = tx.send(Event::Outcome { slot, outcome });
            });
            let _ = tx.send(Event::Finished { slot });
        }
    }
}

// ─── Worker lanes ────────────────────────────────────────────────────

/// A rayon pool and the number of units occupying its threads.
struct Lane {
    pool: rayon::ThreadPool,
    busy: usize,
}

/// The pools that run units, at most `capacity` healthy units at a time.
///
/// A unit that timed out keeps its thread until the evaluation returns. When
/// every thread is occupied that way, another lane is opened so the rest of
/// the queue still runs.
struct Workers {
    lanes: Vec<Lane>,
    capacity: usize,
}

impl Workers {
    fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = build_pool(0, threads)?;
        let capacity = pool.current_num_threads();
        Ok(Self {
            lanes: vec![Lane { pool, busy: 0 }],
            capacity,
        })
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    /// A lane with a free thread, opening one sized for `stuck` units when
    /// every existing thread is occupied.
    fn idle_lane(&mut self, stuck: usize) -> Result<usize, rayon::ThreadPoolBuildError> {
        if let Some(i) = self
            .lanes
            .iter()
            .position(|l| l.busy < l.pool.current_num_threads())
        {
            return Ok(i);
        }
        let id = self.lanes.len();
        let threads = stuck.max(1);
        warn!(lane = id, threads, "every worker thread is occupied, opening another lane");
        self.lanes.push(Lane {
            pool: build_pool(id, threads)?,
            busy: 0,
        });
        Ok(id)
    }

    fn spawn(&mut self, lane: usize, job: impl FnOnce() + Send + 'static) {
        if let Some(l) = self.lanes.get_mut(lane) {
            l.busy += 1;
            l.pool.spawn(job);
        }
    }

    fn release(&mut self, lane: usize) {
        if let Some(l) = self.lanes.get_mut(lane) {
            l.busy = l.busy.saturating_sub(1);
        }
    }
}

fn build_pool(lane: usize, threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("gridlab-worker-{lane}-{i}"))
        .build()
}

// ─── Collection state ────────────────────────────────────────────────

enum Event {
    Started { slot: usize, at: Instant },
    Outcome { slot: usize, outcome: IndexOutcome },
    Finished { slot: usize },
}

/// Per-unit bookkeeping. Workers report indices in ascending order, so every
/// index below `next` has been reported.
struct UnitTracker {
    unit: WorkUnit,
    /// Lane the unit was dispatched to.
    lane: Option<usize>,
    /// Set at dispatch, then moved to the worker's own start time.
    started: Option<Instant>,
    next: u64,
    done: bool,
    /// The worker sent `Finished`, so its thread is free again.
    released: bool,
}

impl UnitTracker {
    fn new(unit: WorkUnit) -> Self {
        let next = unit.start_index();
        Self {
            unit,
            lane: None,
            started: None,
            next,
            done: false,
            released: false,
        }
    }
}

/// What applying an event changed.
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    Nothing,
    /// An index was scored or recorded as failed.
    Reported,
    /// A worker thread on this lane is free again.
    Released(usize),
}

struct SweepState {
    total: u64,
    board: Leaderboard,
    failures: Vec<UnitFailure>,
    evaluated: u64,
    trackers: Vec<UnitTracker>,
}

impl SweepState {
    fn new(total: u64, top_k: usize, trackers: Vec<UnitTracker>) -> Self {
        Self {
            total,
            board: Leaderboard::new(top_k),
            failures: Vec::new(),
            evaluated: 0,
            trackers,
        }
    }

    fn all_done(&self) -> bool {
        self.trackers.iter().all(|t| t.done)
    }

    /// Units dispatched and not yet closed.
    fn running(&self) -> usize {
        self.trackers.iter().filter(|t| t.lane.is_some() && !t.done).count()
    }

    /// Closed units whose worker is still holding a thread.
    fn stuck(&self) -> usize {
        self.trackers
            .iter()
            .filter(|t| t.lane.is_some() && t.done && !t.released)
            .count()
    }

    fn unit(&self, slot: usize) -> &WorkUnit {
        &self.trackers[slot].unit
    }

    /// Record that `slot` was handed to `lane`. Its timeout clock starts now.
    fn dispatch(&mut self, slot: usize, lane: usize, at: Instant) {
        if let Some(t) = self.trackers.get_mut(slot) {
            t.lane = Some(lane);
            t.started = Some(at);
        }
    }

    fn apply(&mut self, event: Event) -> Applied {
        match event {
            Event::Started { slot, at } => {
                if let Some(t) = self.trackers.get_mut(slot).filter(|t| !t.done) {
                    t.started = Some(at);
                }
                Applied::Nothing
            }
            Event::Outcome { slot, outcome } => {
                let Some(tracker) = self.trackers.get_mut(slot) else {
                    return Applied::Nothing;
                };
                if tracker.done {
                    return Applied::Nothing;
                }
                match outcome {
                    Ok(entry) => {
                        tracker.next = entry.index + 1;
                        debug!(index = entry.index, score = entry.score, "combination scored");
                        self.evaluated += 1;
                        self.board.insert(entry);
                    }
                    Err(failure) => {
                        tracker.next = failure.index + 1;
                        warn!(index = failure.index, reason = %failure.reason, "combination failed");
                        self.failures.push(failure);
                    }
                }
                Applied::Reported
            }
            Event::Finished { slot } => {
                let Some(tracker) = self.trackers.get_mut(slot) else {
                    return Applied::Nothing;
                };
                if !tracker.done {
                    debug!(start = tracker.unit.start_index(), "unit finished");
                    Self::close(tracker, &mut self.failures, FailureReason::Lost);
                }
                match tracker.lane {
                    Some(lane) if !tracker.released => {
                        tracker.released = true;
                        Applied::Released(lane)
                    }
                    _ => Applied::Nothing,
                }
            }
        }
    }

    /// Earliest deadline among running units.
    fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.trackers
            .iter()
            .filter(|t| !t.done)
            .filter_map(|t| t.started)
            .map(|s| s + timeout)
            .min()
    }

    fn expire(&mut self, now: Instant, timeout: Duration) {
        for tracker in &mut self.trackers {
            let overdue = tracker.started.is_some_and(|s| now.duration_since(s) >= timeout);
            if !tracker.done && overdue {
                warn!(
                    start = tracker.unit.start_index(),
                    unreported = tracker.unit.end() - tracker.next,
                    "unit timed out"
                );
                Self::close(tracker, &mut self.failures, FailureReason::Timeout);
            }
        }
    }

    fn abandon(&mut self, reason: FailureReason) {
        for tracker in &mut self.trackers {
            if !tracker.done {
                Self::close(tracker, &mut self.failures, reason.clone());
            }
        }
    }

    /// Mark a unit done, recording every unreported index with `reason`.
    fn close(tracker: &mut UnitTracker, failures: &mut Vec<UnitFailure>, reason: FailureReason) {
        failures.extend((tracker.next..tracker.unit.end()).map(|index| UnitFailure {
            index,
            reason: reason.clone(),
        }));
        tracker.next = tracker.unit.end();
        tracker.done = true;
    }

    fn progress(&self, started: Instant) -> SweepProgress {
        let best = self.board.best();
        SweepProgress {
            total: self.total,
            evaluated: self.evaluated,
            failed: self.failures.len() as u64,
            best_index: best.map(|b| b.index),
            best_score: best.map(|b| b.score),
            elapsed_secs: started.elapsed().as_secs_f64(),
        }
    }

    fn finish(mut self, config_id: String, cancelled: bool, elapsed_secs: f64) -> SweepOutcome {
        self.failures.sort_by_key(|f| f.index);
        SweepOutcome {
            config_id,
            total: self.total,
            ranking: self.board.into_entries(),
            failures: self.failures,
            evaluated: self.evaluated,
            cancelled,
            elapsed_secs,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(start: u64, length: u64) -> UnitTracker {
        UnitTracker::new(WorkUnit::local(start, length))
    }

    fn failure(index: u64, reason: FailureReason) -> Event {
        Event::Outcome {
            slot: 0,
            outcome: Err(UnitFailure { index, reason }),
        }
    }

    #[test]
    fn timeout_records_only_unreported_indices() {
        let mut state = SweepState::new(4, 3, vec![tracker(0, 4)]);
        let t0 = Instant::now();
        state.dispatch(0, 0, t0);
        state.apply(Event::Started { slot: 0, at: t0 });
        state.apply(failure(0, FailureReason::Run("boom".into())));

        state.expire(t0 + Duration::from_secs(5), Duration::from_secs(10));
        assert!(!state.all_done());

        state.expire(t0 + Duration::from_secs(10), Duration::from_secs(10));
        assert!(state.all_done());
        let outcome = state.finish("cfg".into(), false, 0.0);
        let reasons: Vec<_> = outcome.failures.iter().map(|f| (f.index, f.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (0, FailureReason::Run("boom".into())),
                (1, FailureReason::Timeout),
                (2, FailureReason::Timeout),
                (3, FailureReason::Timeout),
            ]
        );
        assert!(outcome.is_accounted());
    }

    #[test]
    fn late_events_after_close_are_ignored() {
        let mut state = SweepState::new(2, 3, vec![tracker(0, 2)]);
        state.abandon(FailureReason::Cancelled);
        assert_eq!(state.apply(failure(0, FailureReason::Run("late".into()))), Applied::Nothing);
        assert_eq!(state.failures.len(), 2);
    }

    #[test]
    fn dispatched_unit_expires_even_if_its_worker_never_starts() {
        let mut state = SweepState::new(3, 3, vec![tracker(0, 2), tracker(2, 1)]);
        let t0 = Instant::now();
        state.dispatch(0, 0, t0);
        assert_eq!(state.running(), 1);
        assert_eq!(state.next_deadline(Duration::from_secs(1)), Some(t0 + Duration::from_secs(1)));

        state.expire(t0 + Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(state.running(), 0);
        assert_eq!(state.stuck(), 1);
        assert_eq!(state.failures.len(), 2);
        assert!(!state.all_done());

        // the hung worker eventually returns and gives its thread back
        assert_eq!(state.apply(Event::Finished { slot: 0 }), Applied::Released(0));
        assert_eq!(state.stuck(), 0);
        assert_eq!(state.apply(Event::Finished { slot: 0 }), Applied::Nothing);
    }

    #[test]
    fn occupied_threads_open_a_new_lane() {
        let mut workers = Workers::new(1).unwrap();
        assert_eq!(workers.capacity(), 1);
        let (hold_tx, hold_rx) = mpsc::channel::<()>();

        let first = workers.idle_lane(0).unwrap();
        assert_eq!(first, 0);
        workers.spawn(first, move || {
            let _ = hold_rx.recv();
        });

        let second = workers.idle_lane(1).unwrap();
        assert_eq!(second, 1);
        assert_eq!(workers.lanes.len(), 2);

        workers.release(first);
        assert_eq!(workers.idle_lane(1).unwrap(), 0);
        hold_tx.send(()).unwrap();
    }

    #[test]
    fn failure_reasons_read_clearly() {
        let f = UnitFailure {
            index: 7,
            reason: FailureReason::NonFiniteScore("NaN".into()),
        };
        assert_eq!(f.to_string(), "index 7: score is not finite (NaN)");
    }

    #[test]
    fn stop_reason_prefers_cancel() {
        let control = UnitControl {
            cancel: Some(Arc::new(AtomicBool::new(true))),
            timeout: Some(Duration::ZERO),
        };
        assert_eq!(control.stop_reason(Instant::now()), Some(FailureReason::Cancelled));
        assert_eq!(UnitControl::default().stop_reason(Instant::now()), None);
    }
}
