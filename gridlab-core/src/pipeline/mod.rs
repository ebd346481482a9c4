//! Execution pipeline: one simulation of one concrete definition.
//!
//! Lifecycle:
//!
//! ```text
//! Unloaded ──initialize──▶ Initialized ──run──▶ Running ──▶ Finished
//!     │                                            │
//!     └──────────────── error ───────────▶ Failed ◀┘
//! ```
//!
//! A pipeline owns all of its mutable state (cursors, algorithm instances,
//! ledger) and only reads shared storage, so independent pipelines can run
//! concurrently.

pub mod broker;
pub mod graph;
pub mod ledger;
pub mod signals;

pub use broker::Broker;
pub use graph::{ChainBlueprint, EodSlot, ExecutionGraph, NodeId, StockChain};
pub use ledger::{ClosedTrade, Ledger, LedgerError, Position, RunRecord, Side};
pub use signals::{EodContext, SignalStore};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algorithms::{AlgorithmError, AlgorithmRegistry};
use crate::data::{AlignmentError, StockStorage};
use crate::definition::{ConfigError, ExecutionDefinition};
use crate::statistics::{Statistics, StatisticsProvider};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pipeline is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: PipelineState,
        actual: PipelineState,
    },
    #[error("symbol {symbol} is not in storage")]
    UnknownSymbol { symbol: String },
    #[error(
        "algorithm {algorithm} in execution {execution} failed on {date}{}: {source}",
        for_symbol(.symbol)
    )]
    Algorithm {
        execution: String,
        algorithm: String,
        symbol: Option<String>,
        date: NaiveDate,
        #[source]
        source: AlgorithmError,
    },
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error("closing positions failed: {0}")]
    Ledger(#[from] LedgerError),
}

fn for_symbol(symbol: &Option<String>) -> String {
    symbol.as_ref().map(|s| format!(" for {s}")).unwrap_or_default()
}

// ─── Settings ────────────────────────────────────────────────────────

/// Date range, symbol selection, and starting cash for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// `None` binds every symbol in storage.
    pub symbols: Option<Vec<String>>,
    pub initial_capital: f64,
}

impl SimulationSettings {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            symbols: None,
            initial_capital: 100_000.0,
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn with_initial_capital(mut self, capital: f64) -> Self {
        self.initial_capital = capital;
        self
    }
}

// ─── Pipeline ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Unloaded,
    Initialized,
    Running,
    Finished,
    Failed,
}

pub struct Pipeline {
    definition: ExecutionDefinition,
    settings: SimulationSettings,
    state: PipelineState,
    graph: Option<ExecutionGraph>,
}

impl Pipeline {
    pub fn new(definition: ExecutionDefinition, settings: SimulationSettings) -> Self {
        Self {
            definition,
            settings,
            state: PipelineState::Unloaded,
            graph: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn definition(&self) -> &ExecutionDefinition {
        &self.definition
    }

    /// Unloaded → Initialized: resolve every algorithm name and build the graph.
    pub fn initialize(&mut self, registry: &AlgorithmRegistry) -> Result<(), RunError> {
        self.expect_state(PipelineState::Unloaded)?;
        match ExecutionGraph::build(&self.definition, registry) {
            Ok(graph) => {
                self.graph = Some(graph);
                self.state = PipelineState::Initialized;
                Ok(())
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                Err(e.into())
            }
        }
    }

    /// Initialized → Running → Finished: simulate and compute statistics.
    pub fn run(
        &mut self,
        storage: &dyn StockStorage,
        provider: &dyn StatisticsProvider,
    ) -> Result<Statistics, RunError> {
        self.expect_state(PipelineState::Initialized)?;
        let Some(graph) = self.graph.take() else {
            self.state = PipelineState::Failed;
            return Err(RunError::InvalidState {
                expected: PipelineState::Initialized,
                actual: PipelineState::Unloaded,
            });
        };
        self.state = PipelineState::Running;

        let result = Broker::bind(graph, storage, &self.settings).and_then(|broker| {
            debug!(
                fingerprint = %self.definition.fingerprint(),
                dates = broker.date_count(),
                "simulation started"
            );
            broker.run()
        });

        match result {
            Ok(record) => {
                self.state = PipelineState::Finished;
                debug!(trades = record.trades.len(), "simulation finished");
                Ok(provider.statistics(&record))
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                warn!(error = %e, "simulation failed");
                Err(e)
            }
        }
    }

    /// Build, initialize, and run in one call.
    pub fn execute(
        definition: ExecutionDefinition,
        settings: SimulationSettings,
        registry: &AlgorithmRegistry,
        storage: &dyn StockStorage,
        provider: &dyn StatisticsProvider,
    ) -> Result<Statistics, RunError> {
        let mut pipeline = Self::new(definition, settings);
        pipeline.initialize(registry)?;
        pipeline.run(storage, provider)
    }

    fn expect_state(&self, expected: PipelineState) -> Result<(), RunError> {
        if self.state != expected {
            return Err(RunError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
