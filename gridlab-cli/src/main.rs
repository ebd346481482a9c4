//! GridLab CLI: parameter sweeps, single runs, and node-side unit evaluation.
//!
//! Commands:
//! - `sweep`: search every combination of a strategy template and rank them
//! - `run`: simulate one definition (the first combination of a template)
//! - `split`: write a template's work units as self-contained package files
//! - `unit`: evaluate one package file and print its report as JSON

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gridlab_core::algorithms::AlgorithmRegistry;
use gridlab_core::data::{InMemoryStorage, StockStorage};
use gridlab_core::definition::{parse_template, StrategyTemplate};
use gridlab_core::pipeline::Pipeline;
use gridlab_core::statistics::{LedgerStatistics, Statistics};
use gridlab_runner::{
    evaluate_package, load_dir, split, Coordinator, Evaluator, RankedEntry, SplitHint,
    SweepConfig, SweepOutcome, UnitControl, WorkPackage,
};

#[derive(Parser)]
#[command(name = "gridlab", about = "GridLab CLI: parameter-space search over daily backtests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every combination of a strategy template and rank them.
    Sweep {
        /// Strategy template in the execution-definition text format.
        #[arg(long)]
        definition: PathBuf,

        /// Directory of <SYMBOL>.csv files.
        #[arg(long)]
        data: PathBuf,

        /// Sweep config TOML. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the full outcome as JSON here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Simulate a single definition and print its statistics.
    Run {
        #[arg(long)]
        definition: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Split a template into work packages, one JSON file per unit.
    Split {
        #[arg(long)]
        definition: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory for unit-<n>.json files.
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Evaluate one work package (node-side role) and print the report.
    Unit {
        /// Package file written by `split`.
        #[arg(long)]
        package: PathBuf,

        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sweep {
            definition,
            data,
            config,
            output,
        } => run_sweep(&definition, &data, config.as_deref(), output.as_deref()),
        Commands::Run {
            definition,
            data,
            config,
        } => run_single(&definition, &data, config.as_deref()),
        Commands::Split {
            definition,
            config,
            out_dir,
        } => run_split(&definition, config.as_deref(), &out_dir),
        Commands::Unit {
            package,
            data,
            config,
        } => run_unit(&package, &data, config.as_deref()),
    }
}

// ─── Commands ────────────────────────────────────────────────────────

fn run_sweep(definition: &Path, data: &Path, config: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let template = load_template(definition)?;
    let storage = load_storage(data, &config)?;

    let coordinator = Coordinator::new(AlgorithmRegistry::with_builtins(), storage, &config)?;
    let outcome = coordinator.sweep(&template)?;
    print_outcome(&outcome);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        println!("Outcome saved to: {}", path.display());
    }
    if outcome.evaluated == 0 {
        bail!("no combination produced a score ({} failures)", outcome.failures.len());
    }
    Ok(())
}

fn run_single(definition: &Path, data: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let template = load_template(definition)?;
    let storage = load_storage(data, &config)?;

    let space = template.parameter_space()?;
    if space.size() > 1 {
        warn!(combinations = space.size(), "template has tunables, running the first combination");
    }
    let assignment = space.assignment(0)?;
    let definition = template.resolve(&assignment)?;
    info!(fingerprint = %definition.fingerprint(), "running definition");

    let stats = Pipeline::execute(
        definition,
        config.simulation_settings(),
        &AlgorithmRegistry::with_builtins(),
        storage.as_ref(),
        &LedgerStatistics,
    )?;
    let score = config.cost.build().calculate(&stats)?;

    print_statistics(&stats);
    println!("{:<16} {score:.6}", "score");
    Ok(())
}

fn run_split(definition: &Path, config: Option<&Path>, out_dir: &Path) -> Result<()> {
    let config = load_config(config)?;
    let template = load_template(definition)?;
    let space = template.parameter_space()?;

    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let units = split(&space, SplitHint::Units(config.units))?;
    for (i, unit) in units.iter().enumerate() {
        let package = WorkPackage::new(template.clone(), unit.clone())?;
        let path = out_dir.join(format!("unit-{i}.json"));
        std::fs::write(&path, package.to_bytes()?).with_context(|| format!("write {}", path.display()))?;
    }
    println!(
        "Wrote {} packages covering {} combinations to {}",
        units.len(),
        space.size(),
        out_dir.display()
    );
    Ok(())
}

fn run_unit(package: &Path, data: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let bytes = std::fs::read(package).with_context(|| format!("read {}", package.display()))?;
    let package = WorkPackage::from_bytes(&bytes)?;
    let storage = load_storage(data, &config)?;

    let evaluator = Evaluator::new(
        Arc::new(AlgorithmRegistry::with_builtins()),
        storage,
        config.cost.build(),
        config.simulation_settings(),
    );
    let control = UnitControl {
        cancel: None,
        timeout: config.unit_timeout(),
    };
    let report = evaluate_package(&package, &evaluator, &control);
    info!(
        scored = report.scored.len(),
        failed = report.failures.len(),
        "unit evaluated"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<SweepConfig> {
    match path {
        Some(p) => SweepConfig::from_file(p).with_context(|| format!("load config {}", p.display())),
        None => Ok(SweepConfig::default()),
    }
}

fn load_template(path: &Path) -> Result<StrategyTemplate> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_template(&text).with_context(|| format!("parse {}", path.display()))
}

fn load_storage(dir: &Path, config: &SweepConfig) -> Result<Arc<dyn StockStorage>> {
    let storage: InMemoryStorage = load_dir(dir, config.symbols.as_deref())?;
    Ok(Arc::new(storage))
}

fn print_outcome(outcome: &SweepOutcome) {
    println!("Config {}", outcome.config_id);
    println!(
        "Evaluated {}/{} combinations ({} failed{}) in {:.1}s",
        outcome.evaluated,
        outcome.total,
        outcome.failures.len(),
        if outcome.cancelled { ", cancelled" } else { "" },
        outcome.elapsed_secs
    );
    println!();
    println!("{:<5} {:>8} {:>12}  assignment", "rank", "index", "score");
    for (rank, entry) in outcome.ranking.iter().enumerate() {
        print_entry(rank + 1, entry);
    }
    for failure in outcome.failures.iter().take(10) {
        println!("  failed {failure}");
    }
    if outcome.failures.len() > 10 {
        println!("  ... and {} more failures", outcome.failures.len() - 10);
    }
}

fn print_entry(rank: usize, entry: &RankedEntry) {
    println!("{rank:<5} {:>8} {:>12.6}  {}", entry.index, entry.score, entry.assignment);
}

fn print_statistics(stats: &Statistics) {
    for name in stats.names() {
        match stats.metric(name) {
            Ok(value) => println!("{name:<16} {value:.6}"),
            Err(_) => println!("{name:<16} -"),
        }
    }
}
