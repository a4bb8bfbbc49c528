// -----------------------------------------------------------------------------
// chunkbench - benchmark read patterns against differently chunked array layouts
// -----------------------------------------------------------------------------

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use chunkbench::config::{Config, WorkerCount};
use chunkbench::coordinator::{RunCoordinator, RunState};
use chunkbench::discovery::discover_layouts;
use chunkbench::report::TsvExporter;
use chunkbench::store::{DirectoryStore, UriAccessor};
use chunkbench::strategy::{layout_segment, LayoutLabel};

// -----------------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------------
#[derive(Parser)]
#[command(name = "chunkbench", version, about = "Benchmark read patterns against chunked array layouts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Benchmark the configured task against every strategy
    ///
    /// Examples:
    ///   chunkbench run --config bench.yaml
    ///   chunkbench -v run --config bench.yaml --workers 4 --results-tsv out/metrics.tsv
    Run {
        #[arg(long)]
        config: PathBuf,

        /// Override worker count from the config
        #[arg(long)]
        workers: Option<usize>,

        /// Override trials per strategy
        #[arg(long)]
        trials: Option<usize>,

        /// Output TSV (defaults to `output` in the config, then <task>-metrics.tsv)
        #[arg(long, value_name = "PATH")]
        results_tsv: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Write one directory store per configured layout, filled with synthetic data
    Prepare {
        #[arg(long)]
        config: PathBuf,

        /// Directory receiving the layout sub-directories
        #[arg(long)]
        root: PathBuf,
    },

    /// List layouts found under a directory
    List {
        /// `file://` URI or path
        #[arg(long)]
        uri: String,

        /// Glob on layout directory names
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::new(format!("chunkbench={}", level));
    fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { config, workers, trials, results_tsv, no_progress } => {
            run_cmd(&config, workers, trials, results_tsv, no_progress)?
        }
        Commands::Prepare { config, root } => prepare_cmd(&config, &root)?,
        Commands::List { uri, filter } => list_cmd(&uri, filter.as_deref())?,
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------
fn run_cmd(
    config: &Path,
    workers: Option<usize>,
    trials: Option<usize>,
    results_tsv: Option<PathBuf>,
    no_progress: bool,
) -> Result<()> {
    let mut cfg = Config::load(config).with_context(|| format!("Failed to load config {}", config.display()))?;
    if let Some(w) = workers {
        cfg.workers = WorkerCount::Manual(w);
    }
    if let Some(t) = trials {
        cfg.num_trials = t;
    }
    cfg.validate().context("Invalid configuration")?;

    let task = cfg.task.to_task()?;
    let locators = cfg.locators().context("Failed to collect strategies")?;
    if locators.is_empty() {
        bail!("No strategies to benchmark");
    }
    info!("Benchmarking {} over {} strategies", task.name(), locators.len());

    let accessor = Arc::new(UriAccessor::new(cfg.dataset.clone()));
    let mut coordinator = RunCoordinator::new(accessor, cfg.run_options(!no_progress));
    let report = coordinator.run_benchmark(&locators, &task).context("Benchmark run failed")?;

    let out = results_tsv
        .or_else(|| cfg.output.clone())
        .unwrap_or_else(|| PathBuf::from(format!("{}-metrics.tsv", task.name())));
    TsvExporter::new(&out)
        .export(&report.table)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("Rows:     {}", report.table.len());
    println!("Skipped:  {}", report.skipped.len());
    for skip in &report.skipped {
        println!("  {} ({})", skip.locator, skip.error);
    }
    if report.state == RunState::Cancelled {
        println!("Cancelled: {}", report.cancelled.len());
    }
    println!("Elapsed:  {:.2}s", report.elapsed.as_secs_f64());
    println!("Results:  {}", out.display());

    if report.state == RunState::PartiallyFailed {
        warn!("{} strategies were skipped", report.skipped.len());
    }
    Ok(())
}

fn prepare_cmd(config: &Path, root: &Path) -> Result<()> {
    let cfg = Config::load(config).with_context(|| format!("Failed to load config {}", config.display()))?;
    if cfg.strategies.is_empty() {
        bail!("`strategies` lists no layouts to prepare");
    }

    for locator in &cfg.strategies {
        let label = LayoutLabel::parse(layout_segment(locator))?;
        let dir = DirectoryStore::write_synthetic(root, &cfg.dataset, label.chunks())
            .with_context(|| format!("Failed to write layout {}", label))?;
        println!("{}", dir.display());
    }
    Ok(())
}

fn list_cmd(uri: &str, filter: Option<&str>) -> Result<()> {
    for locator in discover_layouts(uri, filter)? {
        println!("{}", locator);
    }
    Ok(())
}
