//! LedgerLab CLI: run a backtest and inspect exported events.
//!
//! Commands:
//! - `run`: execute a run from a TOML config, on a CSV bar file or synthetic bars
//! - `inspect`: summarize an exported `events.json`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use ledgerlab_core::events::EventType;
use ledgerlab_runner::{load_events, run_from_config, save_artifacts, BacktestResult, RunConfig};

#[derive(Parser)]
#[command(
    name = "ledgerlab",
    about = "LedgerLab CLI: position ledger backtesting with streaming statistics"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a run from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// CSV bar file (open_time,open,high,low,close,volume).
        #[arg(long, conflicts_with = "synthetic")]
        bars: Option<PathBuf>,

        /// Generate this many synthetic bars instead of reading a file.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print results without writing artifacts.
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },
    /// Summarize an exported events file or artifact directory.
    Inspect {
        /// Path to events.json or to the artifact directory holding it.
        path: PathBuf,

        /// Number of most recent events to list.
        #[arg(long, default_value_t = 10)]
        last: usize,

        /// Only list events of this type (e.g. tp_hit).
        #[arg(long = "type")]
        event_type: Option<EventType>,

        /// Print the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            bars,
            synthetic,
            output_dir,
            no_export,
        } => run_cmd(config, bars, synthetic, output_dir, no_export),
        Commands::Inspect {
            path,
            last,
            event_type,
            json,
        } => inspect_cmd(path, last, event_type, json),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run_cmd(
    config_path: PathBuf,
    bars: Option<PathBuf>,
    synthetic: Option<usize>,
    output_dir: PathBuf,
    no_export: bool,
) -> Result<()> {
    let mut config = RunConfig::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(n) = synthetic {
        if n == 0 {
            bail!("--synthetic needs at least one bar");
        }
        config.synthetic.bars = n;
    }

    let result = run_from_config(&config, bars.as_deref())?;
    print_summary(&result);

    if !no_export {
        let run_dir = save_artifacts(&result, &config, &output_dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    println!();
    println!("=== Run Result ===");
    println!("Name:           {}", result.name);
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy);
    println!("Bars:           {}", result.summary.bars);
    println!("Events:         {}", result.summary.events);
    println!("Rejected:       {}", result.summary.rejected_intents);
    println!("Run id:         {}", result.run_id);
    println!();
    println!("--- Statistics ---");
    print!("{}", result.stats);
    if let Some(open) = &result.open_position {
        println!();
        println!(
            "Open position:  {} {:.4} @ {:.4} (unrealized {:.4})",
            open.side, open.quantity, open.avg_price, open.unrealized_pnl
        );
    }
    if result.synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
}

fn inspect_cmd(path: PathBuf, last: usize, event_type: Option<EventType>, json: bool) -> Result<()> {
    let export = load_events(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&export.statistics)?);
        return Ok(());
    }

    let s = &export.statistics;
    println!("=== Events: {} ===", export.total_events);
    println!("Positions opened: {}", s.total_positions_opened);
    println!("Positions closed: {}", s.total_positions_closed);
    println!("Increases:        {}", s.position_increases);
    println!("TP hits:          {}", s.tp_hits);
    println!("SL hits:          {}", s.sl_hits);
    println!();
    for (event_type, count) in &s.event_types {
        println!("{:16}{count}", event_type.as_str());
    }

    let selected: Vec<_> = export
        .events
        .iter()
        .filter(|e| event_type.map_or(true, |t| e.event_type == t))
        .collect();
    let tail = &selected[selected.len().saturating_sub(last)..];
    if !tail.is_empty() {
        println!();
        println!("--- Last {} ---", tail.len());
        for event in tail {
            println!(
                "{} {} {:<14} price={:.4} qty={:.4}",
                event.id, event.timestamp, event.event_type, event.price, event.quantity
            );
        }
    }
    Ok(())
}
