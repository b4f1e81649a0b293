//! LedgerLab Runner: run orchestration on top of `ledgerlab-core`.
//!
//! - TOML run configuration and strategy construction
//! - CSV bar loading and seeded synthetic bars
//! - Single-run execution with a deterministic run id
//! - JSON/CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;

pub use config::{ConfigError, RunConfig, RunId, StrategyConfig, SyntheticConfig};
pub use data_loader::{generate_synthetic, load_csv, parse_csv, LoadError, LoadedData};
pub use export::{load_events, save_artifacts, EventsExport, Manifest};
pub use runner::{run_backtest, run_from_config, BacktestResult, RunError, SCHEMA_VERSION};
