//! Single-run orchestration: config + bars in, a complete result out.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use ledgerlab_core::domain::Position;
use ledgerlab_core::engine::{EngineError, EquityPoint, RunSummary, Session};
use ledgerlab_core::events::{EventRecord, EventSummary};
use ledgerlab_core::feed::VecSource;
use ledgerlab_core::ledger::PositionDetails;
use ledgerlab_core::sink::SnapshotSink;
use ledgerlab_core::stats::StatsSnapshot;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{generate_synthetic, load_csv, LoadError, LoadedData};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub schema_version: u32,
    pub run_id: RunId,
    pub name: String,
    pub symbol: String,
    pub strategy: String,
    pub dataset_hash: String,
    pub synthetic: bool,
    pub origin: String,
    pub summary: RunSummary,
    pub stats: StatsSnapshot,
    pub event_summary: EventSummary,
    pub events: Vec<EventRecord>,
    pub closed_positions: Vec<Position>,
    /// Still open after the last bar, marked at its close.
    pub open_position: Option<PositionDetails>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Load bars (CSV when `bars_path` is given, synthetic otherwise) and run.
pub fn run_from_config(
    config: &RunConfig,
    bars_path: Option<&Path>,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let data = match bars_path {
        Some(path) => load_csv(path)?,
        None => generate_synthetic(&config.synthetic)?,
    };
    run_backtest(config, &data, None)
}

/// Run on pre-loaded bars, optionally streaming frames to `sink`.
pub fn run_backtest(
    config: &RunConfig,
    data: &LoadedData,
    sink: Option<Box<dyn SnapshotSink>>,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let run_id = config.run_id(&data.dataset_hash)?;
    info!(
        name = %config.name,
        symbol = %config.symbol,
        strategy = config.strategy.name(),
        bars = data.bars.len(),
        run_id = %run_id,
        "starting run"
    );

    let mut session = Session::new(config.engine);
    if let Some(sink) = sink {
        session = session.with_sink(sink);
    }
    let mut strategy = config.strategy.build();
    let mut source = VecSource::new(data.bars.clone());
    let summary = session.run(&mut source, strategy.as_mut())?;

    let recorder = &session.state().recorder;
    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        name: config.name.clone(),
        symbol: config.symbol.clone(),
        strategy: config.strategy.name().to_string(),
        dataset_hash: data.dataset_hash.clone(),
        synthetic: data.synthetic,
        origin: data.origin.clone(),
        summary,
        stats: summary.stats,
        event_summary: recorder.summary(),
        events: recorder.all().to_vec(),
        closed_positions: session.ledger().closed_positions().to_vec(),
        open_position: session.position_info(),
        equity_curve: session.equity_curve().to_vec(),
    })
}
