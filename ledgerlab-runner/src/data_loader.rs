//! Bar loading for the runner.
//!
//! Two sources:
//! 1. A CSV file with `open_time,open,high,low,close,volume` columns (extra
//!    columns are ignored), timestamps formatted `%Y-%m-%d %H:%M:%S`.
//! 2. A seeded random walk, for runs without a bar file.
//!
//! Loading only parses. OHLC and ordering checks happen in the engine, which
//! halts the run on the first bad bar.

use chrono::{Duration, NaiveDateTime};
use ledgerlab_core::domain::Bar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, SyntheticConfig, TIMESTAMP_FORMAT};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("open bar file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("read bar CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: bad timestamp {value:?}: {source}")]
    Timestamp {
        row: usize,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("bar file {0} has no rows")]
    Empty(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Loaded bars with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub bars: Vec<Bar>,
    /// BLAKE3 over every bar, for run fingerprinting.
    pub dataset_hash: String,
    pub synthetic: bool,
    /// File path, or `synthetic`.
    pub origin: String,
}

impl LoadedData {
    fn new(bars: Vec<Bar>, synthetic: bool, origin: String) -> Self {
        let dataset_hash = dataset_hash(&bars);
        Self {
            bars,
            dataset_hash,
            synthetic,
            origin,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    open_time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Load bars from a CSV file.
pub fn load_csv(path: &Path) -> Result<LoadedData, LoadError> {
    let reader = csv::Reader::from_path(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_rows(reader)?;
    if bars.is_empty() {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    info!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(LoadedData::new(bars, false, path.display().to_string()))
}

/// Parse bars from any CSV reader with a header row.
pub fn parse_csv<R: Read>(input: R) -> Result<Vec<Bar>, LoadError> {
    read_rows(csv::Reader::from_reader(input))
}

fn read_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<Bar>, LoadError> {
    let mut bars = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let timestamp = NaiveDateTime::parse_from_str(row.open_time.trim(), TIMESTAMP_FORMAT)
            .map_err(|source| LoadError::Timestamp {
                row: i + 1,
                value: row.open_time.clone(),
                source,
            })?;
        bars.push(Bar::new(
            timestamp, row.open, row.high, row.low, row.close, row.volume,
        ));
    }
    Ok(bars)
}

/// Generate a seeded random walk.
///
/// Same config, same bars. Each bar opens at the previous close, so the walk
/// has no gaps.
pub fn generate_synthetic(config: &SyntheticConfig) -> Result<LoadedData, LoadError> {
    config.validate()?;
    let start = config.start_time()?;
    let step = Duration::minutes(config.interval_minutes);
    let vol = config.volatility;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut bars = Vec::with_capacity(config.bars);
    let mut price = config.start_price;
    let mut timestamp = start;
    for _ in 0..config.bars {
        let ret: f64 = rng.gen_range(-vol..vol);
        let open = price;
        let close = (price * (1.0 + ret)).max(f64::EPSILON);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0));
        let volume = rng.gen_range(100.0..10_000.0);
        bars.push(Bar::new(timestamp, open, high, low, close, volume));
        price = close;
        timestamp += step;
    }
    info!(bars = bars.len(), seed = config.seed, "generated synthetic bars");
    Ok(LoadedData::new(bars, true, "synthetic".to_string()))
}

/// Deterministic BLAKE3 hash over timestamps and OHLCV values.
pub fn dataset_hash(bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(bar.timestamp.to_string().as_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
