//! Export: JSON and CSV artifacts for a finished run.
//!
//! An artifact directory holds:
//! - `events.json`: `{ total_events, statistics, events }`
//! - `positions.json`: archived positions with their fills
//! - `stats.json`: the final statistics snapshot
//! - `equity.csv`: timestamp, equity, drawdown per bar
//! - `manifest.json`: run id, config and data provenance
//!
//! Non-finite floats (an unbounded profit factor) are written as `null`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ledgerlab_core::engine::EquityPoint;
use ledgerlab_core::events::{EventRecord, EventSummary};

use crate::config::{check_name, RunConfig, TIMESTAMP_FORMAT};
use crate::runner::{BacktestResult, SCHEMA_VERSION};

/// Shape of `events.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsExport {
    pub total_events: usize,
    pub statistics: EventSummary,
    pub events: Vec<EventRecord>,
}

/// Shape of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub run_id: String,
    pub name: String,
    pub symbol: String,
    pub strategy: String,
    pub dataset_hash: String,
    pub synthetic: bool,
    pub origin: String,
    pub bar_count: usize,
    pub config: RunConfig,
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_events_json(result: &BacktestResult) -> Result<String> {
    let export = EventsExport {
        total_events: result.events.len(),
        statistics: result.event_summary.clone(),
        events: result.events.clone(),
    };
    serde_json::to_string_pretty(&export).context("failed to serialize events")
}

/// Parse an `events.json`, checking the count against the event list.
pub fn import_events_json(json: &str) -> Result<EventsExport> {
    let export: EventsExport =
        serde_json::from_str(json).context("failed to deserialize events export")?;
    if export.total_events != export.events.len() {
        bail!(
            "events export claims {} events but holds {}",
            export.total_events,
            export.events.len()
        );
    }
    Ok(export)
}

pub fn export_positions_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(&result.closed_positions)
        .context("failed to serialize closed positions")
}

pub fn export_stats_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(&result.stats).context("failed to serialize statistics")
}

pub fn export_manifest_json(result: &BacktestResult, config: &RunConfig) -> Result<String> {
    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        run_id: result.run_id.clone(),
        name: result.name.clone(),
        symbol: result.symbol.clone(),
        strategy: result.strategy.clone(),
        dataset_hash: result.dataset_hash.clone(),
        synthetic: result.synthetic,
        origin: result.origin.clone(),
        bar_count: result.summary.bars,
        config: config.clone(),
    };
    serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: timestamp, equity, drawdown.
pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "drawdown"])?;
    for point in curve {
        wtr.write_record([
            &point.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            &format!("{:.6}", point.equity),
            &format!("{:.6}", point.drawdown),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the full artifact set under `output_dir/{name}_{run id prefix}/`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(
    result: &BacktestResult,
    config: &RunConfig,
    output_dir: &Path,
) -> Result<PathBuf> {
    config.validate().context("refusing to export an invalid run config")?;
    check_name(&result.name)?;
    let short_id = result.run_id.get(..12).unwrap_or(&result.run_id);
    let run_dir = output_dir.join(format!("{}_{}", result.name, short_id));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("events.json", export_events_json(result)?),
        ("positions.json", export_positions_json(result)?),
        ("stats.json", export_stats_json(result)?),
        ("equity.csv", export_equity_csv(&result.equity_curve)?),
        ("manifest.json", export_manifest_json(result, config)?),
    ];
    for (name, body) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(run_dir)
}

/// Read `events.json` from a file or an artifact directory.
pub fn load_events(path: &Path) -> Result<EventsExport> {
    let file = if path.is_dir() {
        path.join("events.json")
    } else {
        path.to_path_buf()
    };
    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    import_events_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn equity_csv_has_header_and_rows() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let csv = export_equity_csv(&[EquityPoint {
            timestamp: ts,
            equity: 1.5,
            drawdown: 0.25,
        }])
        .unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("timestamp,equity,drawdown"));
        assert_eq!(lines.next(), Some("2024-01-01 09:30:00,1.500000,0.250000"));
    }

    #[test]
    fn mismatched_event_count_is_rejected() {
        let json = r#"{"total_events": 2, "statistics": {"total_events": 0, "event_types": {}, "total_positions_opened": 0, "total_positions_closed": 0, "tp_hits": 0, "sl_hits": 0, "position_increases": 0}, "events": []}"#;
        assert!(import_events_json(json).is_err());
    }
}
