//! Run configuration: a TOML file naming the instrument, the engine knobs,
//! the strategy and the synthetic-data fallback.

use chrono::NaiveDateTime;
use ledgerlab_core::domain::{LegSpec, PositionSide};
use ledgerlab_core::ledger::{OpenRequest, Sizing};
use ledgerlab_core::strategy::{DonchianBreakout, PriceTrigger, Strategy};
use ledgerlab_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

/// Timestamp format shared by the CSV loader and the synthetic start time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serializable configuration for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default)]
    pub engine: EngineConfig,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

fn default_name() -> String {
    "run".to_string()
}

fn default_symbol() -> String {
    "SYNTH".to_string()
}

impl RunConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject configs the engine would only fail on later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_name(&self.name)?;
        let e = &self.engine;
        if e.recent_events == 0 {
            return invalid("engine.recent_events must be > 0");
        }
        if e.sharpe_window == 0 {
            return invalid("engine.sharpe_window must be > 0");
        }
        check_fee("engine.leg_exit_fee", e.leg_exit_fee)?;
        self.strategy.validate()?;
        self.synthetic.validate()
    }

    /// Deterministic BLAKE3 hash of the canonical JSON config plus the
    /// dataset hash. Two runs with identical inputs share a run id.
    pub fn run_id(&self, dataset_hash: &str) -> Result<RunId, ConfigError> {
        // `Value` objects are key-sorted, which makes the JSON canonical.
        let canonical = serde_json::to_value(self)?.to_string();
        let mut hasher = blake3::Hasher::new();
        hasher.update(canonical.as_bytes());
        hasher.update(dataset_hash.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Strategy selection (serializable enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    /// Open a preset request once a bar touches `level`.
    PriceTrigger {
        level: f64,
        side: PositionSide,
        sizing: Sizing,
        #[serde(default)]
        take_profit: Vec<LegSpec>,
        #[serde(default)]
        stop_loss: Vec<LegSpec>,
        #[serde(default)]
        fees: f64,
        #[serde(default)]
        repeat: bool,
    },

    /// Channel breakout with percentage brackets.
    DonchianBreakout {
        period: usize,
        sizing: Sizing,
        #[serde(default)]
        take_profit_pct: f64,
        #[serde(default)]
        stop_loss_pct: f64,
        #[serde(default)]
        fees: f64,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::PriceTrigger { .. } => "price_trigger",
            StrategyConfig::DonchianBreakout { .. } => "donchian_breakout",
        }
    }

    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::PriceTrigger {
                level,
                side,
                sizing,
                take_profit,
                stop_loss,
                fees,
                repeat,
            } => {
                let request = OpenRequest {
                    side: *side,
                    sizing: *sizing,
                    take_profit: take_profit.clone(),
                    stop_loss: stop_loss.clone(),
                    fees: *fees,
                };
                Box::new(PriceTrigger::new(*level, request).repeating(*repeat))
            }
            StrategyConfig::DonchianBreakout {
                period,
                sizing,
                take_profit_pct,
                stop_loss_pct,
                fees,
            } => Box::new(
                DonchianBreakout::new(*period, *sizing, *take_profit_pct, *stop_loss_pct)
                    .with_fees(*fees),
            ),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::PriceTrigger {
                level,
                sizing,
                take_profit,
                stop_loss,
                fees,
                ..
            } => {
                check_positive("strategy.level", *level)?;
                check_sizing(sizing)?;
                check_fee("strategy.fees", *fees)?;
                for leg in take_profit.iter().chain(stop_loss) {
                    check_positive("strategy leg trigger_price", leg.trigger_price)?;
                    if !(leg.fraction.is_finite() && leg.fraction > 0.0 && leg.fraction <= 1.0) {
                        return invalid(format!(
                            "strategy leg fraction must be in (0, 1], got {}",
                            leg.fraction
                        ));
                    }
                }
                Ok(())
            }
            StrategyConfig::DonchianBreakout {
                period,
                sizing,
                take_profit_pct,
                stop_loss_pct,
                fees,
            } => {
                if *period == 0 {
                    return invalid("strategy.period must be > 0");
                }
                check_sizing(sizing)?;
                check_fee("strategy.fees", *fees)?;
                check_fee("strategy.take_profit_pct", *take_profit_pct)?;
                check_fee("strategy.stop_loss_pct", *stop_loss_pct)?;
                if *stop_loss_pct >= 1.0 {
                    return invalid("strategy.stop_loss_pct must be < 1");
                }
                Ok(())
            }
        }
    }
}

/// Seeded random-walk bars, used when no bar file is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntheticConfig {
    pub bars: usize,
    pub seed: u64,
    pub start_price: f64,
    /// Maximum absolute per-bar return.
    pub volatility: f64,
    pub interval_minutes: i64,
    /// First bar timestamp, `%Y-%m-%d %H:%M:%S`.
    pub start: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            bars: 500,
            seed: 42,
            start_price: 100.0,
            volatility: 0.01,
            interval_minutes: 60,
            start: "2024-01-01 00:00:00".to_string(),
        }
    }
}

impl SyntheticConfig {
    pub fn start_time(&self) -> Result<NaiveDateTime, ConfigError> {
        NaiveDateTime::parse_from_str(&self.start, TIMESTAMP_FORMAT).map_err(|e| {
            ConfigError::Invalid(format!("synthetic.start {:?}: {e}", self.start))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("synthetic.start_price", self.start_price)?;
        check_positive("synthetic.volatility", self.volatility)?;
        if self.volatility >= 1.0 {
            return invalid("synthetic.volatility must be < 1");
        }
        if self.interval_minutes <= 0 {
            return invalid("synthetic.interval_minutes must be > 0");
        }
        self.start_time().map(|_| ())
    }
}

/// The run name becomes an artifact directory name, so it must stay a single
/// path component.
pub(crate) fn check_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return invalid(format!("name {name:?} must be a plain directory name"));
    }
    Ok(())
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

fn check_positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        invalid(format!("{field} must be finite and > 0, got {value}"))
    }
}

fn check_fee(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        invalid(format!("{field} must be finite and >= 0, got {value}"))
    }
}

fn check_sizing(sizing: &Sizing) -> Result<(), ConfigError> {
    match *sizing {
        Sizing::Quantity { qty } => check_positive("strategy.sizing.qty", qty),
        Sizing::Value { value } => check_positive("strategy.sizing.value", value),
    }
}
