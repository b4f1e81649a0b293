//! Bar: the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems that make a bar unusable.
///
/// A malformed bar halts the run; skipping it would desynchronize the ledger
/// from the real price path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar at {timestamp} has a non-finite {field}")]
    NonFinite {
        timestamp: NaiveDateTime,
        field: &'static str,
    },

    #[error("bar at {timestamp}: high {high} is below low {low}")]
    HighBelowLow {
        timestamp: NaiveDateTime,
        high: f64,
        low: f64,
    },

    #[error("bar at {timestamp}: open {open} outside [{low}, {high}]")]
    OpenOutOfRange {
        timestamp: NaiveDateTime,
        open: f64,
        low: f64,
        high: f64,
    },

    #[error("bar at {timestamp}: close {close} outside [{low}, {high}]")]
    CloseOutOfRange {
        timestamp: NaiveDateTime,
        close: f64,
        low: f64,
        high: f64,
    },

    #[error("bar at {timestamp} has negative volume {volume}")]
    NegativeVolume {
        timestamp: NaiveDateTime,
        volume: f64,
    },

    #[error("timestamp {timestamp} does not follow previous bar at {previous}")]
    NonMonotonicTimestamp {
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },
}

/// One OHLCV observation over a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check the OHLC range in isolation. Timestamp ordering is checked by
    /// [`BarValidator`] since it needs the previous bar.
    pub fn validate(&self) -> Result<(), BarError> {
        let timestamp = self.timestamp;
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(BarError::NonFinite { timestamp, field });
            }
        }
        if self.low > self.high {
            return Err(BarError::HighBelowLow {
                timestamp,
                high: self.high,
                low: self.low,
            });
        }
        if !self.contains(self.open) {
            return Err(BarError::OpenOutOfRange {
                timestamp,
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }
        if !self.contains(self.close) {
            return Err(BarError::CloseOutOfRange {
                timestamp,
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        if self.volume < 0.0 {
            return Err(BarError::NegativeVolume {
                timestamp,
                volume: self.volume,
            });
        }
        Ok(())
    }

    /// Whether `price` lies inside the bar's low/high range (inclusive).
    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Validates a stream of bars: per-bar OHLC sanity plus strictly increasing
/// timestamps.
#[derive(Debug, Clone, Default)]
pub struct BarValidator {
    last_timestamp: Option<NaiveDateTime>,
}

impl BarValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `bar` against the previous accepted bar. The bar is only
    /// remembered when it passes.
    pub fn admit(&mut self, bar: &Bar) -> Result<(), BarError> {
        bar.validate()?;
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(BarError::NonMonotonicTimestamp {
                    timestamp: bar.timestamp,
                    previous,
                });
            }
        }
        self.last_timestamp = Some(bar.timestamp);
        Ok(())
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }
}
