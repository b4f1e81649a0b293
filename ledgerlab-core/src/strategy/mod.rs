//! Strategy boundary: code outside the engine that turns bars into open and
//! close intents.
//!
//! Strategies never see the ledger directly. They act through a [`Desk`],
//! which applies each intent, feeds the resulting event to the statistics and
//! records rejections.

pub mod examples;

pub use examples::{DonchianBreakout, PriceTrigger};

use crate::domain::{Bar, Position};
use crate::engine::EngineError;
use crate::events::{EventRecord, EventRecorder};
use crate::ledger::{CloseSize, LedgerError, OpenRequest, PositionDetails, PositionLedger};
use crate::stats::StatisticsAggregator;
use tracing::warn;

pub trait Strategy: Send {
    /// Name for manifests and logs.
    fn name(&self) -> &str;

    /// Called once per bar, after resting exit legs have been evaluated.
    fn on_bar(&mut self, bar: &Bar, desk: &mut Desk<'_>) -> Result<(), EngineError>;

    /// Called once after the last bar of the stream.
    fn on_finish(&mut self, _desk: &mut Desk<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// The strategy's handle on the engine for one bar.
pub struct Desk<'a> {
    bar: &'a Bar,
    ledger: &'a mut PositionLedger,
    recorder: &'a mut EventRecorder,
    stats: &'a mut StatisticsAggregator,
    events: &'a mut Vec<EventRecord>,
    rejected: &'a mut usize,
}

impl<'a> Desk<'a> {
    pub(crate) fn new(
        bar: &'a Bar,
        ledger: &'a mut PositionLedger,
        recorder: &'a mut EventRecorder,
        stats: &'a mut StatisticsAggregator,
        events: &'a mut Vec<EventRecord>,
        rejected: &'a mut usize,
    ) -> Self {
        Self {
            bar,
            ledger,
            recorder,
            stats,
            events,
            rejected,
        }
    }

    pub fn bar(&self) -> &Bar {
        self.bar
    }

    /// Open or increase at the bar close.
    ///
    /// A rejected request leaves every piece of engine state untouched.
    pub fn open(&mut self, request: &OpenRequest) -> Result<EventRecord, LedgerError> {
        match self.ledger.open(self.recorder, self.bar, request) {
            Ok(event) => Ok(self.accept(event)),
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Close some or all of the open position at the bar close.
    pub fn close(&mut self, size: CloseSize, fees: f64) -> Result<Option<EventRecord>, LedgerError> {
        match self.ledger.close(self.recorder, self.bar, size, fees) {
            Ok(event) => Ok(event.map(|event| self.accept(event))),
            Err(e) => Err(self.reject(e)),
        }
    }

    pub fn close_all(&mut self, fees: f64) -> Result<Option<EventRecord>, LedgerError> {
        self.close(CloseSize::All, fees)
    }

    pub fn position(&self) -> Option<&Position> {
        self.ledger.position()
    }

    pub fn has_position(&self) -> bool {
        self.ledger.has_position()
    }

    /// View of the open position marked at the bar close.
    pub fn position_info(&self) -> Option<PositionDetails> {
        self.ledger.position_info(self.bar.close)
    }

    fn accept(&mut self, event: EventRecord) -> EventRecord {
        self.stats.on_event(&event, self.ledger);
        self.events.push(event.clone());
        event
    }

    fn reject(&mut self, error: LedgerError) -> LedgerError {
        *self.rejected += 1;
        warn!(at = %self.bar.timestamp, error = %error, "strategy intent rejected");
        error
    }
}
