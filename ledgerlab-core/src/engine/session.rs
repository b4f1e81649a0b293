//! The per-bar pipeline.
//!
//! Each bar is processed to completion before the next is admitted:
//!
//! 1. Validate: OHLC sanity and strictly increasing timestamps.
//! 2. Triggers: fire resting take-profit then stop-loss legs.
//! 3. Strategy: open/close intents through the [`Desk`].
//! 4. Mark: unrealized PnL, equity and drawdown at the bar close.
//! 5. Publish: append an equity point, offer a frame to the sink.
//!
//! Any error halts the session; later calls return [`EngineError::Halted`].

use crate::domain::Bar;
use crate::engine::{EngineConfig, EngineError, EngineState};
use crate::events::EventRecord;
use crate::feed::CandleSource;
use crate::ledger::{PositionDetails, PositionLedger};
use crate::sink::{Frame, SnapshotSink};
use crate::stats::StatsSnapshot;
use crate::strategy::{Desk, Strategy};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// One point of the equity curve, taken after the bar was marked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub drawdown: f64,
}

/// What a single bar produced.
#[derive(Debug, Clone)]
pub struct BarOutcome {
    pub index: usize,
    /// Trigger events first, then strategy events, in emission order.
    pub events: Vec<EventRecord>,
    pub snapshot: StatsSnapshot,
}

/// End-of-run summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub bars: usize,
    pub events: usize,
    pub rejected_intents: usize,
    pub dropped_frames: usize,
    /// The stream was stopped by the cancel flag before it ended.
    pub cancelled: bool,
    pub stats: StatsSnapshot,
}

pub struct Session {
    config: EngineConfig,
    state: EngineState,
    equity_curve: Vec<EquityPoint>,
    sink: Option<Box<dyn SnapshotSink>>,
    dropped_frames: usize,
    last_bar: Option<Bar>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: EngineState::new(&config),
            config,
            equity_curve: Vec::new(),
            sink: None,
            dropped_frames: 0,
            last_bar: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.state.ledger
    }

    pub fn events(&self) -> &[EventRecord] {
        self.state.recorder.all()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// Open position marked at the last processed close.
    pub fn position_info(&self) -> Option<PositionDetails> {
        let bar = self.last_bar.as_ref()?;
        self.state.ledger.position_info(bar.close)
    }

    /// Run one bar through the pipeline.
    pub fn process_bar(
        &mut self,
        bar: Bar,
        strategy: &mut dyn Strategy,
    ) -> Result<BarOutcome, EngineError> {
        if self.state.halted {
            return Err(EngineError::Halted);
        }
        let result = self.step(bar, strategy);
        if let Err(e) = &result {
            self.state.halted = true;
            warn!(index = self.state.bar_index, error = %e, "session halted");
        }
        result
    }

    /// Drain `source` through the pipeline, then give the strategy its
    /// end-of-stream call.
    pub fn run(
        &mut self,
        source: &mut dyn CandleSource,
        strategy: &mut dyn Strategy,
    ) -> Result<RunSummary, EngineError> {
        self.run_until(source, strategy, &AtomicBool::new(false))
    }

    /// Like [`Session::run`], but checks `cancel` between bars and stops
    /// early once it is set.
    pub fn run_until(
        &mut self,
        source: &mut dyn CandleSource,
        strategy: &mut dyn Strategy,
        cancel: &AtomicBool,
    ) -> Result<RunSummary, EngineError> {
        info!(strategy = strategy.name(), bars = ?source.size_hint(), "run started");
        let mut cancelled = false;
        loop {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            let Some(next) = source.next_bar() else {
                break;
            };
            let bar = match next {
                Ok(bar) => bar,
                Err(e) => {
                    self.state.halted = true;
                    warn!(index = self.state.bar_index, error = %e, "candle source failed");
                    return Err(e);
                }
            };
            self.process_bar(bar, strategy)?;
        }
        if !cancelled {
            self.finish(strategy)?;
        }

        let summary = RunSummary {
            bars: self.state.bar_index,
            events: self.state.recorder.len(),
            rejected_intents: self.state.rejected_intents,
            dropped_frames: self.dropped_frames,
            cancelled,
            stats: self.snapshot(),
        };
        info!(
            bars = summary.bars,
            events = summary.events,
            positions = summary.stats.positions,
            total_pnl = summary.stats.total_pnl,
            cancelled,
            "run finished"
        );
        Ok(summary)
    }

    fn step(&mut self, bar: Bar, strategy: &mut dyn Strategy) -> Result<BarOutcome, EngineError> {
        let index = self.state.bar_index;
        let state = &mut self.state;

        state
            .validator
            .admit(&bar)
            .map_err(|source| EngineError::InvalidBar { index, source })?;

        let triggered = state
            .evaluator
            .evaluate(&mut state.ledger, &mut state.recorder, &bar)?;
        for event in &triggered.events {
            state.stats.on_event(event, &state.ledger);
        }
        let mut events = triggered.events;

        {
            let mut desk = Desk::new(
                &bar,
                &mut state.ledger,
                &mut state.recorder,
                &mut state.stats,
                &mut events,
                &mut state.rejected_intents,
            );
            strategy.on_bar(&bar, &mut desk)?;
        }

        state.stats.mark(&state.ledger, bar.close);
        let snapshot = state.stats.snapshot();
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: snapshot.equity,
            drawdown: snapshot.drawdown,
        });

        if let Some(sink) = self.sink.as_mut() {
            let frame = Frame {
                bar_index: index,
                bar,
                stats: snapshot,
                position: self.state.ledger.position_info(bar.close),
                recent_events: self.state.recorder.recent_vec(),
            };
            if !sink.push(frame) {
                self.dropped_frames += 1;
                warn!(index, dropped = self.dropped_frames, "snapshot frame dropped");
            }
        }

        debug!(index, at = %bar.timestamp, events = events.len(), equity = snapshot.equity, "bar processed");
        self.state.bar_index += 1;
        self.last_bar = Some(bar);
        Ok(BarOutcome {
            index,
            events,
            snapshot,
        })
    }

    fn finish(&mut self, strategy: &mut dyn Strategy) -> Result<(), EngineError> {
        let Some(bar) = self.last_bar else {
            return Ok(());
        };
        let state = &mut self.state;
        let mut events = Vec::new();
        let result = {
            let mut desk = Desk::new(
                &bar,
                &mut state.ledger,
                &mut state.recorder,
                &mut state.stats,
                &mut events,
                &mut state.rejected_intents,
            );
            strategy.on_finish(&mut desk)
        };
        if let Err(e) = result {
            state.halted = true;
            return Err(e);
        }
        if !events.is_empty() {
            state.stats.revalue(&state.ledger, bar.close);
            if let Some(point) = self.equity_curve.last_mut() {
                let snapshot = state.stats.snapshot();
                point.equity = snapshot.equity;
                point.drawdown = snapshot.drawdown;
            }
        }
        Ok(())
    }
}
