//! Candle sources: where the session pulls bars from, one at a time.

use crate::domain::Bar;
use crate::engine::EngineError;
use std::collections::VecDeque;

/// An ordered stream of bars.
///
/// `None` ends the stream. An `Err` item halts the session that reads it.
pub trait CandleSource {
    fn next_bar(&mut self) -> Option<Result<Bar, EngineError>>;

    /// Remaining bars, when known.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// In-memory source over preloaded bars.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    bars: VecDeque<Bar>,
}

impl VecSource {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into() }
    }
}

impl From<Vec<Bar>> for VecSource {
    fn from(bars: Vec<Bar>) -> Self {
        Self::new(bars)
    }
}

impl CandleSource for VecSource {
    fn next_bar(&mut self) -> Option<Result<Bar, EngineError>> {
        self.bars.pop_front().map(Ok)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.bars.len())
    }
}
