use crate::domain::BarError;
use crate::ledger::LedgerError;
use thiserror::Error;

/// Failures of the per-bar pipeline.
///
/// Every variant halts the session that produced it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bar {index} rejected: {source}")]
    InvalidBar {
        index: usize,
        #[source]
        source: BarError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("session halted by an earlier error")]
    Halted,

    #[error("candle source failed: {0}")]
    Source(String),

    #[error("strategy failed: {0}")]
    Strategy(String),
}
