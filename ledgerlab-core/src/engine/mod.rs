//! Per-bar engine: configuration, state and the session pipeline.

pub mod error;
pub mod session;
pub mod state;

pub use error::EngineError;
pub use session::{BarOutcome, EquityPoint, RunSummary, Session};
pub use state::{EngineConfig, EngineState};
