//! LedgerLab Core: position ledger, exit triggers, streaming statistics and
//! the event recorder, plus the per-bar session that drives them.
//!
//! - Domain types (bars, orders, positions, exit legs)
//! - At most one open position, weighted-average cost basis, partial closes
//! - Take-profit / stop-loss legs evaluated against each bar's range
//! - Incremental statistics: equity, drawdown, streaks, win rates, Sharpe
//! - Append-only event history with a bounded recent window

pub mod domain;
pub mod engine;
pub mod events;
pub mod feed;
pub mod ledger;
pub mod sink;
pub mod stats;
pub mod strategy;
pub mod triggers;

pub use domain::{Bar, BarError, ExitKind, ExitLeg, LegSpec, Order, Position, PositionSide};
pub use engine::{EngineConfig, EngineError, EquityPoint, RunSummary, Session};
pub use events::{EventRecord, EventRecorder, EventSummary, EventType};
pub use feed::{CandleSource, VecSource};
pub use ledger::{CloseSize, LedgerError, OpenRequest, PositionDetails, PositionLedger, Sizing};
pub use sink::{ChannelSink, Frame, SnapshotSink};
pub use stats::{StatisticsAggregator, StatsSnapshot};
pub use strategy::{Desk, Strategy};
pub use triggers::{ExitPolicy, ExitTriggerEvaluator, LegFillPrice};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: engine types can move to a worker thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Bar>();
        require_sync::<Bar>();
        require_send::<Position>();
        require_sync::<Position>();
        require_send::<PositionLedger>();
        require_sync::<PositionLedger>();
        require_send::<EventRecorder>();
        require_sync::<EventRecorder>();
        require_send::<StatisticsAggregator>();
        require_sync::<StatisticsAggregator>();
        require_send::<StatsSnapshot>();
        require_sync::<StatsSnapshot>();
        require_send::<EventRecord>();
        require_sync::<EventRecord>();
        require_send::<Frame>();
        require_sync::<Frame>();
        require_send::<EngineConfig>();
        require_sync::<EngineConfig>();

        require_send::<Session>();
        require_send::<ChannelSink>();
    }

    /// Strategies reach the ledger only through a `Desk`; the trait has no
    /// method taking the ledger itself.
    #[test]
    fn strategy_trait_object_builds() {
        fn _check(s: &mut dyn Strategy, bar: &Bar, desk: &mut Desk<'_>) -> Result<(), EngineError> {
            s.on_bar(bar, desk)
        }
    }
}
