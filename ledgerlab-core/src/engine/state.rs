//! Engine configuration and the state advanced together bar by bar.

use crate::domain::BarValidator;
use crate::events::{EventRecorder, DEFAULT_RECENT_CAPACITY};
use crate::ledger::PositionLedger;
use crate::stats::{SharpeFeePolicy, StatisticsAggregator, StatsConfig, DEFAULT_SHARPE_WINDOW};
use crate::triggers::{ExitPolicy, ExitTriggerEvaluator, LegFillPrice};
use serde::{Deserialize, Serialize};

/// Configuration for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of the recorder's recent-events window.
    pub recent_events: usize,
    /// Capacity of the Sharpe ring.
    pub sharpe_window: usize,
    pub sharpe_fees: SharpeFeePolicy,
    pub leg_fill: LegFillPrice,
    pub leg_exit_fee: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recent_events: DEFAULT_RECENT_CAPACITY,
            sharpe_window: DEFAULT_SHARPE_WINDOW,
            sharpe_fees: SharpeFeePolicy::Net,
            leg_fill: LegFillPrice::Trigger,
            leg_exit_fee: 0.0,
        }
    }
}

impl EngineConfig {
    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig {
            sharpe_window: self.sharpe_window,
            sharpe_fees: self.sharpe_fees,
        }
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            leg_fill: self.leg_fill,
            leg_exit_fee: self.leg_exit_fee,
        }
    }
}

/// Mutable state that evolves bar by bar.
///
/// The ledger is the only owner of the open position; every other part reads
/// it through the ledger.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub ledger: PositionLedger,
    pub recorder: EventRecorder,
    pub stats: StatisticsAggregator,
    pub evaluator: ExitTriggerEvaluator,
    pub validator: BarValidator,
    /// Bars fully processed so far.
    pub bar_index: usize,
    /// Strategy intents the ledger refused.
    pub rejected_intents: usize,
    pub halted: bool,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ledger: PositionLedger::new(),
            recorder: EventRecorder::new(config.recent_events),
            stats: StatisticsAggregator::new(config.stats_config()),
            evaluator: ExitTriggerEvaluator::new(config.exit_policy()),
            validator: BarValidator::new(),
            bar_index: 0,
            rejected_intents: 0,
            halted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_engine_fields_take_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"sharpe_fees":"gross"}"#).unwrap();
        assert_eq!(config.sharpe_fees, SharpeFeePolicy::Gross);
        assert_eq!(config.recent_events, DEFAULT_RECENT_CAPACITY);
        assert_eq!(config.leg_fill, LegFillPrice::Trigger);
    }

    #[test]
    fn state_takes_capacities_from_config() {
        let config = EngineConfig {
            recent_events: 7,
            sharpe_window: 3,
            ..EngineConfig::default()
        };
        let state = EngineState::new(&config);
        assert_eq!(state.recorder.recent_capacity(), 7);
        assert_eq!(state.stats.sharpe_window().capacity(), 3);
        assert!(!state.halted);
    }
}
