//! Exit trigger evaluation: decides which resting take-profit / stop-loss
//! legs a bar's high/low range fires, and closes them through the ledger.
//!
//! Evaluation order is fixed: every take-profit leg in stored order, then every
//! stop-loss leg in stored order. OHLC bars carry no intrabar path, so when one
//! bar reaches both a take-profit and a stop-loss the take-profit wins. That is
//! a modeling policy, not a reconstruction of what the market did; changing it
//! changes historical results.

use crate::domain::{Bar, ExitKind, ExitLeg, PositionSide};
use crate::events::{EventDetail, EventRecord, EventRecorder, EventType};
use crate::ledger::{validate_fees, LedgerError, PositionLedger};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Price at which a fired leg is filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegFillPrice {
    /// The leg's own trigger price.
    #[default]
    Trigger,
    /// The bar's close, regardless of where the leg sat.
    BarClose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPolicy {
    pub leg_fill: LegFillPrice,
    /// Fee charged on each leg fill.
    pub leg_exit_fee: f64,
}

impl ExitPolicy {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_fees(self.leg_exit_fee)
    }
}

/// Whether a bar's range reaches a leg.
///
/// A long take-profit needs the high to reach up to it, a long stop-loss needs
/// the low to reach down to it; shorts mirror both.
pub fn leg_triggered(kind: ExitKind, side: PositionSide, trigger_price: f64, bar: &Bar) -> bool {
    match (kind, side) {
        (ExitKind::TakeProfit, PositionSide::Long) | (ExitKind::StopLoss, PositionSide::Short) => {
            bar.high >= trigger_price
        }
        (ExitKind::TakeProfit, PositionSide::Short) | (ExitKind::StopLoss, PositionSide::Long) => {
            bar.low <= trigger_price
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FiredLeg {
    pub kind: ExitKind,
    pub leg: ExitLeg,
}

/// Everything one evaluation pass did, in the order it happened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerOutcome {
    pub fired: Vec<FiredLeg>,
    /// Close and leg-hit records, interleaved in emission order.
    pub events: Vec<EventRecord>,
    /// The position reached zero quantity during this pass.
    pub closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExitTriggerEvaluator {
    policy: ExitPolicy,
}

impl ExitTriggerEvaluator {
    pub fn new(policy: ExitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ExitPolicy {
        self.policy
    }

    /// Run the take-profit pass, then the stop-loss pass, for `bar`.
    ///
    /// Does nothing when no position is open.
    pub fn evaluate(
        &self,
        ledger: &mut PositionLedger,
        recorder: &mut EventRecorder,
        bar: &Bar,
    ) -> Result<TriggerOutcome, LedgerError> {
        let mut outcome = TriggerOutcome::default();
        if !ledger.has_position() {
            return Ok(outcome);
        }
        self.policy.validate()?;
        for kind in [ExitKind::TakeProfit, ExitKind::StopLoss] {
            self.run_pass(kind, ledger, recorder, bar, &mut outcome)?;
            if !ledger.has_position() {
                outcome.closed = true;
                break;
            }
        }
        Ok(outcome)
    }

    fn run_pass(
        &self,
        kind: ExitKind,
        ledger: &mut PositionLedger,
        recorder: &mut EventRecorder,
        bar: &Bar,
        outcome: &mut TriggerOutcome,
    ) -> Result<(), LedgerError> {
        let fired_indices: Vec<usize> = match ledger.position() {
            Some(position) => position
                .legs(kind)
                .iter()
                .enumerate()
                .filter(|(_, leg)| leg_triggered(kind, position.side(), leg.trigger_price, bar))
                .map(|(i, _)| i)
                .collect(),
            None => return Ok(()),
        };
        if fired_indices.is_empty() {
            return Ok(());
        }

        // Each fill removes one leg, shifting the later indices down.
        for (filled, index) in fired_indices.into_iter().enumerate() {
            if !ledger.has_position() {
                break;
            }
            let Some(leg) = ledger
                .position()
                .and_then(|p| p.legs(kind).get(index - filled).copied())
            else {
                break;
            };
            let price = match self.policy.leg_fill {
                LegFillPrice::Trigger => leg.trigger_price,
                LegFillPrice::BarClose => bar.close,
            };
            let Some((leg, fill)) = ledger.fill_leg(
                recorder,
                bar,
                kind,
                index - filled,
                price,
                self.policy.leg_exit_fee,
            )?
            else {
                break;
            };
            debug!(?kind, trigger = leg.trigger_price, qty = leg.quantity, "exit leg fired");
            outcome.events.extend(fill);
            outcome.events.push(recorder.record(
                EventType::leg_hit(kind),
                bar,
                ledger.position(),
                leg.trigger_price,
                leg.quantity,
                EventDetail::LegHit {
                    trigger_price: leg.trigger_price,
                    leg_quantity: leg.quantity,
                },
            ));
            outcome.fired.push(FiredLeg { kind, leg });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{OpenRequest, Sizing};
    use chrono::NaiveDate;

    fn bar(hour: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Bar::new(ts, open, high, low, close, 1_000.0)
    }

    fn flat(hour: u32, price: f64) -> Bar {
        bar(hour, price, price, price, price)
    }

    #[test]
    fn trigger_sides() {
        let b = bar(0, 10.0, 11.0, 9.0, 10.0);
        assert!(leg_triggered(ExitKind::TakeProfit, PositionSide::Long, 11.0, &b));
        assert!(!leg_triggered(ExitKind::TakeProfit, PositionSide::Long, 11.5, &b));
        assert!(leg_triggered(ExitKind::StopLoss, PositionSide::Long, 9.0, &b));
        assert!(leg_triggered(ExitKind::TakeProfit, PositionSide::Short, 9.0, &b));
        assert!(leg_triggered(ExitKind::StopLoss, PositionSide::Short, 11.0, &b));
        assert!(!leg_triggered(ExitKind::StopLoss, PositionSide::Short, 11.01, &b));
    }

    #[test]
    fn no_position_no_events() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let out = ExitTriggerEvaluator::default()
            .evaluate(&mut ledger, &mut rec, &flat(0, 10.0))
            .unwrap();
        assert!(out.fired.is_empty());
        assert!(rec.is_empty());
    }

    #[test]
    fn take_profit_wins_over_stop_loss_on_same_bar() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let request = OpenRequest::long(Sizing::quantity(10.0))
            .take_profit(11.0, 1.0)
            .stop_loss(9.0, 1.0)
            .fees(1.0);
        ledger.open(&mut rec, &flat(0, 10.0), &request).unwrap();

        let evaluator = ExitTriggerEvaluator::new(ExitPolicy {
            leg_fill: LegFillPrice::Trigger,
            leg_exit_fee: 1.0,
        });
        let out = evaluator
            .evaluate(&mut ledger, &mut rec, &bar(1, 10.0, 11.0, 9.0, 10.0))
            .unwrap();

        assert!(out.closed);
        assert_eq!(out.fired.len(), 1);
        assert_eq!(out.fired[0].kind, ExitKind::TakeProfit);
        let closed = ledger.last_closed().unwrap();
        assert!((closed.realized_pnl() - 8.0).abs() < 1e-10);
        assert!(closed.reached_take_profit());
        assert!(!closed.reached_stop_loss());
        let kinds: Vec<_> = out.events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::CloseFull, EventType::TpHit]);
    }

    #[test]
    fn partial_legs_fire_in_stored_order_and_are_removed() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let request = OpenRequest::long(Sizing::quantity(10.0))
            .take_profit(11.0, 0.5)
            .take_profit(12.0, 0.5)
            .stop_loss(8.0, 1.0);
        ledger.open(&mut rec, &flat(0, 10.0), &request).unwrap();
        let evaluator = ExitTriggerEvaluator::default();

        let out = evaluator
            .evaluate(&mut ledger, &mut rec, &bar(1, 10.0, 11.5, 9.5, 11.0))
            .unwrap();
        assert!(!out.closed);
        assert_eq!(out.fired.len(), 1);
        let pos = ledger.position().unwrap();
        assert!((pos.qty() - 5.0).abs() < 1e-12);
        assert_eq!(pos.take_profit_legs().len(), 1);
        assert!(pos.reached_take_profit());

        // Same bar again does not re-fire the retired leg.
        let out = evaluator
            .evaluate(&mut ledger, &mut rec, &bar(2, 11.0, 11.5, 10.5, 11.0))
            .unwrap();
        assert!(out.fired.is_empty());

        let out = evaluator
            .evaluate(&mut ledger, &mut rec, &bar(3, 11.0, 12.0, 10.5, 11.5))
            .unwrap();
        assert!(out.closed);
        // (11-10)*5 + (12-10)*5
        assert!((ledger.last_closed().unwrap().realized_pnl() - 15.0).abs() < 1e-10);
    }

    #[test]
    fn short_stop_loss_fires_on_high() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let request = OpenRequest::short(Sizing::quantity(4.0)).stop_loss(105.0, 1.0);
        ledger.open(&mut rec, &flat(0, 100.0), &request).unwrap();
        let out = ExitTriggerEvaluator::default()
            .evaluate(&mut ledger, &mut rec, &bar(1, 101.0, 106.0, 100.5, 104.0))
            .unwrap();
        assert!(out.closed);
        assert_eq!(out.fired[0].kind, ExitKind::StopLoss);
        assert!((ledger.last_closed().unwrap().realized_pnl() + 20.0).abs() < 1e-10);
    }

    #[test]
    fn bar_close_fill_policy() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let request = OpenRequest::long(Sizing::quantity(2.0)).take_profit(11.0, 1.0);
        ledger.open(&mut rec, &flat(0, 10.0), &request).unwrap();
        let evaluator = ExitTriggerEvaluator::new(ExitPolicy {
            leg_fill: LegFillPrice::BarClose,
            leg_exit_fee: 0.0,
        });
        evaluator
            .evaluate(&mut ledger, &mut rec, &bar(1, 10.0, 12.0, 10.0, 10.5))
            .unwrap();
        assert!((ledger.last_closed().unwrap().realized_pnl() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn invalid_exit_fee_leaves_position_untouched() {
        let mut ledger = PositionLedger::new();
        let mut rec = EventRecorder::default();
        let request = OpenRequest::long(Sizing::quantity(10.0)).take_profit(11.0, 1.0);
        ledger.open(&mut rec, &flat(0, 10.0), &request).unwrap();
        let evaluator = ExitTriggerEvaluator::new(ExitPolicy {
            leg_fill: LegFillPrice::Trigger,
            leg_exit_fee: -1.0,
        });

        let err = evaluator
            .evaluate(&mut ledger, &mut rec, &bar(1, 10.0, 11.0, 9.5, 10.5))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity { context: "fees", .. }));

        let pos = ledger.position().unwrap();
        assert_eq!(pos.qty(), 10.0);
        assert_eq!(pos.take_profit_legs().len(), 1);
        assert!(!pos.reached_take_profit());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let run = || {
            let mut ledger = PositionLedger::new();
            let mut rec = EventRecorder::default();
            let request = OpenRequest::long(Sizing::quantity(9.0))
                .take_profit(11.0, 1.0 / 3.0)
                .take_profit(10.5, 1.0 / 3.0)
                .stop_loss(9.5, 1.0);
            ledger.open(&mut rec, &flat(0, 10.0), &request).unwrap();
            ExitTriggerEvaluator::default()
                .evaluate(&mut ledger, &mut rec, &bar(1, 10.0, 11.0, 9.0, 10.0))
                .unwrap()
        };
        assert_eq!(run(), run());
    }
}
