//! Position ledger: owns the (at most one) open position and applies fills.
//!
//! Every mutating call validates first and mutates second, so a rejected
//! `open` or `close` leaves the position, the lifetime totals and the event
//! history exactly as they were.

use crate::domain::{
    Bar, ExitKind, ExitLeg, IdGen, LegSpec, Order, Position, PositionSide, QTY_EPSILON,
};
use crate::events::{EventDetail, EventRecord, EventRecorder, EventType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("cannot open {requested}: a {open} position is already open")]
    PositionConflict {
        open: PositionSide,
        requested: PositionSide,
    },

    #[error("invalid {context}: {value}")]
    InvalidQuantity { context: &'static str, value: f64 },
}

/// How the size of an entry fill is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sizing {
    /// Absolute quantity in asset units.
    Quantity { qty: f64 },
    /// Monetary value, converted at the bar's close.
    Value { value: f64 },
}

impl Sizing {
    pub fn quantity(qty: f64) -> Self {
        Sizing::Quantity { qty }
    }

    pub fn value(value: f64) -> Self {
        Sizing::Value { value }
    }

    pub fn resolve(&self, bar: &Bar) -> f64 {
        match *self {
            Sizing::Quantity { qty } => qty,
            Sizing::Value { value } => value / bar.close,
        }
    }

    fn monetary_value(&self) -> Option<f64> {
        match *self {
            Sizing::Quantity { .. } => None,
            Sizing::Value { value } => Some(value),
        }
    }
}

/// How much of the open quantity an exit should take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseSize {
    All,
    /// Clamped to the open quantity.
    Quantity { qty: f64 },
    /// Clamped to `[0, 1]`, then applied to the open quantity.
    Fraction { fraction: f64 },
}

impl CloseSize {
    fn resolve(&self, available: f64) -> Result<f64, LedgerError> {
        let qty = match *self {
            CloseSize::All => available,
            CloseSize::Quantity { qty } => {
                if !qty.is_finite() {
                    return Err(LedgerError::InvalidQuantity {
                        context: "close quantity",
                        value: qty,
                    });
                }
                qty.min(available)
            }
            CloseSize::Fraction { fraction } => {
                if !fraction.is_finite() {
                    return Err(LedgerError::InvalidQuantity {
                        context: "close fraction",
                        value: fraction,
                    });
                }
                available * fraction.clamp(0.0, 1.0)
            }
        };
        if qty <= 0.0 {
            return Err(LedgerError::InvalidQuantity {
                context: "close quantity",
                value: qty,
            });
        }
        Ok(qty)
    }

    fn percentage(&self) -> Option<f64> {
        match *self {
            CloseSize::Fraction { fraction } => Some(fraction),
            _ => None,
        }
    }
}

/// An open (or increase) intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub side: PositionSide,
    pub sizing: Sizing,
    #[serde(default)]
    pub take_profit: Vec<LegSpec>,
    #[serde(default)]
    pub stop_loss: Vec<LegSpec>,
    #[serde(default)]
    pub fees: f64,
}

impl OpenRequest {
    pub fn new(side: PositionSide, sizing: Sizing) -> Self {
        Self {
            side,
            sizing,
            take_profit: Vec::new(),
            stop_loss: Vec::new(),
            fees: 0.0,
        }
    }

    pub fn long(sizing: Sizing) -> Self {
        Self::new(PositionSide::Long, sizing)
    }

    pub fn short(sizing: Sizing) -> Self {
        Self::new(PositionSide::Short, sizing)
    }

    pub fn take_profit(mut self, trigger_price: f64, fraction: f64) -> Self {
        self.take_profit.push(LegSpec::new(trigger_price, fraction));
        self
    }

    pub fn stop_loss(mut self, trigger_price: f64, fraction: f64) -> Self {
        self.stop_loss.push(LegSpec::new(trigger_price, fraction));
        self
    }

    pub fn fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        self
    }
}

/// Lifetime counters kept by the ledger across all positions of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Positions opened (increases do not count).
    pub positions: usize,
    pub longs: usize,
    pub shorts: usize,
    pub closed_positions: usize,
    pub total_fees: f64,
}

/// Copyable view of the open position for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDetails {
    pub side: PositionSide,
    pub quantity: f64,
    pub avg_price: f64,
    pub total_fees: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub take_profit_legs: Vec<ExitLeg>,
    pub stop_loss_legs: Vec<ExitLeg>,
    pub entry_orders_count: usize,
    pub exit_orders_count: usize,
    pub reached_take_profit: bool,
    pub reached_stop_loss: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    position: Option<Position>,
    closed: Vec<Position>,
    totals: LedgerTotals,
    order_ids: IdGen,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new position, or increase the open one when the side matches.
    ///
    /// Entry fills are priced at `bar.close`. Exit legs are converted to
    /// absolute quantities from this fill; legs passed on an increase are
    /// ignored.
    pub fn open(
        &mut self,
        recorder: &mut EventRecorder,
        bar: &Bar,
        request: &OpenRequest,
    ) -> Result<EventRecord, LedgerError> {
        if let Some(open) = self.position.as_ref().map(Position::side) {
            if open != request.side {
                return Err(LedgerError::PositionConflict {
                    open,
                    requested: request.side,
                });
            }
        }
        let quantity = request.sizing.resolve(bar);
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(LedgerError::InvalidQuantity {
                context: "entry quantity",
                value: quantity,
            });
        }
        validate_fees(request.fees)?;

        let increasing = self.position.is_some();
        if !increasing {
            for leg in request.take_profit.iter().chain(&request.stop_loss) {
                validate_leg(leg)?;
            }
        }

        let order = Order {
            id: self.order_ids.next_order_id(),
            price: bar.close,
            quantity,
            timestamp: bar.timestamp,
            fees: request.fees,
        };
        let order_id = order.id;
        self.totals.total_fees += request.fees;

        let (event_type, tp_levels, sl_levels) = match self.position.as_mut() {
            Some(position) => {
                if !request.take_profit.is_empty() || !request.stop_loss.is_empty() {
                    debug!(side = %request.side, "exit legs on an increase are ignored");
                }
                position.apply_entry(order);
                debug!(
                    side = %request.side,
                    quantity,
                    price = bar.close,
                    avg_price = position.avg_price(),
                    "increased position"
                );
                (EventType::increase(request.side), 0, 0)
            }
            None => {
                let tp: Vec<ExitLeg> = request
                    .take_profit
                    .iter()
                    .map(|spec| ExitLeg::from_spec(spec, quantity))
                    .collect();
                let sl: Vec<ExitLeg> = request
                    .stop_loss
                    .iter()
                    .map(|spec| ExitLeg::from_spec(spec, quantity))
                    .collect();
                let (tp_levels, sl_levels) = (tp.len(), sl.len());
                self.position = Some(Position::open(request.side, order, tp, sl));
                self.totals.positions += 1;
                match request.side {
                    PositionSide::Long => self.totals.longs += 1,
                    PositionSide::Short => self.totals.shorts += 1,
                }
                info!(
                    side = %request.side,
                    quantity,
                    price = bar.close,
                    at = %bar.timestamp,
                    "opened position"
                );
                (EventType::open(request.side), tp_levels, sl_levels)
            }
        };

        Ok(recorder.record(
            event_type,
            bar,
            self.position.as_ref(),
            bar.close,
            quantity,
            EventDetail::Entry {
                order_id,
                value: request.sizing.monetary_value(),
                fees: request.fees,
                take_profit_levels: tp_levels,
                stop_loss_levels: sl_levels,
            },
        ))
    }

    /// Close some or all of the open position at `bar.close`.
    ///
    /// Returns `Ok(None)` when there is nothing to close.
    pub fn close(
        &mut self,
        recorder: &mut EventRecorder,
        bar: &Bar,
        size: CloseSize,
        fees: f64,
    ) -> Result<Option<EventRecord>, LedgerError> {
        self.close_at(recorder, bar, bar.close, size, fees)
    }

    /// Close at an explicit fill price (used for resting exit legs).
    pub fn close_at(
        &mut self,
        recorder: &mut EventRecorder,
        bar: &Bar,
        price: f64,
        size: CloseSize,
        fees: f64,
    ) -> Result<Option<EventRecord>, LedgerError> {
        let Some(position) = self.position.as_mut() else {
            return Ok(None);
        };
        let available = position.qty();
        if available <= 0.0 {
            return Ok(None);
        }
        let close_qty = size.resolve(available)?;
        validate_exit_price(price)?;
        validate_fees(fees)?;

        let unrealized_before = position.unrealized_pnl(price);
        let order = Order {
            id: self.order_ids.next_order_id(),
            price,
            quantity: close_qty,
            timestamp: bar.timestamp,
            fees,
        };
        let order_id = order.id;
        let fill_pnl = position.apply_exit(order);
        self.totals.total_fees += fees;

        let full = position.qty() <= QTY_EPSILON;
        let event_type = if full {
            EventType::CloseFull
        } else {
            EventType::ClosePartial
        };
        debug!(
            side = %position.side(),
            quantity = close_qty,
            price,
            fill_pnl,
            remaining = position.qty(),
            "exit fill"
        );

        let record = recorder.record(
            event_type,
            bar,
            Some(&*position),
            price,
            close_qty,
            EventDetail::Exit {
                order_id,
                percentage: size.percentage(),
                fees,
                was_full_position: (available - close_qty).abs() <= QTY_EPSILON,
                unrealized_pnl_at_close: unrealized_before,
                fill_pnl,
                realized_pnl: position.realized_pnl(),
            },
        );

        if full {
            if let Some(done) = self.position.take() {
                info!(
                    side = %done.side(),
                    realized_pnl = done.realized_pnl(),
                    at = %bar.timestamp,
                    "closed position"
                );
                self.closed.push(done);
                self.totals.closed_positions += 1;
            }
        }
        Ok(Some(record))
    }

    /// Side-aware mark-to-market of the open quantity; 0 when flat.
    pub fn unrealized_pnl(&self, market_price: f64) -> f64 {
        self.position
            .as_ref()
            .map_or(0.0, |p| p.unrealized_pnl(market_price))
    }

    pub fn mark_take_profit_hit(&mut self) {
        if let Some(position) = self.position.as_mut() {
            position.mark_reached(ExitKind::TakeProfit);
        }
    }

    pub fn mark_stop_loss_hit(&mut self) {
        if let Some(position) = self.position.as_mut() {
            position.mark_reached(ExitKind::StopLoss);
        }
    }

    /// Fill the resting leg at `index` of `kind` at `price`.
    ///
    /// The fill is validated before the leg is removed or the reached flag
    /// set, so a rejected fill leaves the position untouched. Returns the
    /// retired leg with its exit record, or `None` when there is no such leg.
    pub(crate) fn fill_leg(
        &mut self,
        recorder: &mut EventRecorder,
        bar: &Bar,
        kind: ExitKind,
        index: usize,
        price: f64,
        fees: f64,
    ) -> Result<Option<(ExitLeg, Option<EventRecord>)>, LedgerError> {
        let Some(position) = self.position.as_mut() else {
            return Ok(None);
        };
        let Some(leg) = position.legs(kind).get(index).copied() else {
            return Ok(None);
        };
        let size = CloseSize::Quantity { qty: leg.quantity };
        size.resolve(position.qty())?;
        validate_exit_price(price)?;
        validate_fees(fees)?;

        position.take_legs(kind, &[index]);
        match kind {
            ExitKind::TakeProfit => self.mark_take_profit_hit(),
            ExitKind::StopLoss => self.mark_stop_loss_hit(),
        }
        let record = self.close_at(recorder, bar, price, size, fees)?;
        Ok(Some((leg, record)))
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.position.as_ref().is_some_and(Position::is_open)
    }

    /// The most recently archived position.
    pub fn last_closed(&self) -> Option<&Position> {
        self.closed.last()
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    pub fn totals(&self) -> LedgerTotals {
        self.totals
    }

    pub fn position_info(&self, market_price: f64) -> Option<PositionDetails> {
        let p = self.position.as_ref().filter(|p| p.is_open())?;
        Some(PositionDetails {
            side: p.side(),
            quantity: p.qty(),
            avg_price: p.avg_price(),
            total_fees: p.total_fees(),
            realized_pnl: p.realized_pnl(),
            unrealized_pnl: p.unrealized_pnl(market_price),
            take_profit_legs: p.take_profit_legs().to_vec(),
            stop_loss_legs: p.stop_loss_legs().to_vec(),
            entry_orders_count: p.entry_orders().len(),
            exit_orders_count: p.exit_orders().len(),
            reached_take_profit: p.reached_take_profit(),
            reached_stop_loss: p.reached_stop_loss(),
        })
    }
}

fn validate_exit_price(price: f64) -> Result<(), LedgerError> {
    if !(price.is_finite() && price > 0.0) {
        return Err(LedgerError::InvalidQuantity {
            context: "exit price",
            value: price,
        });
    }
    Ok(())
}

pub(crate) fn validate_fees(fees: f64) -> Result<(), LedgerError> {
    if !(fees.is_finite() && fees >= 0.0) {
        return Err(LedgerError::InvalidQuantity {
            context: "fees",
            value: fees,
        });
    }
    Ok(())
}

fn validate_leg(leg: &LegSpec) -> Result<(), LedgerError> {
    if !(leg.trigger_price.is_finite() && leg.trigger_price > 0.0) {
        return Err(LedgerError::InvalidQuantity {
            context: "leg trigger price",
            value: leg.trigger_price,
        });
    }
    if !(leg.fraction.is_finite() && leg.fraction > 0.0 && leg.fraction <= 1.0) {
        return Err(LedgerError::InvalidQuantity {
            context: "leg fraction",
            value: leg.fraction,
        });
    }
    Ok(())
}
