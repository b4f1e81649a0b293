//! Position: the single open exposure, with its cost basis, fill history and
//! resting exit legs.
//!
//! Mutation is crate-private: only the ledger applies fills or retires legs,
//! so the invariants below cannot be broken from outside.
//!
//! - `qty >= 0` at all times; a near-zero residue after an exit is snapped to 0.
//! - `avg_price` moves only on entry fills.
//! - `side` never changes; the status flips Open → Closed exactly once.

use crate::domain::order::Order;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantities at or below this are treated as zero after an exit fill.
pub const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Which family of resting exit legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    TakeProfit,
    StopLoss,
}

/// An exit leg as requested by a strategy: trigger price plus the fraction of
/// the opening fill it should close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegSpec {
    pub trigger_price: f64,
    pub fraction: f64,
}

impl LegSpec {
    pub fn new(trigger_price: f64, fraction: f64) -> Self {
        Self {
            trigger_price,
            fraction,
        }
    }
}

/// A resting exit leg in absolute units. Converted once from a [`LegSpec`]
/// when the position opens and never re-derived afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub trigger_price: f64,
    pub quantity: f64,
}

impl ExitLeg {
    pub(crate) fn from_spec(spec: &LegSpec, entry_qty: f64) -> Self {
        Self {
            trigger_price: spec.trigger_price,
            quantity: spec.fraction * entry_qty,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    side: PositionSide,
    qty: f64,
    avg_price: f64,
    realized_pnl: f64,
    total_fees: f64,
    status: PositionStatus,
    entry_orders: Vec<Order>,
    exit_orders: Vec<Order>,
    take_profit_legs: Vec<ExitLeg>,
    stop_loss_legs: Vec<ExitLeg>,
    reached_take_profit: bool,
    reached_stop_loss: bool,
}

impl Position {
    /// Create a position from its opening fill.
    pub(crate) fn open(
        side: PositionSide,
        entry: Order,
        take_profit_legs: Vec<ExitLeg>,
        stop_loss_legs: Vec<ExitLeg>,
    ) -> Self {
        let mut position = Self {
            side,
            qty: 0.0,
            avg_price: 0.0,
            realized_pnl: 0.0,
            total_fees: 0.0,
            status: PositionStatus::Open,
            entry_orders: Vec::new(),
            exit_orders: Vec::new(),
            take_profit_legs,
            stop_loss_legs,
            reached_take_profit: false,
            reached_stop_loss: false,
        };
        position.apply_entry(entry);
        position
    }

    /// Weighted-average entry fill. The entry fee is realized immediately.
    pub(crate) fn apply_entry(&mut self, order: Order) {
        let total_qty = self.qty + order.quantity;
        self.avg_price = (self.avg_price * self.qty + order.price * order.quantity) / total_qty;
        self.qty = total_qty;
        self.total_fees += order.fees;
        self.realized_pnl -= order.fees;
        self.entry_orders.push(order);
    }

    /// Exit fill. Returns the PnL realized by this fill (fees included).
    ///
    /// `order.quantity` must already be clamped to the open quantity by the
    /// caller; the clamp here only guards the arithmetic.
    pub(crate) fn apply_exit(&mut self, order: Order) -> f64 {
        let closed_qty = self.qty.min(order.quantity);
        let pnl = self.side.sign() * (order.price - self.avg_price) * closed_qty - order.fees;
        self.realized_pnl += pnl;
        self.total_fees += order.fees;
        self.qty -= closed_qty;
        if self.qty <= QTY_EPSILON {
            self.qty = 0.0;
            self.status = PositionStatus::Closed;
        }
        self.exit_orders.push(order);
        pnl
    }

    /// Remove the legs at `indices` (positions within the current list) and
    /// return them in stored order.
    pub(crate) fn take_legs(&mut self, kind: ExitKind, indices: &[usize]) -> Vec<ExitLeg> {
        let legs = match kind {
            ExitKind::TakeProfit => &mut self.take_profit_legs,
            ExitKind::StopLoss => &mut self.stop_loss_legs,
        };
        let mut taken = Vec::with_capacity(indices.len());
        let mut kept = Vec::with_capacity(legs.len());
        for (i, leg) in legs.drain(..).enumerate() {
            if indices.contains(&i) {
                taken.push(leg);
            } else {
                kept.push(leg);
            }
        }
        *legs = kept;
        taken
    }

    pub(crate) fn mark_reached(&mut self, kind: ExitKind) {
        match kind {
            ExitKind::TakeProfit => self.reached_take_profit = true,
            ExitKind::StopLoss => self.reached_stop_loss = true,
        }
    }

    /// Mark-to-market PnL of the open quantity. Zero once flat.
    pub fn unrealized_pnl(&self, market_price: f64) -> f64 {
        if self.qty <= 0.0 {
            return 0.0;
        }
        self.side.sign() * (market_price - self.avg_price) * self.qty
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn qty(&self) -> f64 {
        self.qty
    }

    pub fn avg_price(&self) -> f64 {
        self.avg_price
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open && self.qty > 0.0
    }

    pub fn entry_orders(&self) -> &[Order] {
        &self.entry_orders
    }

    pub fn exit_orders(&self) -> &[Order] {
        &self.exit_orders
    }

    pub fn legs(&self, kind: ExitKind) -> &[ExitLeg] {
        match kind {
            ExitKind::TakeProfit => &self.take_profit_legs,
            ExitKind::StopLoss => &self.stop_loss_legs,
        }
    }

    pub fn take_profit_legs(&self) -> &[ExitLeg] {
        &self.take_profit_legs
    }

    pub fn stop_loss_legs(&self) -> &[ExitLeg] {
        &self.stop_loss_legs
    }

    pub fn reached_take_profit(&self) -> bool {
        self.reached_take_profit
    }

    pub fn reached_stop_loss(&self) -> bool {
        self.reached_stop_loss
    }

    /// Timestamp of the first entry fill.
    pub fn opened_at(&self) -> Option<NaiveDateTime> {
        self.entry_orders.first().map(|o| o.timestamp)
    }

    /// Timestamp of the last exit fill.
    pub fn closed_at(&self) -> Option<NaiveDateTime> {
        self.exit_orders.last().map(|o| o.timestamp)
    }

    /// Holding time from first entry to last exit, in hours. Zero while open.
    pub fn duration_hours(&self) -> f64 {
        match (self.opened_at(), self.closed_at()) {
            (Some(open), Some(close)) if self.status == PositionStatus::Closed => {
                (close - open).num_milliseconds() as f64 / 3_600_000.0
            }
            _ => 0.0,
        }
    }
}
