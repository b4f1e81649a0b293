//! Donchian channel breakout with percentage brackets.
//!
//! - Close above the highest high of the previous `period` bars: go long.
//! - Close below the lowest low of the previous `period` bars: go short.
//! - An opposite breakout closes the open position first.
//!
//! Each entry carries one take-profit and one stop-loss leg covering the
//! whole fill, placed `take_profit_pct` / `stop_loss_pct` away from the close.

use crate::domain::{Bar, PositionSide};
use crate::engine::EngineError;
use crate::ledger::{OpenRequest, Sizing};
use crate::strategy::{Desk, Strategy};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DonchianBreakout {
    period: usize,
    sizing: Sizing,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    fees: f64,
    window: VecDeque<(f64, f64)>,
}

impl DonchianBreakout {
    /// `period` is floored at 1. Bracket percentages of zero disable that leg.
    pub fn new(period: usize, sizing: Sizing, take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        let period = period.max(1);
        Self {
            period,
            sizing,
            take_profit_pct,
            stop_loss_pct,
            fees: 0.0,
            window: VecDeque::with_capacity(period + 1),
        }
    }

    pub fn with_fees(mut self, fees: f64) -> Self {
        self.fees = fees;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// (upper, lower) over the previous `period` bars, once warm.
    fn channel(&self) -> Option<(f64, f64)> {
        if self.window.len() < self.period {
            return None;
        }
        let upper = self.window.iter().map(|&(h, _)| h).fold(f64::MIN, f64::max);
        let lower = self.window.iter().map(|&(_, l)| l).fold(f64::MAX, f64::min);
        Some((upper, lower))
    }

    fn request(&self, side: PositionSide, close: f64) -> OpenRequest {
        let sign = side.sign();
        let mut request = OpenRequest::new(side, self.sizing).fees(self.fees);
        if self.take_profit_pct > 0.0 {
            request = request.take_profit(close * (1.0 + sign * self.take_profit_pct), 1.0);
        }
        if self.stop_loss_pct > 0.0 {
            request = request.stop_loss(close * (1.0 - sign * self.stop_loss_pct), 1.0);
        }
        request
    }
}

impl Strategy for DonchianBreakout {
    fn name(&self) -> &str {
        "donchian_breakout"
    }

    fn on_bar(&mut self, bar: &Bar, desk: &mut Desk<'_>) -> Result<(), EngineError> {
        let signal = self.channel().and_then(|(upper, lower)| {
            if bar.close > upper {
                Some(PositionSide::Long)
            } else if bar.close < lower {
                Some(PositionSide::Short)
            } else {
                None
            }
        });

        self.window.push_back((bar.high, bar.low));
        if self.window.len() > self.period {
            self.window.pop_front();
        }

        let Some(side) = signal else {
            return Ok(());
        };
        let open_side = desk.position().map(|p| p.side());
        if open_side == Some(side) {
            return Ok(());
        }
        if open_side == Some(side.opposite()) && desk.close_all(self.fees).is_err() {
            return Ok(());
        }
        // Rejections are counted and logged by the desk.
        let _ = desk.open(&self.request(side, bar.close));
        Ok(())
    }
}
