//! Streaming statistics, updated incrementally per bar and per settled
//! position, never recomputed from full history.
//!
//! Two phases per bar:
//! 1. *settle* (whenever a position closes): trade-level counters, streaks,
//!    extremes, exposure and the Sharpe window.
//! 2. *mark*: unrealized PnL, equity, peak equity and drawdown.
//!
//! Derived ratios are recomputed from the current counters after either phase.
//! Degenerate ratios resolve to sentinels (`0`, `+inf`) and never error.

pub mod sharpe;

pub use sharpe::{SharpeFeePolicy, SharpeWindow, DEFAULT_SHARPE_WINDOW};

use crate::domain::{Position, PositionSide};
use crate::events::{EventRecord, EventType};
use crate::ledger::{LedgerTotals, PositionLedger};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    pub sharpe_window: usize,
    pub sharpe_fees: SharpeFeePolicy,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sharpe_window: DEFAULT_SHARPE_WINDOW,
            sharpe_fees: SharpeFeePolicy::Net,
        }
    }
}

/// Live aggregate state, handed out by value.
///
/// Monetary fields are in quote currency; durations in hours. `gross_loss` and
/// `max_loss` are non-positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    // ── Counters ──
    pub bars: usize,
    /// Positions opened over the run (ledger lifetime total).
    pub positions: usize,
    pub longs: usize,
    pub shorts: usize,
    pub closed_positions: usize,

    pub exit_wins: usize,
    pub exit_losses: usize,
    pub exit_winrate: f64,

    pub position_wins: usize,
    pub position_losses: usize,
    pub position_winrate: f64,

    pub long_wins: usize,
    pub long_losses: usize,
    pub long_winrate: f64,
    pub short_wins: usize,
    pub short_losses: usize,
    pub short_winrate: f64,

    // ── PnL ──
    pub unrealized_pnl: f64,
    /// Realized PnL of settled positions.
    pub total_pnl: f64,
    pub avg_position_pnl: f64,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown: f64,
    pub max_drawdown: f64,

    pub gross_profit: f64,
    pub gross_loss: f64,
    pub profit_factor: f64,

    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_win: f64,
    pub max_loss: f64,

    pub sharpe_ratio: f64,

    // ── Streaks ──
    pub current_win_streak: usize,
    pub current_loss_streak: usize,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,

    // ── Time ──
    pub exposure_time: f64,
    pub avg_position_duration: f64,
    pub position_frequency: f64,

    pub fees_paid: f64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = [
            ("bars", self.bars),
            ("positions", self.positions),
            ("closed_positions", self.closed_positions),
            ("longs", self.longs),
            ("shorts", self.shorts),
            ("exit_wins", self.exit_wins),
            ("exit_losses", self.exit_losses),
            ("position_wins", self.position_wins),
            ("position_losses", self.position_losses),
            ("long_wins", self.long_wins),
            ("short_wins", self.short_wins),
            ("max_win_streak", self.max_win_streak),
            ("max_loss_streak", self.max_loss_streak),
        ];
        let values = [
            ("exit_winrate", self.exit_winrate),
            ("position_winrate", self.position_winrate),
            ("long_winrate", self.long_winrate),
            ("short_winrate", self.short_winrate),
            ("pnl", self.unrealized_pnl),
            ("total_pnl", self.total_pnl),
            ("avg_position_pnl", self.avg_position_pnl),
            ("equity", self.equity),
            ("max_drawdown", self.max_drawdown),
            ("gross_profit", self.gross_profit),
            ("gross_loss", self.gross_loss),
            ("profit_factor", self.profit_factor),
            ("avg_win", self.avg_win),
            ("avg_loss", self.avg_loss),
            ("max_win", self.max_win),
            ("max_loss", self.max_loss),
            ("sharpe_ratio", self.sharpe_ratio),
            ("exposure_time_h", self.exposure_time),
            ("avg_position_duration_h", self.avg_position_duration),
            ("position_frequency", self.position_frequency),
            ("fees_paid", self.fees_paid),
        ];
        for (key, value) in counts {
            writeln!(f, "{key:24}: {value}")?;
        }
        for (key, value) in values {
            writeln!(f, "{key:24}: {value:.4}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    config: StatsConfig,
    snapshot: StatsSnapshot,
    sharpe: SharpeWindow,
    /// Running sum fed to the Sharpe window (net or gross per policy).
    sharpe_cumulative: f64,
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(StatsConfig::default())
    }
}

impl StatisticsAggregator {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            config,
            snapshot: StatsSnapshot::default(),
            sharpe: SharpeWindow::new(config.sharpe_window),
            sharpe_cumulative: 0.0,
        }
    }

    pub fn config(&self) -> StatsConfig {
        self.config
    }

    /// Fold one ledger event into the counters.
    ///
    /// Leg hits feed the exit win/loss counters; a full close settles the
    /// position the ledger just archived.
    pub fn on_event(&mut self, event: &EventRecord, ledger: &PositionLedger) {
        match event.event_type {
            EventType::TpHit => self.snapshot.exit_wins += 1,
            EventType::SlHit => self.snapshot.exit_losses += 1,
            EventType::CloseFull => {
                if let Some(position) = ledger.last_closed() {
                    self.settle(position);
                }
            }
            EventType::OpenLong
            | EventType::OpenShort
            | EventType::IncreaseLong
            | EventType::IncreaseShort
            | EventType::ClosePartial => {}
        }
        self.sync_totals(ledger.totals());
        self.recompute_ratios();
    }

    /// Trade-level update for a completed position.
    pub fn settle(&mut self, position: &Position) {
        let pnl = position.realized_pnl();
        let s = &mut self.snapshot;
        s.closed_positions += 1;

        if pnl > 0.0 {
            s.position_wins += 1;
            s.gross_profit += pnl;
            s.max_win = s.max_win.max(pnl);
            match position.side() {
                PositionSide::Long => s.long_wins += 1,
                PositionSide::Short => s.short_wins += 1,
            }
            s.current_win_streak += 1;
            s.current_loss_streak = 0;
        } else {
            s.position_losses += 1;
            s.gross_loss += pnl;
            s.max_loss = s.max_loss.min(pnl);
            match position.side() {
                PositionSide::Long => s.long_losses += 1,
                PositionSide::Short => s.short_losses += 1,
            }
            s.current_loss_streak += 1;
            s.current_win_streak = 0;
        }
        s.max_win_streak = s.max_win_streak.max(s.current_win_streak);
        s.max_loss_streak = s.max_loss_streak.max(s.current_loss_streak);

        s.exposure_time += position.duration_hours();
        s.total_pnl += pnl;

        self.sharpe_cumulative += match self.config.sharpe_fees {
            SharpeFeePolicy::Net => pnl,
            SharpeFeePolicy::Gross => pnl + position.total_fees(),
        };
        self.sharpe.push(self.sharpe_cumulative);
        self.snapshot.sharpe_ratio = self.sharpe.sharpe();

        debug!(
            side = %position.side(),
            pnl,
            win_streak = self.snapshot.current_win_streak,
            loss_streak = self.snapshot.current_loss_streak,
            sharpe = self.snapshot.sharpe_ratio,
            "settled position"
        );
        self.recompute_ratios();
    }

    /// Per-bar mark-to-market at `market_price`.
    pub fn mark(&mut self, ledger: &PositionLedger, market_price: f64) {
        self.snapshot.bars += 1;
        self.revalue(ledger, market_price);
    }

    /// Mark-to-market without counting a new bar, for changes applied after
    /// the bar was already marked.
    pub fn revalue(&mut self, ledger: &PositionLedger, market_price: f64) {
        let open_realized = ledger.position().map_or(0.0, Position::realized_pnl);
        let s = &mut self.snapshot;
        s.unrealized_pnl = ledger.unrealized_pnl(market_price);
        s.equity = s.total_pnl + open_realized + s.unrealized_pnl;
        s.peak_equity = s.peak_equity.max(s.equity);
        s.drawdown = s.peak_equity - s.equity;
        s.max_drawdown = s.max_drawdown.max(s.drawdown);
        self.sync_totals(ledger.totals());
        self.recompute_ratios();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot
    }

    pub fn sharpe_window(&self) -> &SharpeWindow {
        &self.sharpe
    }

    fn sync_totals(&mut self, totals: LedgerTotals) {
        let s = &mut self.snapshot;
        s.positions = totals.positions;
        s.longs = totals.longs;
        s.shorts = totals.shorts;
        s.fees_paid = totals.total_fees;
    }

    fn recompute_ratios(&mut self) {
        let s = &mut self.snapshot;
        s.exit_winrate = ratio(s.exit_wins as f64, (s.exit_wins + s.exit_losses) as f64);
        s.position_winrate = ratio(s.position_wins as f64, s.closed_positions as f64);
        s.long_winrate = ratio(s.long_wins as f64, (s.long_wins + s.long_losses) as f64);
        s.short_winrate = ratio(s.short_wins as f64, (s.short_wins + s.short_losses) as f64);
        s.profit_factor = if s.closed_positions == 0 {
            0.0
        } else if s.gross_loss < 0.0 {
            s.gross_profit / s.gross_loss.abs()
        } else {
            f64::INFINITY
        };
        s.avg_win = ratio(s.gross_profit, s.position_wins as f64);
        s.avg_loss = ratio(s.gross_loss, s.position_losses as f64);
        s.avg_position_pnl = ratio(s.total_pnl, s.closed_positions as f64);
        s.avg_position_duration = ratio(s.exposure_time, s.positions as f64);
        s.position_frequency = ratio(s.positions as f64, s.exposure_time);
    }
}

/// `num / den`, or 0 when the denominator is not positive.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::events::EventRecorder;
    use crate::ledger::{CloseSize, OpenRequest, Sizing};
    use chrono::NaiveDate;

    fn bar(hour: u32, close: f64) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        Bar::new(ts, close, close, close, close, 1.0)
    }

    struct Harness {
        ledger: PositionLedger,
        rec: EventRecorder,
        stats: StatisticsAggregator,
        hour: u32,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                ledger: PositionLedger::new(),
                rec: EventRecorder::default(),
                stats: StatisticsAggregator::default(),
                hour: 0,
            }
        }

        fn round_trip(&mut self, side: PositionSide, entry: f64, exit: f64) {
            let b = bar(self.hour, entry);
            let request = OpenRequest::new(side, Sizing::quantity(1.0));
            let ev = self.ledger.open(&mut self.rec, &b, &request).unwrap();
            self.stats.on_event(&ev, &self.ledger);
            self.stats.mark(&self.ledger, entry);
            self.hour += 1;
            let b = bar(self.hour, exit);
            let ev = self
                .ledger
                .close(&mut self.rec, &b, CloseSize::All, 0.0)
                .unwrap()
                .unwrap();
            self.stats.on_event(&ev, &self.ledger);
            self.stats.mark(&self.ledger, exit);
            self.hour += 1;
        }
    }

    #[test]
    fn empty_run_has_sentinel_ratios() {
        let stats = StatisticsAggregator::default().snapshot();
        assert_eq!(stats.profit_factor, 0.0);
        assert_eq!(stats.sharpe_ratio, 0.0);
        assert_eq!(stats.position_winrate, 0.0);
    }

    #[test]
    fn streaks_follow_win_loss_sequence() {
        let mut h = Harness::new();
        h.round_trip(PositionSide::Long, 10.0, 9.0);
        h.round_trip(PositionSide::Long, 10.0, 8.0);
        h.round_trip(PositionSide::Short, 10.0, 7.0);
        let s = h.stats.snapshot();
        assert_eq!(s.max_loss_streak, 2);
        assert_eq!(s.current_win_streak, 1);
        assert_eq!(s.current_loss_streak, 0);
        assert_eq!(s.max_win_streak, 1);
        assert_eq!(s.short_wins, 1);
        assert_eq!(s.max_win, 3.0);
        assert_eq!(s.max_loss, -2.0);
        assert_eq!(s.gross_loss, -3.0);
        assert!((s.profit_factor - 1.0).abs() < 1e-12);
    }

    #[test]
    fn profit_factor_is_infinite_without_losses() {
        let mut h = Harness::new();
        h.round_trip(PositionSide::Long, 10.0, 12.0);
        let s = h.stats.snapshot();
        assert!(s.profit_factor.is_infinite());
        assert_eq!(s.avg_win, 2.0);
        assert_eq!(s.avg_loss, 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        let mut h = Harness::new();
        h.round_trip(PositionSide::Long, 10.0, 15.0); // equity 5
        h.round_trip(PositionSide::Long, 10.0, 7.0); // equity 2
        let s = h.stats.snapshot();
        assert_eq!(s.peak_equity, 5.0);
        assert_eq!(s.equity, 2.0);
        assert_eq!(s.max_drawdown, 3.0);
    }

    #[test]
    fn sharpe_needs_three_settled_positions() {
        let mut h = Harness::new();
        h.round_trip(PositionSide::Long, 10.0, 11.0);
        h.round_trip(PositionSide::Long, 10.0, 12.0);
        assert_eq!(h.stats.snapshot().sharpe_ratio, 0.0);
        h.round_trip(PositionSide::Long, 10.0, 11.0);
        // cumulative 1, 3, 4 → returns 2.0, 1/3
        assert!(h.stats.snapshot().sharpe_ratio > 0.0);
        assert!(h.stats.snapshot().sharpe_ratio.is_finite());
    }

    #[test]
    fn exposure_and_frequency() {
        let mut h = Harness::new();
        h.round_trip(PositionSide::Long, 10.0, 11.0);
        h.round_trip(PositionSide::Short, 10.0, 11.0);
        let s = h.stats.snapshot();
        assert_eq!(s.exposure_time, 2.0);
        assert_eq!(s.avg_position_duration, 1.0);
        assert_eq!(s.position_frequency, 1.0);
        assert_eq!(s.positions, 2);
        assert_eq!(s.longs, 1);
        assert_eq!(s.shorts, 1);
    }

    #[test]
    fn duration_ratios_share_the_opened_count() {
        let mut h = Harness::new();
        let request = OpenRequest::long(Sizing::quantity(1.0));
        let ev = h.ledger.open(&mut h.rec, &bar(0, 10.0), &request).unwrap();
        h.stats.on_event(&ev, &h.ledger);
        let ev = h
            .ledger
            .close(&mut h.rec, &bar(2, 11.0), CloseSize::All, 0.0)
            .unwrap()
            .unwrap();
        h.stats.on_event(&ev, &h.ledger);
        // Still open when the run ends.
        let ev = h.ledger.open(&mut h.rec, &bar(3, 11.0), &request).unwrap();
        h.stats.on_event(&ev, &h.ledger);

        let s = h.stats.snapshot();
        assert_eq!(s.positions, 2);
        assert_eq!(s.closed_positions, 1);
        assert_eq!(s.exposure_time, 2.0);
        assert_eq!(s.avg_position_duration, s.exposure_time / s.positions as f64);
        assert_eq!(s.avg_position_duration, 1.0);
        assert_eq!(s.position_frequency, 1.0);
    }

    #[test]
    fn display_lists_every_section() {
        let text = StatsSnapshot::default().to_string();
        assert!(text.contains("profit_factor"));
        assert!(text.contains("max_loss_streak"));
    }
}
