//! Worked ledger / trigger / statistics scenarios.

use chrono::{NaiveDate, NaiveDateTime};
use ledgerlab_core::domain::{Bar, PositionSide, PositionStatus};
use ledgerlab_core::events::{EventRecorder, EventType};
use ledgerlab_core::ledger::{CloseSize, LedgerError, OpenRequest, PositionLedger, Sizing};
use ledgerlab_core::stats::StatisticsAggregator;
use ledgerlab_core::triggers::{ExitPolicy, ExitTriggerEvaluator};

// ── Helpers ──────────────────────────────────────────────────────────

fn ts(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

fn flat(hour: u32, price: f64) -> Bar {
    Bar::new(ts(hour), price, price, price, price, 100.0)
}

struct Book {
    ledger: PositionLedger,
    recorder: EventRecorder,
    stats: StatisticsAggregator,
    evaluator: ExitTriggerEvaluator,
}

impl Book {
    fn new(leg_exit_fee: f64) -> Self {
        Self {
            ledger: PositionLedger::new(),
            recorder: EventRecorder::default(),
            stats: StatisticsAggregator::default(),
            evaluator: ExitTriggerEvaluator::new(ExitPolicy {
                leg_exit_fee,
                ..ExitPolicy::default()
            }),
        }
    }

    fn open(&mut self, bar: &Bar, request: &OpenRequest) -> Result<(), LedgerError> {
        let event = self.ledger.open(&mut self.recorder, bar, request)?;
        self.stats.on_event(&event, &self.ledger);
        Ok(())
    }

    fn close(&mut self, bar: &Bar, size: CloseSize, fees: f64) {
        if let Some(event) = self.ledger.close(&mut self.recorder, bar, size, fees).unwrap() {
            self.stats.on_event(&event, &self.ledger);
        }
    }

    fn bar(&mut self, bar: &Bar) {
        let outcome = self
            .evaluator
            .evaluate(&mut self.ledger, &mut self.recorder, bar)
            .unwrap();
        for event in &outcome.events {
            self.stats.on_event(event, &self.ledger);
        }
        self.stats.mark(&self.ledger, bar.close);
    }
}

// ── Worked examples ──────────────────────────────────────────────────

#[test]
fn take_profit_wins_when_bar_reaches_both_legs() {
    let mut book = Book::new(1.0);
    let entry = flat(0, 10.0);
    let request = OpenRequest::long(Sizing::quantity(10.0))
        .take_profit(11.0, 1.0)
        .stop_loss(9.0, 1.0)
        .fees(1.0);
    book.open(&entry, &request).unwrap();
    book.stats.mark(&book.ledger, entry.close);

    let wide = Bar::new(ts(1), 10.0, 11.0, 8.5, 10.5, 100.0);
    book.bar(&wide);

    assert!(!book.ledger.has_position());
    let closed = book.ledger.last_closed().unwrap();
    assert_eq!(closed.status(), PositionStatus::Closed);
    assert!((closed.realized_pnl() - 8.0).abs() < 1e-9);
    assert!(closed.reached_take_profit());
    assert!(!closed.reached_stop_loss());

    let stats = book.stats.snapshot();
    assert_eq!(stats.position_wins, 1);
    assert!((stats.gross_profit - 8.0).abs() < 1e-9);
    assert_eq!(stats.exit_wins, 1);
    assert_eq!(stats.exit_losses, 0);
    assert!(stats.profit_factor.is_infinite());
    assert!(book.recorder.by_type(EventType::SlHit).is_empty());
}

#[test]
fn two_losses_then_a_win_streaks() {
    let mut book = Book::new(0.0);
    let trades = [(10.0, 9.0), (10.0, 9.5), (10.0, 12.0)];
    for (i, (entry, exit)) in trades.into_iter().enumerate() {
        let hour = i as u32 * 2;
        book.open(&flat(hour, entry), &OpenRequest::long(Sizing::quantity(1.0)))
            .unwrap();
        book.bar(&flat(hour, entry));
        let exit_bar = flat(hour + 1, exit);
        book.close(&exit_bar, CloseSize::All, 0.0);
        book.bar(&exit_bar);
    }
    let stats = book.stats.snapshot();
    assert_eq!(stats.max_loss_streak, 2);
    assert_eq!(stats.current_win_streak, 1);
    assert_eq!(stats.max_win_streak, 1);
    assert_eq!(stats.position_losses, 2);
    assert_eq!(stats.closed_positions, 3);
}

#[test]
fn partial_legs_close_in_steps() {
    let mut book = Book::new(0.0);
    let request = OpenRequest::long(Sizing::quantity(100.0))
        .take_profit(11.0, 0.5)
        .take_profit(12.0, 0.5)
        .stop_loss(9.0, 1.0);
    book.open(&flat(0, 10.0), &request).unwrap();

    book.bar(&Bar::new(ts(1), 10.0, 11.2, 10.0, 11.0, 1.0));
    let position = book.ledger.position().unwrap();
    assert_eq!(position.qty(), 50.0);
    assert_eq!(position.take_profit_legs().len(), 1);
    assert_eq!(book.recorder.by_type(EventType::ClosePartial).len(), 1);

    book.bar(&Bar::new(ts(2), 11.0, 12.5, 11.0, 12.0, 1.0));
    assert!(!book.ledger.has_position());
    let closed = book.ledger.last_closed().unwrap();
    // 50 * 1 + 50 * 2
    assert!((closed.realized_pnl() - 150.0).abs() < 1e-9);
    assert_eq!(book.stats.snapshot().exit_wins, 2);
}

#[test]
fn short_stop_loss_fires_on_high() {
    let mut book = Book::new(0.0);
    let request = OpenRequest::short(Sizing::quantity(2.0))
        .take_profit(8.0, 1.0)
        .stop_loss(11.0, 1.0);
    book.open(&flat(0, 10.0), &request).unwrap();
    book.bar(&Bar::new(ts(1), 10.0, 11.5, 9.5, 11.2, 1.0));

    let closed = book.ledger.last_closed().unwrap();
    assert!((closed.realized_pnl() + 2.0).abs() < 1e-9);
    let stats = book.stats.snapshot();
    assert_eq!(stats.exit_losses, 1);
    assert_eq!(stats.short_losses, 1);
    assert_eq!(stats.max_loss, -2.0);
}

#[test]
fn opposite_open_is_rejected_without_side_effects() {
    let mut book = Book::new(0.0);
    book.open(&flat(0, 10.0), &OpenRequest::long(Sizing::quantity(1.0)))
        .unwrap();
    let before_events = book.recorder.len();
    let before_stats = book.stats.snapshot();
    let before_totals = book.ledger.totals();

    let err = book
        .open(&flat(1, 11.0), &OpenRequest::short(Sizing::quantity(1.0)))
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::PositionConflict {
            open: PositionSide::Long,
            requested: PositionSide::Short,
        }
    );
    assert_eq!(book.recorder.len(), before_events);
    assert_eq!(book.stats.snapshot(), before_stats);
    assert_eq!(book.ledger.totals(), before_totals);
    assert_eq!(book.ledger.position().unwrap().qty(), 1.0);
}

#[test]
fn value_sizing_divides_by_close() {
    let mut book = Book::new(0.0);
    book.open(&flat(0, 4.0), &OpenRequest::long(Sizing::value(100.0)))
        .unwrap();
    assert_eq!(book.ledger.position().unwrap().qty(), 25.0);
}

#[test]
fn increase_reprices_average_and_emits_increase() {
    let mut book = Book::new(0.0);
    book.open(&flat(0, 10.0), &OpenRequest::long(Sizing::quantity(1.0)))
        .unwrap();
    book.open(&flat(1, 13.0), &OpenRequest::long(Sizing::quantity(2.0)))
        .unwrap();
    let position = book.ledger.position().unwrap();
    assert_eq!(position.qty(), 3.0);
    assert!((position.avg_price() - 12.0).abs() < 1e-12);
    assert_eq!(book.ledger.totals().positions, 1);
    assert_eq!(book.recorder.last().unwrap().event_type, EventType::IncreaseLong);
}

#[test]
fn event_summary_counts_a_full_cycle() {
    let mut book = Book::new(0.0);
    let request = OpenRequest::long(Sizing::quantity(2.0)).take_profit(11.0, 0.5);
    book.open(&flat(0, 10.0), &request).unwrap();
    book.open(&flat(1, 10.0), &OpenRequest::long(Sizing::quantity(1.0)))
        .unwrap();
    book.bar(&Bar::new(ts(2), 10.0, 11.0, 10.0, 10.5, 1.0));
    book.close(&flat(3, 10.5), CloseSize::All, 0.0);

    let summary = book.recorder.summary();
    assert_eq!(summary.total_events, 5);
    assert_eq!(summary.total_positions_opened, 1);
    assert_eq!(summary.total_positions_closed, 1);
    assert_eq!(summary.tp_hits, 1);
    assert_eq!(summary.position_increases, 1);
}
