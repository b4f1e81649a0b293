//! Event recorder: append-only chronicle of discrete position transitions.
//!
//! Every record lands in the unbounded history and in a fixed-capacity recent
//! window used for cheap "latest N" polling by rendering and export consumers.
//! Past records are never mutated.

use crate::domain::{Bar, EventId, ExitKind, IdGen, OrderId, Position, PositionSide};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

/// Default capacity of the recent-events window.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OpenLong,
    OpenShort,
    IncreaseLong,
    IncreaseShort,
    ClosePartial,
    CloseFull,
    TpHit,
    SlHit,
}

impl EventType {
    pub const ALL: [EventType; 8] = [
        EventType::OpenLong,
        EventType::OpenShort,
        EventType::IncreaseLong,
        EventType::IncreaseShort,
        EventType::ClosePartial,
        EventType::CloseFull,
        EventType::TpHit,
        EventType::SlHit,
    ];

    pub fn open(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => EventType::OpenLong,
            PositionSide::Short => EventType::OpenShort,
        }
    }

    pub fn increase(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => EventType::IncreaseLong,
            PositionSide::Short => EventType::IncreaseShort,
        }
    }

    pub fn leg_hit(kind: ExitKind) -> Self {
        match kind {
            ExitKind::TakeProfit => EventType::TpHit,
            ExitKind::StopLoss => EventType::SlHit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::OpenLong => "open_long",
            EventType::OpenShort => "open_short",
            EventType::IncreaseLong => "increase_long",
            EventType::IncreaseShort => "increase_short",
            EventType::ClosePartial => "close_partial",
            EventType::CloseFull => "close_full",
            EventType::TpHit => "tp_hit",
            EventType::SlHit => "sl_hit",
        }
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type {s:?}"))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Shallow copy of the open position at the moment an event was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub side: PositionSide,
    pub quantity: f64,
    pub avg_price: f64,
    pub unrealized_pnl: f64,
}

impl PositionInfo {
    pub fn capture(position: &Position, market_price: f64) -> Self {
        Self {
            side: position.side(),
            quantity: position.qty(),
            avg_price: position.avg_price(),
            unrealized_pnl: position.unrealized_pnl(market_price),
        }
    }
}

/// Per-type payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    Entry {
        order_id: OrderId,
        /// Monetary value the quantity was derived from, when sized by value.
        value: Option<f64>,
        fees: f64,
        take_profit_levels: usize,
        stop_loss_levels: usize,
    },
    Exit {
        order_id: OrderId,
        percentage: Option<f64>,
        fees: f64,
        was_full_position: bool,
        unrealized_pnl_at_close: f64,
        /// PnL realized by this fill alone.
        fill_pnl: f64,
        /// Cumulative realized PnL of the position after this fill.
        realized_pnl: f64,
    },
    LegHit {
        trigger_price: f64,
        leg_quantity: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub timestamp: NaiveDateTime,
    pub event_type: EventType,
    pub price: f64,
    pub quantity: f64,
    pub bar: Bar,
    pub position: Option<PositionInfo>,
    pub detail: EventDetail,
}

/// Event counts by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_events: usize,
    pub event_types: BTreeMap<EventType, usize>,
    pub total_positions_opened: usize,
    pub total_positions_closed: usize,
    pub tp_hits: usize,
    pub sl_hits: usize,
    pub position_increases: usize,
}

#[derive(Debug, Clone)]
pub struct EventRecorder {
    ids: IdGen,
    history: Vec<EventRecord>,
    recent: VecDeque<EventRecord>,
    recent_capacity: usize,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl EventRecorder {
    pub fn new(recent_capacity: usize) -> Self {
        let recent_capacity = recent_capacity.max(1);
        Self {
            ids: IdGen::default(),
            history: Vec::new(),
            recent: VecDeque::with_capacity(recent_capacity),
            recent_capacity,
        }
    }

    /// Append a record. The position snapshot is taken only while the
    /// position still holds quantity.
    pub fn record(
        &mut self,
        event_type: EventType,
        bar: &Bar,
        position: Option<&Position>,
        price: f64,
        quantity: f64,
        detail: EventDetail,
    ) -> EventRecord {
        let record = EventRecord {
            id: self.ids.next_event_id(),
            timestamp: bar.timestamp,
            event_type,
            price,
            quantity,
            bar: *bar,
            position: position
                .filter(|p| p.is_open())
                .map(|p| PositionInfo::capture(p, bar.close)),
            detail,
        };
        self.history.push(record.clone());
        if self.recent.len() == self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(record.clone());
        record
    }

    pub fn all(&self) -> &[EventRecord] {
        &self.history
    }

    /// Recent window, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &EventRecord> {
        self.recent.iter()
    }

    pub fn recent_vec(&self) -> Vec<EventRecord> {
        self.recent.iter().cloned().collect()
    }

    pub fn recent_capacity(&self) -> usize {
        self.recent_capacity
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.history.last()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn by_type(&self, event_type: EventType) -> Vec<&EventRecord> {
        self.history
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Records with `start <= timestamp <= end`.
    pub fn in_timeframe(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<&EventRecord> {
        self.history
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .collect()
    }

    /// Empty the recent window. History is untouched.
    pub fn clear_recent(&mut self) {
        self.recent.clear();
    }

    pub fn summary(&self) -> EventSummary {
        let mut summary = EventSummary {
            total_events: self.history.len(),
            ..EventSummary::default()
        };
        for event in &self.history {
            *summary.event_types.entry(event.event_type).or_insert(0) += 1;
            match event.event_type {
                EventType::OpenLong | EventType::OpenShort => summary.total_positions_opened += 1,
                EventType::CloseFull => summary.total_positions_closed += 1,
                EventType::TpHit => summary.tp_hits += 1,
                EventType::SlHit => summary.sl_hits += 1,
                EventType::IncreaseLong | EventType::IncreaseShort => {
                    summary.position_increases += 1
                }
                EventType::ClosePartial => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(minute: u32) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap();
        Bar::new(ts, 10.0, 11.0, 9.0, 10.5, 100.0)
    }

    fn hit() -> EventDetail {
        EventDetail::LegHit {
            trigger_price: 11.0,
            leg_quantity: 1.0,
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let mut rec = EventRecorder::new(10);
        let a = rec.record(EventType::TpHit, &bar(0), None, 11.0, 1.0, hit());
        let b = rec.record(EventType::SlHit, &bar(1), None, 9.0, 1.0, hit());
        assert!(b.id > a.id);
    }

    #[test]
    fn recent_window_evicts_oldest() {
        let mut rec = EventRecorder::new(2);
        for minute in 0..5 {
            rec.record(EventType::TpHit, &bar(minute), None, 11.0, 1.0, hit());
        }
        assert_eq!(rec.len(), 5);
        let recent: Vec<_> = rec.recent().map(|e| e.timestamp.format("%M").to_string()).collect();
        assert_eq!(recent, vec!["03", "04"]);
    }

    #[test]
    fn filters_by_type_and_timeframe() {
        let mut rec = EventRecorder::default();
        rec.record(EventType::TpHit, &bar(0), None, 11.0, 1.0, hit());
        rec.record(EventType::SlHit, &bar(5), None, 9.0, 1.0, hit());
        rec.record(EventType::TpHit, &bar(10), None, 11.0, 1.0, hit());

        assert_eq!(rec.by_type(EventType::TpHit).len(), 2);
        assert_eq!(rec.in_timeframe(bar(1).timestamp, bar(10).timestamp).len(), 2);
    }

    #[test]
    fn clear_recent_keeps_history() {
        let mut rec = EventRecorder::default();
        rec.record(EventType::TpHit, &bar(0), None, 11.0, 1.0, hit());
        rec.clear_recent();
        assert_eq!(rec.recent().count(), 0);
        assert_eq!(rec.all().len(), 1);
    }

    #[test]
    fn summary_counts_categories() {
        let mut rec = EventRecorder::default();
        rec.record(EventType::TpHit, &bar(0), None, 11.0, 1.0, hit());
        rec.record(EventType::TpHit, &bar(1), None, 11.0, 1.0, hit());
        rec.record(EventType::SlHit, &bar(2), None, 9.0, 1.0, hit());
        let summary = rec.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.tp_hits, 2);
        assert_eq!(summary.sl_hits, 1);
        assert_eq!(summary.event_types[&EventType::TpHit], 2);
    }

    #[test]
    fn event_type_parses_its_own_name() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>(), Ok(t));
        }
        assert!("tp-hit".parse::<EventType>().is_err());
    }

    #[test]
    fn event_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&EventType::IncreaseShort).unwrap();
        assert_eq!(json, "\"increase_short\"");
    }
}
