//! Best-effort hand-off of per-bar frames to a consumer outside the engine
//! (a chart, a dashboard, a logger).
//!
//! Pushing never blocks. A frame the consumer cannot take is dropped and
//! counted; ledger and statistics are unaffected.

use crate::domain::Bar;
use crate::events::EventRecord;
use crate::ledger::PositionDetails;
use crate::stats::StatsSnapshot;
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Everything a consumer needs to redraw after one bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub bar_index: usize,
    pub bar: Bar,
    pub stats: StatsSnapshot,
    pub position: Option<PositionDetails>,
    pub recent_events: Vec<EventRecord>,
}

pub trait SnapshotSink: Send {
    /// Offer a frame. Returns `false` if it was dropped.
    fn push(&mut self, frame: Frame) -> bool;
}

/// Bounded channel sink. The receiving half goes to the consumer thread.
#[derive(Debug)]
pub struct ChannelSink {
    tx: SyncSender<Frame>,
    dropped: usize,
    disconnected: bool,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (
            Self {
                tx,
                dropped: 0,
                disconnected: false,
            },
            rx,
        )
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The receiver has gone away; every later push is dropped.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl SnapshotSink for ChannelSink {
    fn push(&mut self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                self.disconnected = true;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn frame(i: usize) -> Frame {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        Frame {
            bar_index: i,
            bar: Bar::new(ts, 1.0, 1.0, 1.0, 1.0, 0.0),
            stats: StatsSnapshot::default(),
            position: None,
            recent_events: Vec::new(),
        }
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (mut sink, rx) = ChannelSink::bounded(1);
        assert!(sink.push(frame(0)));
        assert!(!sink.push(frame(1)));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.recv().unwrap().bar_index, 0);
        assert!(sink.push(frame(2)));
    }

    #[test]
    fn disconnected_receiver_is_reported() {
        let (mut sink, rx) = ChannelSink::bounded(4);
        drop(rx);
        assert!(!sink.push(frame(0)));
        assert!(sink.is_disconnected());
    }
}
