use serde::{Deserialize, Serialize};
use std::fmt;

/// Fill identifier, allocated in strictly increasing order by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o-{:06}", self.0)
    }
}

/// Event record identifier. Monotonic within one recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e-{}", self.0)
    }
}

/// Monotonic counter for deterministic ids (no wall clock, no randomness).
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next += 1;
        OrderId(self.next)
    }

    pub fn next_event_id(&mut self) -> EventId {
        self.next += 1;
        EventId(self.next)
    }
}
