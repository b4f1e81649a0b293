use crate::domain::ids::OrderId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Immutable fill record. Created by the ledger whenever it applies a fill and
/// owned by the position that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub price: f64,
    pub quantity: f64,
    pub timestamp: NaiveDateTime,
    pub fees: f64,
}
