//! Domain types for the ledger engine.

pub mod bar;
pub mod ids;
pub mod order;
pub mod position;

pub use bar::{Bar, BarError, BarValidator};
pub use ids::{EventId, IdGen, OrderId};
pub use order::Order;
pub use position::{
    ExitKind, ExitLeg, LegSpec, Position, PositionSide, PositionStatus, QTY_EPSILON,
};
