//! Reference strategies.

pub mod donchian;
pub mod price_trigger;

pub use donchian::DonchianBreakout;
pub use price_trigger::PriceTrigger;
