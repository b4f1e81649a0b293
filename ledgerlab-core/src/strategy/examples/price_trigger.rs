//! Price trigger: open a preset request once the bar range touches a level.

use crate::domain::Bar;
use crate::engine::EngineError;
use crate::ledger::OpenRequest;
use crate::strategy::{Desk, Strategy};

/// Fires `request` on the first bar whose low/high range contains `level`.
///
/// With `repeat` set it fires on every touching bar, which increases the open
/// position when the side matches.
#[derive(Debug, Clone)]
pub struct PriceTrigger {
    level: f64,
    request: OpenRequest,
    repeat: bool,
    fired: bool,
}

impl PriceTrigger {
    pub fn new(level: f64, request: OpenRequest) -> Self {
        Self {
            level,
            request,
            repeat: false,
            fired: false,
        }
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}

impl Strategy for PriceTrigger {
    fn name(&self) -> &str {
        "price_trigger"
    }

    fn on_bar(&mut self, bar: &Bar, desk: &mut Desk<'_>) -> Result<(), EngineError> {
        if (self.fired && !self.repeat) || !bar.contains(self.level) {
            return Ok(());
        }
        // Rejections are counted and logged by the desk.
        if desk.open(&self.request).is_ok() {
            self.fired = true;
        }
        Ok(())
    }
}
