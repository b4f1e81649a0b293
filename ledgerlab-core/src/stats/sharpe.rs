//! Fixed-capacity ring of cumulative realized PnL, one slot per completed
//! position, and the Sharpe-like ratio computed over it.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SHARPE_WINDOW: usize = 100;

/// Whether fees stay in the PnL stream fed to the Sharpe window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharpeFeePolicy {
    /// Realized PnL after fees.
    #[default]
    Net,
    /// Realized PnL with the position's fees added back.
    Gross,
}

/// Ring buffer: a preallocated arena plus a write index. Once full, each push
/// overwrites the oldest slot.
#[derive(Debug, Clone)]
pub struct SharpeWindow {
    slots: Vec<f64>,
    head: usize,
    len: usize,
}

impl Default for SharpeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SHARPE_WINDOW)
    }
}

impl SharpeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![0.0; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, cumulative_pnl: f64) {
        self.slots[self.head] = cumulative_pnl;
        self.head = (self.head + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Filled slots, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let cap = self.slots.len();
        let start = if self.len < cap { 0 } else { self.head };
        (0..self.len).map(move |i| self.slots[(start + i) % cap])
    }

    /// Step returns `Δ / |prior|`, with non-finite results dropped.
    pub fn returns(&self) -> Vec<f64> {
        let values: Vec<f64> = self.values().collect();
        values
            .windows(2)
            .map(|w| (w[1] - w[0]) / w[0].abs())
            .filter(|r| r.is_finite())
            .collect()
    }

    /// `mean / sample_std * sqrt(n)` over the finite returns. Zero with fewer
    /// than two returns or zero deviation.
    pub fn sharpe(&self) -> f64 {
        let returns = self.returns();
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = variance.sqrt();
        if std == 0.0 || !std.is_finite() {
            return 0.0;
        }
        mean / std * n.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_overwrites_oldest() {
        let mut w = SharpeWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.values().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn fewer_than_two_returns_is_zero() {
        let mut w = SharpeWindow::new(10);
        w.push(10.0);
        w.push(20.0);
        assert_eq!(w.returns().len(), 1);
        assert_eq!(w.sharpe(), 0.0);
    }

    #[test]
    fn zero_prior_returns_are_discarded() {
        let mut w = SharpeWindow::new(10);
        for v in [0.0, 0.0, 5.0, 10.0, 20.0] {
            w.push(v);
        }
        // 0→0 (NaN) and 0→5 (inf) dropped; 5→10 = 1.0, 10→20 = 1.0
        assert_eq!(w.returns(), vec![1.0, 1.0]);
        // zero deviation
        assert_eq!(w.sharpe(), 0.0);
    }

    #[test]
    fn known_sharpe_value() {
        let mut w = SharpeWindow::new(10);
        for v in [10.0, 20.0, 25.0, 50.0] {
            w.push(v);
        }
        // returns 1.0, 0.25, 1.0
        let r = [1.0, 0.25, 1.0];
        let mean: f64 = r.iter().sum::<f64>() / 3.0;
        let var: f64 = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 2.0;
        let expected = mean / var.sqrt() * 3.0_f64.sqrt();
        assert!((w.sharpe() - expected).abs() < 1e-12);
    }

    #[test]
    fn negative_prior_uses_absolute_value() {
        let mut w = SharpeWindow::new(10);
        w.push(-10.0);
        w.push(-5.0);
        assert_eq!(w.returns(), vec![0.5]);
    }
}
