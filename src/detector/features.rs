//! Scoring features and the composite anomaly score

use serde::Serialize;

/// Weight on the normalized volume spike z-score
const W_VOLUME_SPIKE: f64 = 0.35;
/// Weight on the repeat-print share
const W_REPEAT_PRINT: f64 = 0.20;
/// Weight on the spread regime
const W_SPREAD_REGIME: f64 = 0.15;
/// Weight on absolute order-book imbalance
const W_IMBALANCE: f64 = 0.20;
/// Weight on the churn signal
const W_CHURN: f64 = 0.10;

/// Clamp to the unit interval
pub(crate) fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Traded volume within one configured window
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct WindowVolume {
    pub window_secs: u64,
    pub volume: f64,
}

/// Intermediate features produced by one scoring pass.
///
/// Returned by value and never mutated downstream; the strategy reads
/// `impact_per_volume` as its liquidity filter and the whole set is
/// serialized into signal records and alerts.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FeatureSet {
    /// Volume per configured window, in configuration order
    pub volumes: Vec<WindowVolume>,
    /// Max population z-score across the window volumes
    pub volume_spike_z: f64,
    /// Volume divided by absolute mid move over the churn window
    pub churn_ratio: f64,
    /// Share of trades repeating an exact (price, size) print
    pub repeat_print_score: f64,
    /// Absolute mid move per unit of churn-window volume
    pub impact_per_volume: f64,
    /// Current spread relative to the retained median, capped at 1.0
    pub spread_regime: f64,
    /// Signed top-of-book depth imbalance in [-1, 1]
    pub orderbook_imbalance: f64,
    /// Total volume over the full baseline window
    pub baseline_volume: f64,
    /// Composite score in [0, 1]
    pub anomaly_score: f64,
}

impl FeatureSet {
    /// Weighted composite of the individually clamped feature terms
    pub fn composite_score(&self) -> f64 {
        let spike = clamp01(self.volume_spike_z / 3.0);
        let spread = clamp01(self.spread_regime / 2.0);
        let imbalance = clamp01(self.orderbook_imbalance.abs());
        let churn = clamp01(self.churn_ratio / (self.baseline_volume + 1.0));

        clamp01(
            W_VOLUME_SPIKE * spike
                + W_REPEAT_PRINT * clamp01(self.repeat_print_score)
                + W_SPREAD_REGIME * spread
                + W_IMBALANCE * imbalance
                + W_CHURN * churn,
        )
    }
}
