//! Anomaly detection over rolling market microstructure windows
//!
//! Scores each market for short-horizon anomalous activity: volume spikes,
//! wash-like repeat prints, churn without price movement, spread widening,
//! and order-book imbalance, combined into a single score in [0, 1].

mod features;
mod window;

pub use features::{FeatureSet, WindowVolume};
pub use window::MarketWindowState;

use crate::config::DetectorConfig;
use crate::market::{OrderBookView, Trade};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Windowed statistical anomaly scorer.
///
/// Owns all per-market window state. Each market's window is an
/// independently lockable unit, so the ingestion task and the evaluation
/// loop can touch different markets without contention. No lock is ever
/// held across an await point.
pub struct AnomalyDetector {
    config: DetectorConfig,
    windows: RwLock<HashMap<String, Arc<Mutex<MarketWindowState>>>>,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Get or lazily create the window for a market
    fn window(&self, market: &str) -> Arc<Mutex<MarketWindowState>> {
        {
            let windows = self
                .windows
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(window) = windows.get(market) {
                return Arc::clone(window);
            }
        }
        let mut windows = self
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            windows
                .entry(market.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(MarketWindowState::new()))),
        )
    }

    fn baseline_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::seconds(self.config.baseline_window_secs as i64)
    }

    /// Append new trades and a fresh (mid, spread) sample, then trim
    pub fn update(&self, market: &str, trades: &[Trade], book: &OrderBookView, now: DateTime<Utc>) {
        let window = self.window(market);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.push_trades(trades);
        window.push_sample(now, book.mid(), book.spread());
        window.trim(self.baseline_cutoff(now));
    }

    /// Score a market against the current order book.
    ///
    /// Side-effect-free apart from the trim it performs first. Unknown
    /// markets score from an empty window rather than erroring.
    pub fn score(&self, market: &str, book: &OrderBookView, now: DateTime<Utc>) -> (f64, FeatureSet) {
        let window = self.window(market);
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.trim(self.baseline_cutoff(now));

        let mut features = FeatureSet {
            baseline_volume: window.volume_since(self.baseline_cutoff(now)),
            ..Default::default()
        };

        // Volume spike: z-score each configured window's volume against the
        // population of window volumes; take the max.
        let volumes: Vec<f64> = self
            .config
            .volume_windows_secs
            .iter()
            .map(|&secs| {
                let volume = window.volume_since(now - Duration::seconds(secs as i64));
                features.volumes.push(WindowVolume {
                    window_secs: secs,
                    volume,
                });
                volume
            })
            .collect();
        features.volume_spike_z = max_z_score(&volumes);

        // Churn and price impact over the churn window.
        let churn_cutoff = now - Duration::seconds(self.config.churn_window_secs as i64);
        let churn_volume = window.volume_since(churn_cutoff);
        let churn_mid_delta = window.mid_delta_since(churn_cutoff).abs();
        features.churn_ratio = if churn_mid_delta == 0.0 {
            0.0
        } else {
            churn_volume / churn_mid_delta
        };
        features.impact_per_volume = if churn_volume == 0.0 {
            0.0
        } else {
            churn_mid_delta / churn_volume
        };

        let repeat_cutoff = now - Duration::seconds(self.config.repeat_print_window_secs as i64);
        features.repeat_print_score = repeat_print_score(window.trades_since(repeat_cutoff));

        features.spread_regime = spread_regime(&window);
        features.orderbook_imbalance =
            orderbook_imbalance(book, self.config.imbalance_depth_levels);

        features.anomaly_score = features.composite_score();
        (features.anomaly_score, features)
    }

    /// Mid-price move over the trailing window: last sample minus first.
    ///
    /// Zero with fewer than two samples.
    pub fn short_move(&self, market: &str, window_secs: u64, now: DateTime<Utc>) -> f64 {
        let window = self.window(market);
        let window = window.lock().unwrap_or_else(PoisonError::into_inner);
        window.mid_delta_since(now - Duration::seconds(window_secs as i64))
    }
}

/// Max population z-score across the values; zero when the deviation is zero
fn max_z_score(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        return 0.0;
    }
    values
        .iter()
        .map(|v| (v - mean) / std)
        .fold(0.0, f64::max)
}

/// Share of trades that repeat an exact (price, size) print, capped at 1.0.
///
/// Prices and sizes are bucketed at 4 decimals so float noise does not
/// split otherwise identical prints.
fn repeat_print_score<'a>(trades: impl Iterator<Item = &'a Trade>) -> f64 {
    let mut buckets: HashMap<(i64, i64), usize> = HashMap::new();
    let mut total = 0usize;
    for trade in trades {
        let key = (
            (trade.price * 10_000.0).round() as i64,
            (trade.size * 10_000.0).round() as i64,
        );
        *buckets.entry(key).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let repeats: usize = buckets.values().filter(|&&count| count > 1).sum();
    if repeats == 0 {
        return 0.0;
    }
    (repeats as f64 / total as f64).min(1.0)
}

/// Current spread relative to the median retained spread, capped at 1.0
fn spread_regime(window: &MarketWindowState) -> f64 {
    let mut spreads: Vec<f64> = window.spread_values().collect();
    if spreads.is_empty() {
        return 0.0;
    }
    spreads.sort_by(f64::total_cmp);
    let median = spreads[spreads.len() / 2];
    if median == 0.0 {
        return 0.0;
    }
    let current = window.last_spread().unwrap_or(0.0);
    (current / median).min(1.0)
}

/// Signed depth imbalance over the top `levels` book levels, in [-1, 1]
fn orderbook_imbalance(book: &OrderBookView, levels: usize) -> f64 {
    let bid_depth: f64 = book.bids.iter().take(levels).map(|(_, size)| size).sum();
    let ask_depth: f64 = book.asks.iter().take(levels).map(|(_, size)| size).sum();
    let total = bid_depth + ask_depth;
    if total == 0.0 {
        return 0.0;
    }
    (bid_depth - ask_depth) / total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(DetectorConfig {
            volume_windows_secs: vec![60, 300],
            baseline_window_secs: 1800,
            churn_window_secs: 300,
            repeat_print_window_secs: 120,
            imbalance_depth_levels: 5,
        })
    }

    fn book(best_bid: f64, best_ask: f64) -> OrderBookView {
        OrderBookView::from_levels(vec![(best_bid, 100.0)], vec![(best_ask, 100.0)])
    }

    fn trade(id: &str, price: f64, size: f64, ts: DateTime<Utc>) -> Trade {
        Trade {
            market: "m".to_string(),
            trade_id: id.to_string(),
            price,
            size,
            side: "buy".to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_unknown_market_scores_empty() {
        let detector = detector();
        let (score, features) = detector.score("never-seen", &book(0.48, 0.52), Utc::now());
        assert_eq!(score, 0.0);
        assert_eq!(features.churn_ratio, 0.0);
        assert_eq!(features.impact_per_volume, 0.0);
    }

    #[test]
    fn test_single_sample_delta_features_are_zero() {
        let detector = detector();
        let now = Utc::now();
        let book = book(0.48, 0.52);

        detector.update("m", &[trade("t1", 0.5, 10.0, now)], &book, now);
        let (_, features) = detector.score("m", &book, now);

        // One mid sample: no mid delta, so churn is zero but impact is too
        // (delta numerator is zero, volume denominator is not).
        assert_eq!(features.churn_ratio, 0.0);
        assert_eq!(features.impact_per_volume, 0.0);
    }

    #[test]
    fn test_churn_and_impact_are_inverses() {
        let detector = detector();
        let now = Utc::now();

        detector.update(
            "m",
            &[trade("t1", 0.50, 40.0, now)],
            &book(0.48, 0.52),
            now - Duration::seconds(30),
        );
        detector.update(
            "m",
            &[trade("t2", 0.51, 10.0, now)],
            &book(0.50, 0.54),
            now,
        );

        let (_, features) = detector.score("m", &book(0.50, 0.54), now);
        // mid moved 0.50 -> 0.52, volume 50
        assert!((features.churn_ratio - 50.0 / 0.02).abs() < 1e-9);
        assert!((features.impact_per_volume - 0.02 / 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeat_print_score_flags_identical_prints() {
        let now = Utc::now();
        let trades = vec![
            trade("a", 0.5000, 10.0, now),
            trade("b", 0.5000, 10.0, now),
            trade("c", 0.5000, 10.0, now),
            trade("d", 0.6123, 3.0, now),
        ];
        let score = repeat_print_score(trades.iter());
        assert!((score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_repeat_print_score_no_repeats() {
        let now = Utc::now();
        let trades = vec![trade("a", 0.50, 10.0, now), trade("b", 0.51, 10.0, now)];
        assert_eq!(repeat_print_score(trades.iter()), 0.0);
    }

    #[test]
    fn test_max_z_score_zero_std() {
        assert_eq!(max_z_score(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(max_z_score(&[]), 0.0);
    }

    #[test]
    fn test_max_z_score_spike() {
        // mean 4, population std 2.4495 -> max z for 7 is ~1.2247
        let z = max_z_score(&[1.0, 4.0, 7.0]);
        assert!((z - 1.224_744_871).abs() < 1e-6);
    }

    #[test]
    fn test_orderbook_imbalance_signed() {
        let bid_heavy = OrderBookView::from_levels(
            vec![(0.49, 300.0), (0.48, 100.0)],
            vec![(0.51, 100.0)],
        );
        let imb = orderbook_imbalance(&bid_heavy, 5);
        assert!((imb - 0.6).abs() < 1e-12);

        let empty = OrderBookView::from_levels(vec![], vec![]);
        assert_eq!(orderbook_imbalance(&empty, 5), 0.0);
    }

    #[test]
    fn test_score_clamped_for_extreme_inputs() {
        let detector = detector();
        let now = Utc::now();
        let wide = OrderBookView::from_levels(vec![(0.10, 1e9)], vec![(0.90, 1.0)]);

        for i in 0..50 {
            let ts = now - Duration::seconds(50 - i);
            detector.update(
                "m",
                &[trade(&format!("t{i}"), 0.5, 1e6, ts)],
                &wide,
                ts,
            );
        }
        let (score, _) = detector.score("m", &wide, now);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_score_idempotent_with_empty_updates() {
        let detector = detector();
        let now = Utc::now();
        let book = book(0.48, 0.52);

        detector.update("m", &[trade("t1", 0.5, 20.0, now)], &book, now);
        let (first, _) = detector.score("m", &book, now);

        detector.update("m", &[], &book, now);
        detector.update("m", &[], &book, now);
        let (second, _) = detector.score("m", &book, now);

        assert_eq!(first, second);
    }

    #[test]
    fn test_short_move_direction() {
        let detector = detector();
        let now = Utc::now();

        detector.update("m", &[], &book(0.48, 0.52), now - Duration::seconds(30));
        detector.update("m", &[], &book(0.52, 0.56), now);

        let mv = detector.short_move("m", 60, now);
        assert!((mv - 0.04).abs() < 1e-12);

        // Outside the window: only the latest sample remains visible.
        assert_eq!(detector.short_move("m", 1, now), 0.0);
    }
}
