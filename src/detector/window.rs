//! Rolling per-market window state

use crate::market::Trade;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

/// Time-ordered microstructure history for a single market.
///
/// All three sequences are sorted ascending by timestamp and trimmed so the
/// oldest entry is no older than the baseline window. Trimming happens on
/// every update and before every score computation.
#[derive(Debug, Default)]
pub struct MarketWindowState {
    trades: VecDeque<Trade>,
    seen_trade_ids: HashSet<String>,
    mids: VecDeque<(DateTime<Utc>, f64)>,
    spreads: VecDeque<(DateTime<Utc>, f64)>,
}

impl MarketWindowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append new trade prints, skipping trade ids already in the window
    pub fn push_trades(&mut self, trades: &[Trade]) {
        for trade in trades {
            if self.seen_trade_ids.insert(trade.trade_id.clone()) {
                self.trades.push_back(trade.clone());
            }
        }
    }

    /// Append a (mid, spread) sample
    pub fn push_sample(&mut self, now: DateTime<Utc>, mid: f64, spread: f64) {
        self.mids.push_back((now, mid));
        self.spreads.push_back((now, spread));
    }

    /// Drop entries older than `cutoff` from the front of every sequence
    pub fn trim(&mut self, cutoff: DateTime<Utc>) {
        while self
            .trades
            .front()
            .is_some_and(|front| front.timestamp < cutoff)
        {
            if let Some(expired) = self.trades.pop_front() {
                self.seen_trade_ids.remove(&expired.trade_id);
            }
        }
        while let Some((ts, _)) = self.mids.front() {
            if *ts >= cutoff {
                break;
            }
            self.mids.pop_front();
        }
        while let Some((ts, _)) = self.spreads.front() {
            if *ts >= cutoff {
                break;
            }
            self.spreads.pop_front();
        }
    }

    /// Trades at or after `cutoff`
    pub fn trades_since(&self, cutoff: DateTime<Utc>) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(move |t| t.timestamp >= cutoff)
    }

    /// Total traded size at or after `cutoff`
    pub fn volume_since(&self, cutoff: DateTime<Utc>) -> f64 {
        self.trades_since(cutoff).map(|t| t.size).sum()
    }

    /// Last mid minus first mid among samples at or after `cutoff`.
    ///
    /// Zero with fewer than two samples, never a division or index error.
    pub fn mid_delta_since(&self, cutoff: DateTime<Utc>) -> f64 {
        let mut mids = self.mids.iter().filter(|(ts, _)| *ts >= cutoff);
        let first = match mids.next() {
            Some((_, mid)) => *mid,
            None => return 0.0,
        };
        match mids.last() {
            Some((_, last)) => last - first,
            None => 0.0,
        }
    }

    /// All retained spread values, oldest first
    pub fn spread_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.spreads.iter().map(|(_, s)| *s)
    }

    /// Most recent spread sample
    pub fn last_spread(&self) -> Option<f64> {
        self.spreads.back().map(|(_, s)| *s)
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    pub fn mid_count(&self) -> usize {
        self.mids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trade(id: &str, size: f64, ts: DateTime<Utc>) -> Trade {
        Trade {
            market: "m".to_string(),
            trade_id: id.to_string(),
            price: 0.5,
            size,
            side: "buy".to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_push_trades_deduplicates() {
        let now = Utc::now();
        let mut window = MarketWindowState::new();
        window.push_trades(&[trade("t1", 10.0, now), trade("t1", 10.0, now)]);
        window.push_trades(&[trade("t1", 10.0, now), trade("t2", 5.0, now)]);
        assert_eq!(window.trade_count(), 2);
        assert_eq!(window.volume_since(now - Duration::seconds(1)), 15.0);
    }

    #[test]
    fn test_trim_drops_old_entries() {
        let now = Utc::now();
        let mut window = MarketWindowState::new();
        window.push_trades(&[
            trade("old", 1.0, now - Duration::seconds(120)),
            trade("new", 2.0, now),
        ]);
        window.push_sample(now - Duration::seconds(120), 0.5, 0.02);
        window.push_sample(now, 0.6, 0.03);

        window.trim(now - Duration::seconds(60));
        assert_eq!(window.trade_count(), 1);
        assert_eq!(window.mid_count(), 1);
        assert_eq!(window.last_spread(), Some(0.03));
    }

    #[test]
    fn test_trim_allows_trade_id_reuse_after_expiry() {
        let now = Utc::now();
        let mut window = MarketWindowState::new();
        window.push_trades(&[trade("t1", 1.0, now - Duration::seconds(120))]);
        window.trim(now - Duration::seconds(60));
        assert_eq!(window.trade_count(), 0);

        window.push_trades(&[trade("t1", 1.0, now)]);
        assert_eq!(window.trade_count(), 1);
    }

    #[test]
    fn test_mid_delta_requires_two_samples() {
        let now = Utc::now();
        let mut window = MarketWindowState::new();
        assert_eq!(window.mid_delta_since(now - Duration::seconds(60)), 0.0);

        window.push_sample(now, 0.5, 0.02);
        assert_eq!(window.mid_delta_since(now - Duration::seconds(60)), 0.0);

        window.push_sample(now, 0.56, 0.02);
        let delta = window.mid_delta_since(now - Duration::seconds(60));
        assert!((delta - 0.06).abs() < 1e-12);
    }
}
