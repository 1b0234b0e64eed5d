//! Append-only persistence seam
//!
//! All writes are fire-and-forget from the core's point of view: nothing
//! in the pipeline reads them back, and a failing backend must never stall
//! an evaluation tick. Durable backends live outside this crate; the
//! bundled implementation keeps records in memory for simulation and tests.

use crate::detector::FeatureSet;
use crate::market::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::RwLock;

/// Order-book snapshot record
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshotRecord {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// Scoring outcome record; the feature set rides along as an opaque blob
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
    pub features: FeatureSet,
}

/// Submitted order record
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub order_id: String,
    pub side: String,
    pub price: f64,
    pub size: f64,
    pub status: String,
    pub payload: serde_json::Value,
}

/// Fill record
#[derive(Debug, Clone, Serialize)]
pub struct FillRecord {
    pub market: String,
    pub timestamp: DateTime<Utc>,
    pub order_id: String,
    pub price: f64,
    pub size: f64,
}

/// Append-only storage capability
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist trades, deduplicated by (market, trade_id)
    async fn record_trades(&self, trades: &[Trade]);
    async fn record_book_snapshot(&self, snapshot: BookSnapshotRecord);
    async fn record_signal(&self, record: SignalRecord);
    async fn record_order(&self, record: OrderRecord);
    async fn record_fill(&self, record: FillRecord);
}

/// In-memory storage used in simulation mode and tests
#[derive(Default)]
pub struct MemoryStorage {
    trades: RwLock<Vec<Trade>>,
    seen_trades: RwLock<HashSet<(String, String)>>,
    snapshots: RwLock<Vec<BookSnapshotRecord>>,
    signals: RwLock<Vec<SignalRecord>>,
    orders: RwLock<Vec<OrderRecord>>,
    fills: RwLock<Vec<FillRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.trades.read().await.clone()
    }

    pub async fn signals(&self) -> Vec<SignalRecord> {
        self.signals.read().await.clone()
    }

    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.orders.read().await.clone()
    }

    pub async fn fills(&self) -> Vec<FillRecord> {
        self.fills.read().await.clone()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn record_trades(&self, trades: &[Trade]) {
        let mut seen = self.seen_trades.write().await;
        let mut stored = self.trades.write().await;
        for trade in trades {
            let key = (trade.market.clone(), trade.trade_id.clone());
            if seen.insert(key) {
                stored.push(trade.clone());
            }
        }
    }

    async fn record_book_snapshot(&self, snapshot: BookSnapshotRecord) {
        self.snapshots.write().await.push(snapshot);
    }

    async fn record_signal(&self, record: SignalRecord) {
        self.signals.write().await.push(record);
    }

    async fn record_order(&self, record: OrderRecord) {
        self.orders.write().await.push(record);
    }

    async fn record_fill(&self, record: FillRecord) {
        self.fills.write().await.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(market: &str, id: &str) -> Trade {
        Trade {
            market: market.to_string(),
            trade_id: id.to_string(),
            price: 0.5,
            size: 10.0,
            side: "buy".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_trades_deduplicated_by_market_and_id() {
        let storage = MemoryStorage::new();
        storage
            .record_trades(&[trade("a", "t1"), trade("a", "t1"), trade("b", "t1")])
            .await;
        storage.record_trades(&[trade("a", "t1")]).await;

        let trades = storage.trades().await;
        assert_eq!(trades.len(), 2);
    }

    #[tokio::test]
    async fn test_records_append() {
        let storage = MemoryStorage::new();
        storage
            .record_signal(SignalRecord {
                market: "m".to_string(),
                timestamp: Utc::now(),
                score: 0.8,
                features: FeatureSet::default(),
            })
            .await;
        storage
            .record_book_snapshot(BookSnapshotRecord {
                market: "m".to_string(),
                timestamp: Utc::now(),
                bids: vec![(0.49, 10.0)],
                asks: vec![(0.51, 10.0)],
            })
            .await;

        assert_eq!(storage.signals().await.len(), 1);
        assert_eq!(storage.snapshot_count().await, 1);
    }
}
