//! Market-data domain types and the market-data source seam
//!
//! The core consumes parsed [`Trade`] and [`OrderBookView`] values; transport
//! (REST polling, WebSocket subscription) lives behind [`MarketDataSource`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a listed market, used for discovery/selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    /// Market identifier
    pub market_id: String,
    /// Human-readable title/question
    pub title: String,
    /// Listing status (e.g. "active")
    pub status: String,
    /// Lifetime traded volume
    pub volume: f64,
}

impl MarketInfo {
    /// Whether this market is open for trading
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// An executed trade print
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Market identifier
    pub market: String,
    /// Unique trade identifier within the market
    pub trade_id: String,
    /// Execution price
    pub price: f64,
    /// Executed size
    pub size: f64,
    /// Aggressor side ("buy"/"sell")
    pub side: String,
    /// Execution timestamp
    pub timestamp: DateTime<Utc>,
}

/// A point-in-time view of an order book
///
/// Levels are (price, size) pairs sorted best-to-worst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookView {
    pub best_bid: f64,
    pub best_ask: f64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl OrderBookView {
    /// Build a view from raw level arrays; best prices come from the tops
    pub fn from_levels(bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> Self {
        let best_bid = bids.first().map(|(p, _)| *p).unwrap_or(0.0);
        let best_ask = asks.first().map(|(p, _)| *p).unwrap_or(0.0);
        Self {
            best_bid,
            best_ask,
            bids,
            asks,
        }
    }

    /// Midpoint between best bid and best ask
    pub fn mid(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> f64 {
        self.best_ask - self.best_bid
    }
}

/// Abstract market-data source
///
/// Implementations own transport concerns (HTTP, reconnects, parsing);
/// the core only sees well-formed values.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// List markets available for trading
    async fn list_markets(&self, limit: usize) -> anyhow::Result<Vec<MarketInfo>>;

    /// Fetch recent trade prints for a market
    async fn recent_trades(&self, market_id: &str) -> anyhow::Result<Vec<Trade>>;

    /// Fetch the current order book for a market
    async fn order_book(&self, market_id: &str) -> anyhow::Result<OrderBookView>;
}

/// Select markets to evaluate: the allowlist verbatim, otherwise the most
/// active markets by volume capped at `top_n`.
pub async fn select_markets(
    source: &dyn MarketDataSource,
    allowlist: &[String],
    top_n: usize,
) -> anyhow::Result<Vec<String>> {
    if !allowlist.is_empty() {
        return Ok(allowlist.to_vec());
    }
    let mut markets: Vec<MarketInfo> = source
        .list_markets(top_n.max(200))
        .await?
        .into_iter()
        .filter(|m| m.is_active())
        .collect();
    markets.sort_by(|a, b| b.volume.total_cmp(&a.volume));
    markets.truncate(top_n);
    Ok(markets.into_iter().map(|m| m.market_id).collect())
}
