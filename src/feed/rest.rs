//! REST market-data source
//!
//! Thin polling client for a CLOB-style REST API. Responses in the wild
//! come back either as bare arrays or wrapped in an envelope object, and
//! numbers sometimes arrive as strings; parsing is tolerant of both and
//! skips malformed entries rather than failing the whole fetch.

use crate::market::{MarketDataSource, MarketInfo, OrderBookView, Trade};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TRADES_LIMIT: usize = 200;

pub struct RestMarketDataSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_passphrase: Option<String>,
}

impl RestMarketDataSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        api_passphrase: Option<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            api_passphrase,
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        let mut request = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }
        if let Some(passphrase) = &self.api_passphrase {
            request = request.header("X-API-PASSPHRASE", passphrase);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        response.json().await.context("decoding response body")
    }
}

#[async_trait]
impl MarketDataSource for RestMarketDataSource {
    async fn list_markets(&self, limit: usize) -> anyhow::Result<Vec<MarketInfo>> {
        let url = format!("{}/markets", self.base_url);
        let body = self.get_json(&url, &[("limit", limit.to_string())]).await?;
        Ok(unwrap_items(body, "markets")
            .into_iter()
            .filter_map(parse_market)
            .collect())
    }

    async fn recent_trades(&self, market_id: &str) -> anyhow::Result<Vec<Trade>> {
        let url = format!("{}/markets/{}/trades", self.base_url, market_id);
        let body = self
            .get_json(&url, &[("limit", TRADES_LIMIT.to_string())])
            .await?;
        Ok(unwrap_items(body, "trades")
            .into_iter()
            .filter_map(|item| parse_trade(market_id, item))
            .collect())
    }

    async fn order_book(&self, market_id: &str) -> anyhow::Result<OrderBookView> {
        let url = format!("{}/markets/{}/orderbook", self.base_url, market_id);
        let body = self.get_json(&url, &[]).await?;
        let bids = parse_levels(body.get("bids"));
        let asks = parse_levels(body.get("asks"));
        Ok(OrderBookView::from_levels(bids, asks))
    }
}

/// Accept either a bare array or `{ "<key>": [...] }`
fn unwrap_items(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => vec![],
        },
        _ => vec![],
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_market(item: Value) -> Option<MarketInfo> {
    let market_id = as_string(item.get("id"))
        .or_else(|| as_string(item.get("condition_id")))
        .or_else(|| as_string(item.get("market_id")))?;
    let title = as_string(item.get("title"))
        .or_else(|| as_string(item.get("question")))
        .unwrap_or_default();
    Some(MarketInfo {
        market_id,
        title,
        status: as_string(item.get("status")).unwrap_or_else(|| "active".to_string()),
        volume: as_f64(item.get("volume")).unwrap_or(0.0),
    })
}

fn parse_trade(market_id: &str, item: Value) -> Option<Trade> {
    let trade_id = as_string(item.get("trade_id")).or_else(|| as_string(item.get("id")))?;
    let timestamp = as_string(item.get("timestamp"))
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    Some(Trade {
        market: market_id.to_string(),
        trade_id,
        price: as_f64(item.get("price"))?,
        size: as_f64(item.get("size"))?,
        side: as_string(item.get("side")).unwrap_or_else(|| "buy".to_string()),
        timestamp,
    })
}

fn parse_levels(value: Option<&Value>) -> Vec<(f64, f64)> {
    let Some(Value::Array(levels)) = value else {
        return vec![];
    };
    levels
        .iter()
        .filter_map(|level| match level {
            Value::Array(pair) if pair.len() >= 2 => {
                Some((as_f64(pair.first())?, as_f64(pair.get(1))?))
            }
            _ => None,
        })
        .collect()
}
