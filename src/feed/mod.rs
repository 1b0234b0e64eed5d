//! Market-data ingestion
//!
//! One ingestion task receives feed events and writes them into the
//! detector's window state and storage; a separate polling task drives a
//! [`MarketDataSource`] and publishes events over a channel. Both support
//! graceful shutdown with a bounded join timeout.

mod rest;

pub use rest::RestMarketDataSource;

use crate::detector::AnomalyDetector;
use crate::market::{MarketDataSource, OrderBookView, Trade};
use crate::storage::{BookSnapshotRecord, Storage};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// An event delivered by the market-data feed
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Trades { market: String, trades: Vec<Trade> },
    Book { market: String, book: OrderBookView },
}

/// Latest order-book view per market, shared between the ingestion task
/// and the evaluation loop
#[derive(Default)]
pub struct BookCache {
    books: RwLock<HashMap<String, OrderBookView>>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, market: &str, book: OrderBookView) {
        self.books
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(market.to_string(), book);
    }

    pub fn latest(&self, market: &str) -> Option<OrderBookView> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(market)
            .cloned()
    }
}

/// Handle to a spawned feed task
pub struct TaskHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Request a graceful stop and wait up to `timeout` for the task to
    /// finish; abort it if the deadline passes.
    pub async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(timeout, self.join).await.is_err() {
            tracing::warn!("feed task did not stop within timeout, aborting");
        }
    }
}

/// Spawn the ingestion task: consumes feed events, updates the detector's
/// windows and the book cache, and persists raw data.
///
/// Per market, events are applied in arrival order; the channel closing or
/// a shutdown signal ends the task.
pub fn spawn_ingestor(
    detector: Arc<AnomalyDetector>,
    books: Arc<BookCache>,
    storage: Arc<dyn Storage>,
    mut events: mpsc::Receiver<FeedEvent>,
) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("ingestor shutting down");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => handle_event(&detector, &books, storage.as_ref(), event).await,
                        None => {
                            tracing::info!("feed channel closed, ingestor stopping");
                            break;
                        }
                    }
                }
            }
        }
    });
    TaskHandle {
        shutdown: shutdown_tx,
        join,
    }
}

async fn handle_event(
    detector: &AnomalyDetector,
    books: &BookCache,
    storage: &dyn Storage,
    event: FeedEvent,
) {
    let now = Utc::now();
    match event {
        FeedEvent::Trades { market, trades } => {
            storage.record_trades(&trades).await;
            // Without a book yet there is no (mid, spread) sample to take;
            // the trades land in the window on the next book event instead.
            if let Some(book) = books.latest(&market) {
                detector.update(&market, &trades, &book, now);
            }
        }
        FeedEvent::Book { market, book } => {
            storage
                .record_book_snapshot(BookSnapshotRecord {
                    market: market.clone(),
                    timestamp: now,
                    bids: book.bids.clone(),
                    asks: book.asks.clone(),
                })
                .await;
            detector.update(&market, &[], &book, now);
            books.insert(&market, book);
        }
    }
}

/// Spawn a polling task that drives a [`MarketDataSource`] and publishes
/// feed events. Transport failures back off and retry; the poll cadence
/// otherwise stays fixed.
pub fn spawn_polling(
    source: Arc<dyn MarketDataSource>,
    markets: Vec<String>,
    poll_interval: Duration,
    events: mpsc::Sender<FeedEvent>,
) -> TaskHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut error_streak: u32 = 0;
        loop {
            for market in &markets {
                if *shutdown_rx.borrow() {
                    break;
                }
                match poll_market(source.as_ref(), market, &events).await {
                    Ok(()) => error_streak = 0,
                    Err(error) => {
                        error_streak += 1;
                        let backoff = poll_interval * error_streak.min(6);
                        tracing::warn!(market, %error, streak = error_streak, "feed poll failed, backing off");
                        tokio::select! {
                            _ = shutdown_rx.changed() => {}
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    tracing::info!("feed poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    });
    TaskHandle {
        shutdown: shutdown_tx,
        join,
    }
}

async fn poll_market(
    source: &dyn MarketDataSource,
    market: &str,
    events: &mpsc::Sender<FeedEvent>,
) -> anyhow::Result<()> {
    let book = source.order_book(market).await?;
    let trades = source.recent_trades(market).await?;
    events
        .send(FeedEvent::Book {
            market: market.to_string(),
            book,
        })
        .await?;
    if !trades.is_empty() {
        events
            .send(FeedEvent::Trades {
                market: market.to_string(),
                trades,
            })
            .await?;
    }
    Ok(())
}
