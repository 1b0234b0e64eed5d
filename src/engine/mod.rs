//! The closed-loop evaluation pipeline
//!
//! Per market, per tick: score the window state against the latest order
//! book, generate a fade signal, gate it through the risk manager, and
//! submit the surviving order through the execution engine. This is the
//! single externally driven entry point of the core.

use crate::alerts::{AlertKind, Alerter};
use crate::config::TradingMode;
use crate::detector::AnomalyDetector;
use crate::execution::{ExecutionEngine, OrderPayload, OrderResponse};
use crate::feed::BookCache;
use crate::market::OrderBookView;
use crate::risk::RiskManager;
use crate::storage::{FillRecord, OrderRecord, SignalRecord, Storage};
use crate::strategy::{FadeStrategy, Signal};
use crate::telemetry;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Wires the four core components into one evaluation pipeline.
///
/// Owns the strategy, risk, and execution state; evaluation is strictly
/// sequential, so check-then-record on the risk side never interleaves.
pub struct Engine {
    mode: TradingMode,
    detector: Arc<AnomalyDetector>,
    strategy: FadeStrategy,
    risk: RiskManager,
    execution: ExecutionEngine,
    storage: Arc<dyn Storage>,
    alerter: Arc<dyn Alerter>,
    order_size: f64,
    short_move_window_secs: u64,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: TradingMode,
        detector: Arc<AnomalyDetector>,
        strategy: FadeStrategy,
        risk: RiskManager,
        execution: ExecutionEngine,
        storage: Arc<dyn Storage>,
        alerter: Arc<dyn Alerter>,
        order_size: f64,
        short_move_window_secs: u64,
    ) -> Self {
        Self {
            mode,
            detector,
            strategy,
            risk,
            execution,
            storage,
            alerter,
            order_size,
            short_move_window_secs,
        }
    }

    /// Evaluate one market against its latest order book.
    ///
    /// Returns the order response when an order was submitted, `None` when
    /// the tick produced no signal or the risk gate rejected it. Permanent
    /// (4xx) submission failures propagate as errors; exhausted retries
    /// come back as a normal `error`-status response.
    pub async fn evaluate_tick(
        &mut self,
        market: &str,
        book: &OrderBookView,
    ) -> anyhow::Result<Option<OrderResponse>> {
        let now = Utc::now();
        let (score, features) = self.detector.score(market, book, now);
        telemetry::set_anomaly_score(market, score);

        let short_move = self
            .detector
            .short_move(market, self.short_move_window_secs, now);

        let signal = self.strategy.generate(
            market,
            book.mid(),
            short_move,
            score,
            &features,
            self.order_size,
        );

        self.storage
            .record_signal(SignalRecord {
                market: market.to_string(),
                timestamp: now,
                score,
                features,
            })
            .await;

        let Some(signal) = signal else {
            return Ok(None);
        };

        tracing::info!(
            market,
            side = signal.side.as_str(),
            price = signal.price,
            score = signal.score,
            reason = ?signal.reason,
            "fade signal generated"
        );
        telemetry::record_signal(market);
        self.alerter
            .notify(AlertKind::Signal, signal_alert(&signal))
            .await;

        if !self.risk.check_order(market, signal.size, signal.price, now) {
            telemetry::record_risk_rejection(market);
            self.alerter
                .notify(
                    AlertKind::Risk,
                    json!({ "market": market, "reason": "risk_block" }),
                )
                .await;
            return Ok(None);
        }

        let payload = OrderPayload::limit(market, signal.side, signal.price, signal.size);
        let response = self.execution.place_order(&payload).await?;
        self.risk.record_order(Utc::now());

        telemetry::record_order(market, response.status.as_str());
        self.storage
            .record_order(OrderRecord {
                market: market.to_string(),
                timestamp: Utc::now(),
                order_id: response.order_id.clone(),
                side: signal.side.as_str().to_string(),
                price: signal.price,
                size: signal.size,
                status: response.status.as_str().to_string(),
                payload: response.payload.clone(),
            })
            .await;
        self.alerter
            .notify(
                AlertKind::Order,
                json!({
                    "market": market,
                    "order_id": response.order_id,
                    "status": response.status.as_str(),
                }),
            )
            .await;

        Ok(Some(response))
    }

    /// Apply a confirmed fill from the orchestration layer.
    ///
    /// This is the only path that moves exposure and realized PnL.
    pub async fn apply_fill(
        &mut self,
        market: &str,
        order_id: &str,
        filled_size: f64,
        price: f64,
        pnl: f64,
    ) {
        self.risk.record_fill(market, filled_size, price, pnl);
        self.storage
            .record_fill(FillRecord {
                market: market.to_string(),
                timestamp: Utc::now(),
                order_id: order_id.to_string(),
                price,
                size: filled_size,
            })
            .await;
    }

    /// Run the evaluation loop until shutdown is signalled.
    ///
    /// One pass walks every market, evaluating against the latest cached
    /// book; markets with no book yet are skipped this tick.
    pub async fn run(
        &mut self,
        markets: &[String],
        books: Arc<BookCache>,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        self.alerter
            .notify(
                AlertKind::Health,
                json!({
                    "event": "startup",
                    "markets": markets,
                    "mode": format!("{:?}", self.mode),
                }),
            )
            .await;

        loop {
            for market in markets {
                if *shutdown.borrow() {
                    break;
                }
                let Some(book) = books.latest(market) else {
                    continue;
                };
                if let Err(error) = self.evaluate_tick(market, &book).await {
                    // Degrade to a recorded failure; the loop keeps going.
                    tracing::error!(market, %error, "evaluation tick failed");
                }
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("evaluation loop shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

fn signal_alert(signal: &Signal) -> serde_json::Value {
    json!({
        "market": signal.market,
        "side": signal.side.as_str(),
        "price": signal.price,
        "size": signal.size,
        "score": signal.score,
        "reason": signal.reason,
        "atr": signal.targets.atr,
        "tp_price": signal.targets.tp_price,
        "sl_price": signal.targets.sl_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::RecordingAlerter;
    use crate::config::{DetectorConfig, ExecutionConfig, RiskConfig, StrategyConfig};
    use crate::execution::OrderStatus;
    use crate::market::Trade;
    use crate::risk::StaticKillSwitch;
    use crate::storage::MemoryStorage;
    use chrono::Duration as ChronoDuration;

    fn book(bid: f64, ask: f64) -> OrderBookView {
        OrderBookView::from_levels(vec![(bid, 500.0)], vec![(ask, 10.0)])
    }

    fn trade(id: &str, price: f64, size: f64, ts: chrono::DateTime<Utc>) -> Trade {
        Trade {
            market: "m".to_string(),
            trade_id: id.to_string(),
            price,
            size,
            side: "buy".to_string(),
            timestamp: ts,
        }
    }

    struct Harness {
        engine: Engine,
        detector: Arc<AnomalyDetector>,
        storage: Arc<MemoryStorage>,
        alerter: Arc<RecordingAlerter>,
        kill_switch: Arc<StaticKillSwitch>,
    }

    fn harness(threshold: f64) -> Harness {
        let detector = Arc::new(AnomalyDetector::new(DetectorConfig::default()));
        let storage = Arc::new(MemoryStorage::new());
        let alerter = Arc::new(RecordingAlerter::new());
        let kill_switch = Arc::new(StaticKillSwitch::new(false));

        let strategy = FadeStrategy::new(StrategyConfig {
            anomaly_threshold: threshold,
            min_impact_per_volume: 1.0,
            ..Default::default()
        });
        let risk = RiskManager::new(RiskConfig::default(), kill_switch.clone());
        let execution = ExecutionEngine::new(
            TradingMode::Simulation,
            "http://127.0.0.1:1",
            None,
            None,
            &ExecutionConfig::default(),
            None,
        );

        let engine = Engine::new(
            TradingMode::Simulation,
            detector.clone(),
            strategy,
            risk,
            execution,
            storage.clone(),
            alerter.clone(),
            10.0,
            60,
        );
        Harness {
            engine,
            detector,
            storage,
            alerter,
            kill_switch,
        }
    }

    /// Feed enough anomalous flow that scoring clears a low threshold
    fn prime_anomaly(detector: &AnomalyDetector) {
        let now = Utc::now();
        for i in 0..10 {
            let ts = now - ChronoDuration::seconds(40 - i * 4);
            detector.update(
                "m",
                &[trade(&format!("t{i}"), 0.5000, 25.0, ts)],
                &book(0.45 + i as f64 * 0.01, 0.55 + i as f64 * 0.01),
                ts,
            );
        }
    }

    #[tokio::test]
    async fn test_quiet_market_yields_no_order() {
        let mut h = harness(0.75);
        let response = h.engine.evaluate_tick("m", &book(0.48, 0.52)).await.unwrap();
        assert!(response.is_none());
        // The signal record is written regardless.
        assert_eq!(h.storage.signals().await.len(), 1);
        assert!(h.storage.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_anomalous_market_places_simulated_order() {
        let mut h = harness(0.05);
        prime_anomaly(&h.detector);

        let response = h
            .engine
            .evaluate_tick("m", &book(0.55, 0.65))
            .await
            .unwrap()
            .expect("order expected");

        assert_eq!(response.status, OrderStatus::Simulated);

        let orders = h.storage.orders().await;
        assert_eq!(orders.len(), 1);
        // Mid rose, so the fade sells.
        assert_eq!(orders[0].side, "sell");

        let kinds: Vec<AlertKind> = h.alerter.events().iter().map(|(k, _)| *k).collect();
        assert!(kinds.contains(&AlertKind::Signal));
        assert!(kinds.contains(&AlertKind::Order));
    }

    #[tokio::test]
    async fn test_kill_switch_blocks_order_but_keeps_signal() {
        let mut h = harness(0.05);
        prime_anomaly(&h.detector);
        h.kill_switch.set_halted(true);

        let response = h.engine.evaluate_tick("m", &book(0.55, 0.65)).await.unwrap();
        assert!(response.is_none());
        assert!(h.storage.orders().await.is_empty());

        let kinds: Vec<AlertKind> = h.alerter.events().iter().map(|(k, _)| *k).collect();
        assert!(kinds.contains(&AlertKind::Signal));
        assert!(kinds.contains(&AlertKind::Risk));
        assert!(!kinds.contains(&AlertKind::Order));
    }

    #[tokio::test]
    async fn test_apply_fill_moves_exposure() {
        let mut h = harness(0.75);
        h.engine.apply_fill("m", "ord-1", 25.0, 0.5, -1.5).await;

        assert_eq!(h.storage.fills().await.len(), 1);
        let state = h.engine.risk.state();
        assert_eq!(state.exposures["m"].position, 25.0);
        assert_eq!(state.realized_pnl, -1.5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness(0.75);
        let books = Arc::new(BookCache::new());
        books.insert("m", book(0.48, 0.52));

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let markets = vec!["m".to_string()];
        h.engine
            .run(&markets, books, Duration::from_millis(10), rx)
            .await
            .unwrap();
    }
}
