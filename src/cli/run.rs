//! Run command implementation
//!
//! Wires the feed, detector, strategy, risk, and execution components
//! together and drives the evaluation loop until Ctrl-C.

use crate::alerts::{Alerter, LogAlerter};
use crate::config::{Config, ConfigError, SignerMode, TradingMode};
use crate::detector::AnomalyDetector;
use crate::engine::Engine;
use crate::execution::{ExecutionEngine, LocalKeySigner, RemoteSigner, WalletSigner};
use crate::feed::{spawn_ingestor, spawn_polling, BookCache, RestMarketDataSource};
use crate::market::select_markets;
use crate::risk::{FileKillSwitch, RiskManager};
use crate::storage::{MemoryStorage, Storage};
use crate::strategy::FadeStrategy;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const FEED_CHANNEL_CAPACITY: usize = 256;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the number of discovered markets to trade
    #[arg(long)]
    pub top_n: Option<usize>,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let order_size = config.execution.resolve_order_size()?;
        let signer = build_signer(&config)?;

        if config.app.mode == TradingMode::Live {
            tracing::warn!("live trading mode enabled, orders will be submitted");
        } else {
            tracing::info!("simulation mode, no orders leave the process");
        }

        let source = Arc::new(RestMarketDataSource::new(
            &config.feed.rest_base_url,
            config.feed.api_key.clone(),
            config.feed.api_passphrase.clone(),
        ));

        let top_n = self.top_n.unwrap_or(config.app.top_n_by_volume);
        let markets =
            select_markets(source.as_ref(), &config.app.allowlist_markets, top_n).await?;
        if markets.is_empty() {
            anyhow::bail!("no tradable markets selected");
        }
        tracing::info!(count = markets.len(), "selected markets");

        let detector = Arc::new(AnomalyDetector::new(config.detector.clone()));
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let alerter: Arc<dyn Alerter> = Arc::new(LogAlerter);
        let books = Arc::new(BookCache::new());

        let strategy = FadeStrategy::new(config.strategy.clone());
        let kill_switch = Arc::new(FileKillSwitch::new(&config.risk.kill_switch_file));
        let risk = RiskManager::new(config.risk.clone(), kill_switch);
        let execution = ExecutionEngine::new(
            config.app.mode,
            &config.feed.rest_base_url,
            config.feed.api_key.clone(),
            config.feed.api_passphrase.clone(),
            &config.execution,
            signer,
        );

        let (event_tx, event_rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let poll_interval = Duration::from_secs(config.app.poll_interval_secs);
        let poller = spawn_polling(
            source.clone(),
            markets.clone(),
            poll_interval,
            event_tx,
        );
        let ingestor = spawn_ingestor(
            detector.clone(),
            books.clone(),
            storage.clone(),
            event_rx,
        );

        let mut engine = Engine::new(
            config.app.mode,
            detector,
            strategy,
            risk,
            execution,
            storage,
            alerter,
            order_size,
            config.app.short_move_window_secs,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        let result = engine.run(&markets, books, poll_interval, shutdown_rx).await;

        poller.shutdown(SHUTDOWN_TIMEOUT).await;
        ingestor.shutdown(SHUTDOWN_TIMEOUT).await;

        result
    }
}

/// Build the wallet signer selected by the configuration.
///
/// Live mode without a signer is a fatal misconfiguration; simulation
/// runs fine without one.
fn build_signer(config: &Config) -> Result<Option<Arc<dyn WalletSigner>>, ConfigError> {
    let signer: Option<Arc<dyn WalletSigner>> = match config.signer.mode {
        SignerMode::None => None,
        SignerMode::External => {
            let url = config
                .signer
                .signer_url
                .as_deref()
                .ok_or(ConfigError::MissingSigner)?;
            Some(Arc::new(RemoteSigner::new(url)))
        }
        SignerMode::PrivateKey => {
            let key = config
                .signer
                .private_key
                .as_deref()
                .ok_or(ConfigError::MissingSigner)?;
            let signer = LocalKeySigner::new(key, config.signer.public_key.clone())
                .map_err(|_| ConfigError::MissingSigner)?;
            Some(Arc::new(signer))
        }
    };

    if config.app.mode == TradingMode::Live && signer.is_none() {
        return Err(ConfigError::MissingSigner);
    }
    Ok(signer)
}
