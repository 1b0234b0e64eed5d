//! Configuration types for poly-fade

use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub feed: FeedConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Errors raised while loading or validating configuration.
///
/// These are fatal at startup and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("order_size_percent_wallet requires wallet_balance_override to be set")]
    MissingWalletBalance,
    #[error("live trading requires a configured wallet signer")]
    MissingSigner,
}

/// Trading mode: simulation (default, no network) or live
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Simulation,
    Live,
}

/// Top-level application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Trading mode, overridable via `TRADING_MODE`
    #[serde(default)]
    pub mode: TradingMode,

    /// Explicit market allowlist; empty means discover by volume
    #[serde(default)]
    pub allowlist_markets: Vec<String>,

    /// Cap on discovered markets when no allowlist is given
    #[serde(default = "default_top_n")]
    pub top_n_by_volume: usize,

    /// Evaluation loop poll interval (seconds)
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,

    /// Window for the short-horizon directional move (seconds)
    #[serde(default = "default_short_move_secs")]
    pub short_move_window_secs: u64,
}

fn default_top_n() -> usize {
    20
}
fn default_poll_secs() -> u64 {
    5
}
fn default_short_move_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Simulation,
            allowlist_markets: vec![],
            top_n_by_volume: 20,
            poll_interval_secs: 5,
            short_move_window_secs: 60,
        }
    }
}

/// Market-data REST endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub rest_base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_passphrase: Option<String>,
}

/// Anomaly detector window configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Volume windows used for the spike z-score (seconds)
    #[serde(default = "default_volume_windows")]
    pub volume_windows_secs: Vec<u64>,

    /// Retention window for all per-market history (seconds)
    #[serde(default = "default_baseline_window")]
    pub baseline_window_secs: u64,

    /// Window for churn and price-impact features (seconds)
    #[serde(default = "default_churn_window")]
    pub churn_window_secs: u64,

    /// Window for repeat-print bucketing (seconds)
    #[serde(default = "default_repeat_window")]
    pub repeat_print_window_secs: u64,

    /// Order-book depth levels used for imbalance
    #[serde(default = "default_imbalance_levels")]
    pub imbalance_depth_levels: usize,
}

fn default_volume_windows() -> Vec<u64> {
    vec![60, 300]
}
fn default_baseline_window() -> u64 {
    1800
}
fn default_churn_window() -> u64 {
    300
}
fn default_repeat_window() -> u64 {
    120
}
fn default_imbalance_levels() -> usize {
    5
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            volume_windows_secs: default_volume_windows(),
            baseline_window_secs: 1800,
            churn_window_secs: 300,
            repeat_print_window_secs: 120,
            imbalance_depth_levels: 5,
        }
    }
}

/// Fade strategy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum anomaly score to act on
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,

    /// Only fade when price impact per unit volume is below this
    #[serde(default = "default_min_impact")]
    pub min_impact_per_volume: f64,

    /// Take-profit offset in basis points
    #[serde(default = "default_tp_bps")]
    pub take_profit_bps: u32,

    /// Stop-loss offset in basis points
    #[serde(default = "default_sl_bps")]
    pub stop_loss_bps: u32,

    /// Price samples retained for the ATR proxy
    #[serde(default = "default_atr_window")]
    pub atr_window: usize,

    /// Widen/tighten targets with the ATR proxy when available
    #[serde(default = "default_true")]
    pub atr_targets: bool,
}

fn default_anomaly_threshold() -> f64 {
    0.75
}
fn default_min_impact() -> f64 {
    0.002
}
fn default_tp_bps() -> u32 {
    40
}
fn default_sl_bps() -> u32 {
    25
}
fn default_atr_window() -> usize {
    14
}
fn default_true() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.75,
            min_impact_per_volume: 0.002,
            take_profit_bps: 40,
            stop_loss_bps: 25,
            atr_window: 14,
            atr_targets: true,
        }
    }
}

/// Risk limits configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum notional exposure per market
    #[serde(default = "default_max_position")]
    pub max_position_per_market: f64,

    /// Maximum sum of absolute positions across markets
    #[serde(default = "default_max_global")]
    pub max_global_exposure: f64,

    /// Cumulative realized loss that halts admission
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,

    /// Admission cap per rolling minute
    #[serde(default = "default_max_orders")]
    pub max_orders_per_minute: u32,

    /// Kill-switch file; its presence halts all admission
    #[serde(default = "default_kill_switch")]
    pub kill_switch_file: String,
}

fn default_max_position() -> f64 {
    100.0
}
fn default_max_global() -> f64 {
    500.0
}
fn default_max_daily_loss() -> f64 {
    50.0
}
fn default_max_orders() -> u32 {
    20
}
fn default_kill_switch() -> String {
    "KILL_SWITCH".to_string()
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_per_market: 100.0,
            max_global_exposure: 500.0,
            max_daily_loss: 50.0,
            max_orders_per_minute: 20,
            kill_switch_file: "KILL_SWITCH".to_string(),
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Fixed order size when percent sizing is not requested
    #[serde(default = "default_order_size")]
    pub order_size_default: f64,

    /// Size orders as this fraction of the wallet balance
    #[serde(default)]
    pub order_size_percent_wallet: Option<f64>,

    /// Wallet balance used for percent sizing
    #[serde(default)]
    pub wallet_balance_override: Option<f64>,

    /// Blocking throttle on outbound requests per rolling minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    /// Attempts per order before synthesizing an error response
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Linear backoff unit between retries (milliseconds)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_order_size() -> f64 {
    10.0
}
fn default_rate_limit() -> u32 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            order_size_default: 10.0,
            order_size_percent_wallet: None,
            wallet_balance_override: None,
            rate_limit_per_minute: 30,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ExecutionConfig {
    /// Resolve the per-order size.
    ///
    /// Percent-of-wallet sizing requires an explicit balance override;
    /// its absence is a fatal configuration error.
    pub fn resolve_order_size(&self) -> Result<f64, ConfigError> {
        match self.order_size_percent_wallet {
            None => Ok(self.order_size_default),
            Some(pct) => {
                let balance = self
                    .wallet_balance_override
                    .ok_or(ConfigError::MissingWalletBalance)?;
                Ok(balance * pct)
            }
        }
    }
}

/// Wallet signer selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignerMode {
    /// No signer configured (simulation only)
    #[default]
    None,
    /// Remote signing service
    External,
    /// Local key from config/environment
    PrivateKey,
}

/// Wallet signer configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SignerConfig {
    #[serde(default)]
    pub mode: SignerMode,
    #[serde(default)]
    pub signer_url: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port; disabled when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides for mode and secrets.
    ///
    /// Secrets belong in the environment rather than the config file;
    /// `TRADING_MODE` makes it hard to go live by editing a file alone.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("TRADING_MODE") {
            if mode.eq_ignore_ascii_case("live") {
                self.app.mode = TradingMode::Live;
            } else if mode.eq_ignore_ascii_case("simulation") {
                self.app.mode = TradingMode::Simulation;
            }
        }
        if let Ok(v) = std::env::var("FEED_API_KEY") {
            self.feed.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("FEED_API_PASSPHRASE") {
            self.feed.api_passphrase = Some(v);
        }
        if let Ok(v) = std::env::var("WALLET_SIGNER_URL") {
            self.signer.signer_url = Some(v);
        }
        if let Ok(v) = std::env::var("PRIVATE_KEY") {
            self.signer.private_key = Some(v);
        }
        if let Ok(v) = std::env::var("WALLET_PUBLIC_KEY") {
            self.signer.public_key = Some(v);
        }
    }
}
