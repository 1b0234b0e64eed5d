//! Order execution engine
//!
//! Applies a blocking rolling-minute rate gate, submits (or simulates) the
//! order, retries transient failures with linear backoff, and returns a
//! normalized [`OrderResponse`]. Simulation mode is the default and never
//! touches the network.

mod signer;

pub use signer::{
    LocalKeySigner, RemoteSigner, SignedHeaders, SignerError, WalletSigner, PUBLIC_KEY_HEADER,
    SIGNATURE_HEADER,
};

use crate::config::{ExecutionConfig, TradingMode};
use crate::strategy::Side;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Execution failures surfaced to the caller.
///
/// Exhausted retries are NOT an error: they come back as an
/// `error`-status [`OrderResponse`] the caller must reconcile manually.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("live trading requires a configured wallet signer")]
    MissingSigner,
    #[error("order rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("failed to encode order payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Outbound order payload
#[derive(Debug, Clone, Serialize)]
pub struct OrderPayload {
    pub market: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    #[serde(rename = "type")]
    pub order_type: &'static str,
}

impl OrderPayload {
    /// Limit order for a market
    pub fn limit(market: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Self {
            market: market.into(),
            side,
            price,
            size,
            order_type: "limit",
        }
    }
}

/// Terminal state of a submission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Simulated,
    Submitted,
    Cancelled,
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Simulated => "simulated",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Error => "error",
        }
    }
}

/// Normalized result of a place/cancel call
#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    /// Opaque response/diagnostic payload
    pub payload: serde_json::Value,
}

/// Rolling one-minute request throttle.
///
/// Unlike the risk manager's admission cap this is a blocking gate: when
/// the window is exhausted it sleeps to the rollover instead of rejecting.
struct RateGate {
    cap: u32,
    sent: u32,
    window_start: Instant,
}

const WINDOW: Duration = Duration::from_secs(60);

impl RateGate {
    fn new(cap: u32) -> Self {
        Self {
            cap,
            sent: 0,
            window_start: Instant::now(),
        }
    }

    /// Wait until a request may be sent
    async fn admit(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= WINDOW {
            self.sent = 0;
            self.window_start = Instant::now();
            return;
        }
        if self.sent >= self.cap {
            let wait = WINDOW - elapsed;
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate gate saturated, throttling");
            tokio::time::sleep(wait).await;
            self.sent = 0;
            self.window_start = Instant::now();
        }
    }

    /// Count one request actually sent
    fn record(&mut self) {
        self.sent += 1;
    }
}

/// Rate-limited, retrying order submission path
pub struct ExecutionEngine {
    http: reqwest::Client,
    rest_base_url: String,
    api_key: Option<String>,
    api_passphrase: Option<String>,
    mode: TradingMode,
    retry_attempts: u32,
    retry_backoff: Duration,
    signer: Option<Arc<dyn WalletSigner>>,
    gate: RateGate,
}

impl ExecutionEngine {
    pub fn new(
        mode: TradingMode,
        rest_base_url: impl Into<String>,
        api_key: Option<String>,
        api_passphrase: Option<String>,
        config: &ExecutionConfig,
        signer: Option<Arc<dyn WalletSigner>>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            rest_base_url: rest_base_url.into().trim_end_matches('/').to_string(),
            api_key,
            api_passphrase,
            mode,
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            signer,
            gate: RateGate::new(config.rate_limit_per_minute),
        }
    }

    fn base_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("X-API-KEY", key);
        }
        if let Some(passphrase) = &self.api_passphrase {
            builder = builder.header("X-API-PASSPHRASE", passphrase);
        }
        builder
    }

    /// Submit an order.
    ///
    /// Any response status below 500 is terminal: success returns the
    /// parsed response, 4xx surfaces as [`ExecutionError::Rejected`].
    /// 5xx and transport failures retry with linear backoff; exhausting
    /// every attempt yields an `error`-status response, never an `Err`.
    pub async fn place_order(
        &mut self,
        payload: &OrderPayload,
    ) -> Result<OrderResponse, ExecutionError> {
        self.gate.admit().await;

        if self.mode != TradingMode::Live {
            let id = Uuid::new_v4().simple().to_string();
            return Ok(OrderResponse {
                order_id: format!("sim-{}", &id[..10]),
                status: OrderStatus::Simulated,
                payload: serde_json::to_value(payload)?,
            });
        }

        let signer = self.signer.as_ref().ok_or(ExecutionError::MissingSigner)?;
        let body = serde_json::to_value(payload)?;
        let url = format!("{}/orders", self.rest_base_url);

        for attempt in 1..=self.retry_attempts {
            let signed = signer.sign(&body).await?;
            let mut request = self.base_request(self.http.post(&url)).json(&body);
            for (name, value) in &signed.headers {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) => {
                    self.gate.record();
                    let status = response.status();
                    if status.as_u16() < 500 {
                        if !status.is_success() {
                            let text = response.text().await.unwrap_or_default();
                            return Err(ExecutionError::Rejected {
                                status: status.as_u16(),
                                body: text,
                            });
                        }
                        let payload: serde_json::Value = response.json().await?;
                        let order_id = payload
                            .get("order_id")
                            .and_then(|v| v.as_str())
                            .map(String::from)
                            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
                        return Ok(OrderResponse {
                            order_id,
                            status: OrderStatus::Submitted,
                            payload,
                        });
                    }
                    tracing::warn!(
                        attempt,
                        status = status.as_u16(),
                        "order submission failed upstream, will retry"
                    );
                }
                Err(error) => {
                    tracing::warn!(attempt, %error, "order submission transport error, will retry");
                }
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        Ok(OrderResponse {
            order_id: format!("err-{}", &id[..8]),
            status: OrderStatus::Error,
            payload: json!({ "error": "retry_exhausted" }),
        })
    }

    /// Cancel an order by id; not retried
    pub async fn cancel_order(&mut self, order_id: &str) -> Result<OrderResponse, ExecutionError> {
        self.gate.admit().await;

        if self.mode != TradingMode::Live {
            return Ok(OrderResponse {
                order_id: order_id.to_string(),
                status: OrderStatus::Cancelled,
                payload: json!({ "mode": "simulated" }),
            });
        }

        let signer = self.signer.as_ref().ok_or(ExecutionError::MissingSigner)?;
        let body = json!({ "order_id": order_id });
        let signed = signer.sign(&body).await?;

        let url = format!("{}/orders/{}", self.rest_base_url, order_id);
        let mut request = self.base_request(self.http.delete(&url));
        for (name, value) in &signed.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        self.gate.record();
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        let payload: serde_json::Value = response.json().await?;
        Ok(OrderResponse {
            order_id: order_id.to_string(),
            status: OrderStatus::Cancelled,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn engine(mode: TradingMode, signer: Option<Arc<dyn WalletSigner>>) -> ExecutionEngine {
        ExecutionEngine::new(
            mode,
            // Unroutable on purpose: simulation must never touch it.
            "http://127.0.0.1:1/api/",
            None,
            None,
            &ExecutionConfig::default(),
            signer,
        )
    }

    fn live_engine(base_url: String) -> ExecutionEngine {
        let signer: Arc<dyn WalletSigner> = Arc::new(
            LocalKeySigner::new("0xdeadbeef", None).unwrap(),
        );
        ExecutionEngine::new(
            TradingMode::Live,
            base_url,
            None,
            None,
            &ExecutionConfig {
                retry_attempts: 3,
                retry_backoff_ms: 10,
                ..Default::default()
            },
            Some(signer),
        )
    }

    /// Minimal HTTP server answering every request with a fixed response
    async fn spawn_stub_server(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn payload() -> OrderPayload {
        OrderPayload::limit("mkt-1", Side::Sell, 0.4995, 10.0)
    }

    #[tokio::test]
    async fn test_simulation_place_never_hits_network() {
        let mut engine = engine(TradingMode::Simulation, None);
        let response = engine.place_order(&payload()).await.unwrap();

        assert_eq!(response.status, OrderStatus::Simulated);
        assert!(response.order_id.starts_with("sim-"));
        assert_eq!(response.payload["market"], "mkt-1");
        assert_eq!(response.payload["type"], "limit");
    }

    #[tokio::test]
    async fn test_simulation_cancel() {
        let mut engine = engine(TradingMode::Simulation, None);
        let response = engine.cancel_order("abc123").await.unwrap();

        assert_eq!(response.status, OrderStatus::Cancelled);
        assert_eq!(response.order_id, "abc123");
        assert_eq!(response.payload["mode"], "simulated");
    }

    #[tokio::test]
    async fn test_live_without_signer_is_config_error() {
        let mut engine = engine(TradingMode::Live, None);
        let result = engine.place_order(&payload()).await;
        assert!(matches!(result, Err(ExecutionError::MissingSigner)));
    }

    #[tokio::test]
    async fn test_live_success_parses_upstream_order_id() {
        let base = spawn_stub_server("200 OK", r#"{"order_id":"srv-42"}"#).await;
        let mut engine = live_engine(base);

        let response = engine.place_order(&payload()).await.unwrap();
        assert_eq!(response.status, OrderStatus::Submitted);
        assert_eq!(response.order_id, "srv-42");
    }

    #[tokio::test]
    async fn test_live_4xx_is_hard_rejection() {
        let base = spawn_stub_server("400 Bad Request", "invalid order").await;
        let mut engine = live_engine(base);

        match engine.place_order(&payload()).await {
            Err(ExecutionError::Rejected { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid order");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_5xx_exhausts_retries_into_error_response() {
        let base = spawn_stub_server("500 Internal Server Error", "").await;
        let mut engine = live_engine(base);

        // Every attempt hits a 5xx; exhaustion is a normal response, not an Err.
        let response = engine.place_order(&payload()).await.unwrap();
        assert_eq!(response.status, OrderStatus::Error);
        assert!(response.order_id.starts_with("err-"));
        assert_eq!(response.payload["error"], "retry_exhausted");
    }

    #[tokio::test]
    async fn test_live_transport_failure_exhausts_into_error_response() {
        // Nothing listens here: every attempt fails at the transport layer.
        let mut engine = live_engine("http://127.0.0.1:1".to_string());

        let response = engine.place_order(&payload()).await.unwrap();
        assert_eq!(response.status, OrderStatus::Error);
        assert!(response.order_id.starts_with("err-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_blocks_until_rollover() {
        let mut gate = RateGate::new(2);
        let start = Instant::now();

        gate.admit().await;
        gate.record();
        gate.admit().await;
        gate.record();
        // Third admit must wait for the window to roll.
        gate.admit().await;

        assert!(start.elapsed() >= Duration::from_secs(59));
        assert_eq!(gate.sent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_gate_resets_after_quiet_minute() {
        let mut gate = RateGate::new(1);
        gate.admit().await;
        gate.record();

        tokio::time::advance(Duration::from_secs(61)).await;
        let start = Instant::now();
        gate.admit().await;
        // No sleep needed: the window rolled over on its own.
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_order_payload_serializes_side_and_type() {
        let value = serde_json::to_value(payload()).unwrap();
        assert_eq!(value["side"], "sell");
        assert_eq!(value["type"], "limit");
        assert_eq!(value["price"], 0.4995);
    }

    #[test]
    fn test_order_status_strings() {
        assert_eq!(OrderStatus::Simulated.as_str(), "simulated");
        assert_eq!(OrderStatus::Error.as_str(), "error");
    }
}
