//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

pub const SIGNALS_GENERATED: &str = "polyfade_signals_generated_total";
pub const ORDERS_SUBMITTED: &str = "polyfade_orders_submitted_total";
pub const RISK_REJECTIONS: &str = "polyfade_risk_rejections_total";
pub const ANOMALY_SCORE: &str = "polyfade_anomaly_score";

/// Start the Prometheus exporter on the given port
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}

/// Count a generated signal for a market
pub fn record_signal(market: &str) {
    metrics::counter!(SIGNALS_GENERATED, "market" => market.to_string()).increment(1);
}

/// Count a submitted order with its terminal status
pub fn record_order(market: &str, status: &'static str) {
    metrics::counter!(ORDERS_SUBMITTED, "market" => market.to_string(), "status" => status)
        .increment(1);
}

/// Count a risk rejection
pub fn record_risk_rejection(market: &str) {
    metrics::counter!(RISK_REJECTIONS, "market" => market.to_string()).increment(1);
}

/// Publish the latest anomaly score for a market
pub fn set_anomaly_score(market: &str, score: f64) {
    metrics::gauge!(ANOMALY_SCORE, "market" => market.to_string()).set(score);
}
