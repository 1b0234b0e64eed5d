//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{
    init_metrics, record_order, record_risk_rejection, record_signal, set_anomaly_score,
};

use crate::config::TelemetryConfig;

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)?;
    if let Some(port) = config.metrics_port {
        init_metrics(port)?;
    }
    Ok(())
}
