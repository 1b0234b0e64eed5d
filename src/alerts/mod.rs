//! Alerting seam
//!
//! The core emits (kind, structured payload) notifications; buffering,
//! throttling, and delivery are entirely the implementation's concern.

use async_trait::async_trait;
use serde::Serialize;

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Health,
    Signal,
    Order,
    Risk,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Health => "HEALTH",
            AlertKind::Signal => "SIGNAL",
            AlertKind::Order => "ORDER",
            AlertKind::Risk => "RISK",
        }
    }
}

/// Outbound notification capability
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, kind: AlertKind, payload: serde_json::Value);
}

/// Writes alerts to the structured log; the default sink
#[derive(Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn notify(&self, kind: AlertKind, payload: serde_json::Value) {
        tracing::info!(kind = kind.as_str(), %payload, "alert");
    }
}

/// Buffers alerts in memory; used in tests and dry runs
#[derive(Default)]
pub struct RecordingAlerter {
    events: std::sync::Mutex<Vec<(AlertKind, serde_json::Value)>>,
}

impl RecordingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(AlertKind, serde_json::Value)> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Alerter for RecordingAlerter {
    async fn notify(&self, kind: AlertKind, payload: serde_json::Value) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((kind, payload));
    }
}
