//! poly-fade: anomaly-fade trading bot for prediction markets
//!
//! This library provides the core components for:
//! - Rolling-window anomaly scoring of market microstructure data
//! - Fade (mean-reversion) signal generation with volatility-aware targets
//! - Risk-gated order admission with a kill switch
//! - Rate-limited, retrying order execution (simulation and live modes)
//! - Market-data ingestion, storage, and alerting seams
//! - Structured logging and Prometheus metrics

pub mod alerts;
pub mod cli;
pub mod config;
pub mod detector;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod market;
pub mod risk;
pub mod storage;
pub mod strategy;
pub mod telemetry;
