//! Fade signal generation
//!
//! Converts an anomaly score plus its feature set into a directional trade
//! intent that bets against the recent short-horizon price move, or no
//! signal at all. Only liquidity-driven moves are faded: a high price
//! impact per unit volume suggests an informed move and is left alone.

use crate::config::StrategyConfig;
use crate::detector::FeatureSet;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Price offset from mid in basis points, quoted against the move
const ENTRY_OFFSET_BPS: f64 = 5.0;
/// Take-profit distance as a multiple of the ATR proxy
const ATR_TP_MULT: f64 = 2.0;
/// Stop-loss distance as a multiple of the ATR proxy
const ATR_SL_MULT: f64 = 1.5;

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Why a signal was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    /// Fading a micro move with basis-point targets only
    FadeMicroMove,
    /// Fading a micro move with ATR-adjusted targets
    FadeMicroMoveAtr,
}

/// Exit targets attached to a signal
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TradeTargets {
    /// ATR proxy at signal time (0 with insufficient history)
    pub atr: f64,
    /// Take-profit price
    pub tp_price: f64,
    /// Stop-loss price
    pub sl_price: f64,
}

/// A directional trade intent
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    /// Unique signal identifier
    pub id: Uuid,
    /// Market identifier
    pub market: String,
    /// Trade direction
    pub side: Side,
    /// Limit price, offset from mid against the move
    pub price: f64,
    /// Order size
    pub size: f64,
    /// Reason tag
    pub reason: SignalReason,
    /// Anomaly score that triggered the signal
    pub score: f64,
    /// Features from the scoring pass, carried immutably
    pub features: FeatureSet,
    /// Exit targets
    pub targets: TradeTargets,
}

/// Mean-reversion strategy that fades anomalous micro moves.
///
/// Keeps a bounded per-market price history for the ATR proxy; this is the
/// only state it owns.
pub struct FadeStrategy {
    config: StrategyConfig,
    price_history: HashMap<String, VecDeque<f64>>,
}

impl FadeStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            price_history: HashMap::new(),
        }
    }

    /// Record the latest mid and return the ATR proxy: the mean absolute
    /// consecutive price difference over the retained history.
    ///
    /// History holds at most `atr_window + 1` prices so the proxy averages
    /// over at most `atr_window` differences.
    fn update_atr(&mut self, market: &str, price: f64) -> f64 {
        let capacity = self.config.atr_window + 1;
        let history = self
            .price_history
            .entry(market.to_string())
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if history.len() == capacity {
            history.pop_front();
        }
        history.push_back(price);

        if history.len() < 2 {
            return 0.0;
        }
        let diffs: f64 = history
            .iter()
            .zip(history.iter().skip(1))
            .map(|(a, b)| (b - a).abs())
            .sum();
        diffs / (history.len() - 1) as f64
    }

    /// Generate a fade signal, or `None` when any gate fails.
    ///
    /// The price history is updated before gating so the ATR proxy keeps
    /// tracking volatility through quiet periods.
    pub fn generate(
        &mut self,
        market: &str,
        mid: f64,
        short_move: f64,
        score: f64,
        features: &FeatureSet,
        order_size: f64,
    ) -> Option<Signal> {
        let atr = self.update_atr(market, mid);

        if score <= self.config.anomaly_threshold {
            return None;
        }
        if features.impact_per_volume > self.config.min_impact_per_volume {
            // Price moved a lot per unit volume: likely informed flow,
            // not a liquidity dislocation worth fading.
            return None;
        }
        if short_move == 0.0 {
            return None;
        }

        let side = if short_move > 0.0 { Side::Sell } else { Side::Buy };
        let offset = ENTRY_OFFSET_BPS / 10_000.0;
        let price = match side {
            Side::Sell => mid * (1.0 - offset),
            Side::Buy => mid * (1.0 + offset),
        };

        let use_atr = self.config.atr_targets && atr > 0.0;
        let targets = self.targets(side, price, if use_atr { atr } else { 0.0 });
        let reason = if use_atr {
            SignalReason::FadeMicroMoveAtr
        } else {
            SignalReason::FadeMicroMove
        };

        Some(Signal {
            id: Uuid::new_v4(),
            market: market.to_string(),
            side,
            price,
            size: order_size,
            reason,
            score,
            features: features.clone(),
            targets,
        })
    }

    /// Basis-point targets, widened/tightened by the ATR proxy when positive.
    ///
    /// The ATR adjustment always picks the more conservative level for the
    /// position: the farther take-profit and the nearer stop-loss.
    fn targets(&self, side: Side, price: f64, atr: f64) -> TradeTargets {
        let tp_offset = self.config.take_profit_bps as f64 / 10_000.0;
        let sl_offset = self.config.stop_loss_bps as f64 / 10_000.0;

        let (mut tp_price, mut sl_price) = match side {
            Side::Buy => (price * (1.0 + tp_offset), price * (1.0 - sl_offset)),
            Side::Sell => (price * (1.0 - tp_offset), price * (1.0 + sl_offset)),
        };

        if atr > 0.0 {
            match side {
                Side::Buy => {
                    tp_price = tp_price.max(price + ATR_TP_MULT * atr);
                    sl_price = sl_price.min(price - ATR_SL_MULT * atr);
                }
                Side::Sell => {
                    tp_price = tp_price.min(price - ATR_TP_MULT * atr);
                    sl_price = sl_price.max(price + ATR_SL_MULT * atr);
                }
            }
        }

        TradeTargets {
            atr,
            tp_price,
            sl_price,
        }
    }
}
