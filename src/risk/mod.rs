//! Risk-gated order admission
//!
//! A state machine over [`RiskState`]: admission is a pure function of the
//! current state plus the proposed order, and every check fails closed.
//! Exposure and PnL only ever change through [`RiskManager::record_fill`];
//! order checks and submissions move nothing but the rate counter.

mod kill_switch;

pub use kill_switch::{FileKillSwitch, KillSwitch, StaticKillSwitch};

use crate::config::RiskConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-market exposure, created lazily on first fill
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketExposure {
    /// Signed position size
    pub position: f64,
    /// Position valued at the last fill price
    pub notional: f64,
}

/// Process-lifetime risk state
#[derive(Debug)]
pub struct RiskState {
    pub exposures: HashMap<String, MarketExposure>,
    /// Cumulative realized PnL; never resets automatically
    pub realized_pnl: f64,
    pub orders_last_minute: u32,
    pub last_reset: DateTime<Utc>,
}

impl RiskState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            exposures: HashMap::new(),
            realized_pnl: 0.0,
            orders_last_minute: 0,
            last_reset: now,
        }
    }
}

/// Admits or rejects candidate orders against configured limits.
///
/// All methods take an explicit `now` so the rolling-minute behavior is
/// deterministic under test.
pub struct RiskManager {
    config: RiskConfig,
    kill_switch: Arc<dyn KillSwitch>,
    state: RiskState,
}

impl RiskManager {
    pub fn new(config: RiskConfig, kill_switch: Arc<dyn KillSwitch>) -> Self {
        Self {
            config,
            kill_switch,
            state: RiskState::new(Utc::now()),
        }
    }

    /// Roll the per-minute counter once a full minute has elapsed
    fn roll_rate_window(&mut self, now: DateTime<Utc>) {
        if (now - self.state.last_reset).num_seconds() >= 60 {
            self.state.orders_last_minute = 0;
            self.state.last_reset = now;
        }
    }

    /// Decide whether a candidate order may be submitted.
    ///
    /// Checks, in priority order: kill switch, per-minute order cap,
    /// per-market notional limit, global exposure limit, daily-loss floor.
    /// Any violation rejects; nothing here raises and nothing here moves
    /// exposure.
    pub fn check_order(&mut self, market: &str, size: f64, price: f64, now: DateTime<Utc>) -> bool {
        if self.kill_switch.is_halted() {
            tracing::warn!(market, "order rejected: kill switch active");
            return false;
        }

        self.roll_rate_window(now);
        if self.state.orders_last_minute >= self.config.max_orders_per_minute {
            tracing::debug!(market, "order rejected: per-minute order cap");
            return false;
        }

        let exposure = self
            .state
            .exposures
            .get(market)
            .copied()
            .unwrap_or_default();
        let projected_notional = ((exposure.position + size) * price).abs();
        if projected_notional > self.config.max_position_per_market {
            tracing::debug!(
                market,
                projected_notional,
                limit = self.config.max_position_per_market,
                "order rejected: per-market position limit"
            );
            return false;
        }

        let total_exposure: f64 = self
            .state
            .exposures
            .values()
            .map(|e| e.position.abs())
            .sum::<f64>()
            + size.abs();
        if total_exposure > self.config.max_global_exposure {
            tracing::debug!(
                market,
                total_exposure,
                limit = self.config.max_global_exposure,
                "order rejected: global exposure limit"
            );
            return false;
        }

        if self.state.realized_pnl <= -self.config.max_daily_loss.abs() {
            tracing::warn!(
                realized_pnl = self.state.realized_pnl,
                "order rejected: daily loss limit breached"
            );
            return false;
        }

        true
    }

    /// Count one submitted order against the rolling-minute cap.
    ///
    /// Called once per order actually sent, regardless of whether it fills.
    pub fn record_order(&mut self, now: DateTime<Utc>) {
        self.roll_rate_window(now);
        self.state.orders_last_minute += 1;
    }

    /// Apply a fill: move the market's position and the realized PnL.
    ///
    /// This is the only mutation path for exposure state, so repeated
    /// unfilled order attempts never consume position limits.
    pub fn record_fill(&mut self, market: &str, filled_size: f64, price: f64, pnl: f64) {
        let exposure = self
            .state
            .exposures
            .entry(market.to_string())
            .or_default();
        exposure.position += filled_size;
        exposure.notional = exposure.position * price;
        self.state.realized_pnl += pnl;
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> RiskConfig {
        RiskConfig {
            max_position_per_market: 100.0,
            max_global_exposure: 500.0,
            max_daily_loss: 50.0,
            max_orders_per_minute: 20,
            kill_switch_file: "KILL_SWITCH".to_string(),
        }
    }

    fn manager() -> (RiskManager, Arc<StaticKillSwitch>) {
        let switch = Arc::new(StaticKillSwitch::new(false));
        let manager = RiskManager::new(config(), switch.clone());
        (manager, switch)
    }

    #[test]
    fn test_admits_within_limits() {
        let (mut risk, _) = manager();
        assert!(risk.check_order("m", 10.0, 0.5, Utc::now()));
    }

    #[test]
    fn test_kill_switch_overrides_everything() {
        let (mut risk, switch) = manager();
        switch.set_halted(true);
        assert!(!risk.check_order("m", 0.0001, 0.0001, Utc::now()));
        switch.set_halted(false);
        assert!(risk.check_order("m", 0.0001, 0.0001, Utc::now()));
    }

    #[test]
    fn test_rate_limit_rejects_twenty_first_order() {
        let (mut risk, _) = manager();
        let now = Utc::now();
        for _ in 0..20 {
            assert!(risk.check_order("m", 1.0, 0.5, now));
            risk.record_order(now);
        }
        assert!(!risk.check_order("m", 1.0, 0.5, now));

        // Admission resumes once the minute rolls over.
        let later = now + Duration::seconds(61);
        assert!(risk.check_order("m", 1.0, 0.5, later));
    }

    #[test]
    fn test_per_market_position_limit() {
        let (mut risk, _) = manager();
        let now = Utc::now();

        // 150 * 0.5 = 75 notional, inside the 100 limit.
        assert!(risk.check_order("m", 150.0, 0.5, now));
        // 250 * 0.5 = 125 notional, over it.
        assert!(!risk.check_order("m", 250.0, 0.5, now));
    }

    #[test]
    fn test_position_limit_uses_tracked_position() {
        let (mut risk, _) = manager();
        let now = Utc::now();

        risk.record_fill("m", 150.0, 0.5, 0.0);
        // 150 held + 100 proposed = 250 * 0.5 = 125 notional: over.
        assert!(!risk.check_order("m", 100.0, 0.5, now));
        // Reducing the position is fine: |150 - 100| * 0.5 = 25.
        assert!(risk.check_order("m", -100.0, 0.5, now));
    }

    #[test]
    fn test_global_exposure_limit() {
        let (mut risk, _) = manager();
        let now = Utc::now();

        risk.record_fill("a", 200.0, 0.4, 0.0);
        risk.record_fill("b", -200.0, 0.4, 0.0);
        // |200| + |-200| + 150 = 550 > 500.
        assert!(!risk.check_order("c", 150.0, 0.4, now));
        // |200| + |-200| + 90 = 490 <= 500.
        assert!(risk.check_order("c", 90.0, 0.4, now));
    }

    #[test]
    fn test_daily_loss_halts_until_pnl_recovers() {
        let (mut risk, _) = manager();
        let now = Utc::now();

        risk.record_fill("m", 0.0, 0.5, -50.0);
        assert!(!risk.check_order("m", 1.0, 0.5, now));
        assert!(!risk.check_order("other", 0.0001, 0.0001, now));

        risk.record_fill("m", 0.0, 0.5, 10.0);
        assert!(risk.check_order("m", 1.0, 0.5, now));
    }

    #[test]
    fn test_check_order_does_not_move_exposure() {
        let (mut risk, _) = manager();
        let now = Utc::now();

        for _ in 0..5 {
            risk.check_order("m", 50.0, 0.5, now);
            risk.record_order(now);
        }
        assert!(risk.state().exposures.is_empty());
        assert_eq!(risk.state().orders_last_minute, 5);
    }

    #[test]
    fn test_record_fill_updates_exposure_and_pnl() {
        let (mut risk, _) = manager();

        risk.record_fill("m", 40.0, 0.5, 0.0);
        risk.record_fill("m", -15.0, 0.6, 2.5);

        let exposure = risk.state().exposures["m"];
        assert_eq!(exposure.position, 25.0);
        assert!((exposure.notional - 15.0).abs() < 1e-12);
        assert_eq!(risk.state().realized_pnl, 2.5);
    }
}
