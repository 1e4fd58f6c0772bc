//! Trailing stoploss ratchet for account PNL.

use guard_core::config::TrailingConfig;
use rust_decimal::Decimal;

/// Follows profitable PNL upward with the stoploss, never downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingStop {
    config: TrailingConfig,
}

impl TrailingStop {
    pub fn new(config: TrailingConfig) -> Self {
        Self { config }
    }

    /// Level the stoploss would trail at for `pnl`, once trailing is active.
    pub fn candidate(&self, pnl: Decimal) -> Option<Decimal> {
        if pnl <= Decimal::ZERO || pnl < self.config.activation_profit {
            return None;
        }
        let keep = Decimal::ONE - self.config.trail_percent / Decimal::ONE_HUNDRED;
        Some(pnl * keep)
    }

    /// New stoploss level if `pnl` lifts the candidate above `current`.
    pub fn ratchet(&self, current: Decimal, pnl: Decimal) -> Option<Decimal> {
        self.candidate(pnl).filter(|candidate| *candidate > current)
    }
}
