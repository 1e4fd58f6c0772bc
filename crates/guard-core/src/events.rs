//! Structured events emitted by the risk engine.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Position, PositionStatus};

/// Which account-level limit was breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreachReason {
    Stoploss,
    Target,
}

impl fmt::Display for BreachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreachReason::Stoploss => f.write_str("STOPLOSS"),
            BreachReason::Target => f.write_str("TARGET"),
        }
    }
}

/// Why a single position was closed by the percent checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    Stoploss,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => f.write_str("take-profit"),
            ExitReason::Stoploss => f.write_str("stoploss"),
        }
    }
}

/// Condensed view of a position for PNL updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub symbol: String,
    pub total_pnl: Decimal,
    pub status: PositionStatus,
}

impl From<&Position> for PositionSummary {
    fn from(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            total_pnl: position.total_pnl(),
            status: position.status(),
        }
    }
}

/// Event delivered to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskEvent {
    /// Monitoring started with these limits.
    Startup {
        daily_stoploss: Decimal,
        daily_target: Decimal,
        check_interval_secs: u64,
        market_open: NaiveTime,
        market_close: NaiveTime,
        kill_switch_enabled: bool,
    },
    /// Periodic account PNL report.
    PnlUpdate {
        pnl: Decimal,
        stoploss: Decimal,
        target: Decimal,
        top_positions: Vec<PositionSummary>,
        /// Positions left out of `top_positions`.
        remaining: usize,
        at: DateTime<Utc>,
    },
    /// The trailing stoploss was raised.
    TrailingUpdate {
        previous: Decimal,
        new_level: Decimal,
        pnl: Decimal,
    },
    /// An account-level limit was breached; de-risking follows.
    ThresholdBreach {
        reason: BreachReason,
        pnl: Decimal,
        limit: Decimal,
        kill_switch_enabled: bool,
    },
    /// A single position was flattened by a percent rule.
    PositionExit {
        symbol: String,
        reason: ExitReason,
        percent: Decimal,
        order_id: String,
    },
    /// A de-risking action failed fully or partially.
    ActionFailure { action: String, detail: String },
    /// Anything else the operator should look at.
    Error { message: String },
}

impl RiskEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RiskEvent::Startup { .. } => "startup",
            RiskEvent::PnlUpdate { .. } => "pnl_update",
            RiskEvent::TrailingUpdate { .. } => "trailing_update",
            RiskEvent::ThresholdBreach { .. } => "threshold_breach",
            RiskEvent::PositionExit { .. } => "position_exit",
            RiskEvent::ActionFailure { .. } => "action_failure",
            RiskEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let event = RiskEvent::ThresholdBreach {
            reason: BreachReason::Stoploss,
            pnl: Decimal::new(-1100, 0),
            limit: Decimal::new(-1000, 0),
            kill_switch_enabled: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "threshold_breach");
        assert_eq!(json["reason"], "STOPLOSS");
        assert_eq!(event.kind(), "threshold_breach");
    }

    #[test]
    fn test_pnl_update_kind() {
        let event = RiskEvent::PnlUpdate {
            pnl: Decimal::ZERO,
            stoploss: Decimal::new(-1000, 0),
            target: Decimal::new(2000, 0),
            top_positions: Vec::new(),
            remaining: 0,
            at: Utc::now(),
        };
        assert_eq!(event.kind(), "pnl_update");
    }
}
