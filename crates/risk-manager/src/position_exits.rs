//! Per-position percent take-profit and stoploss.

use guard_core::config::RiskConfig;
use guard_core::types::Position;
use guard_core::ExitReason;
use rust_decimal::Decimal;

/// What the percent checks decided for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold { percent: Decimal },
    Exit { reason: ExitReason, percent: Decimal },
    /// Flat, or the entry price could not be resolved.
    NotApplicable,
}

/// Percent thresholds relative to invested value (`|net_qty| * avg_price`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionExitRule {
    pub take_profit_pct: Option<Decimal>,
    pub stoploss_pct: Option<Decimal>,
}

impl PositionExitRule {
    pub fn from_config(config: &RiskConfig) -> Self {
        Self {
            take_profit_pct: config.position_take_profit_pct,
            stoploss_pct: config.position_stoploss_pct,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.take_profit_pct.is_some() || self.stoploss_pct.is_some()
    }

    /// Take-profit wins when both thresholds would match.
    pub fn evaluate(&self, position: &Position) -> ExitDecision {
        let Some(percent) = position.pnl_percent() else {
            return ExitDecision::NotApplicable;
        };

        if self.take_profit_pct.is_some_and(|tp| percent >= tp) {
            return ExitDecision::Exit {
                reason: ExitReason::TakeProfit,
                percent,
            };
        }
        if self.stoploss_pct.is_some_and(|sl| percent <= -sl) {
            return ExitDecision::Exit {
                reason: ExitReason::Stoploss,
                percent,
            };
        }
        ExitDecision::Hold { percent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(qty: i64, avg: i64, pnl: i64) -> Position {
        Position::new("XYZ", qty)
            .with_avg_price(Decimal::new(avg, 0))
            .with_pnl(Decimal::ZERO, Decimal::new(pnl, 0))
    }

    fn rule(tp: Option<i64>, sl: Option<i64>) -> PositionExitRule {
        PositionExitRule {
            take_profit_pct: tp.map(|v| Decimal::new(v, 0)),
            stoploss_pct: sl.map(|v| Decimal::new(v, 0)),
        }
    }

    #[test]
    fn test_take_profit_threshold() {
        let rule = rule(Some(5), None);
        // 60 on 1000 invested = 6%
        assert_eq!(
            rule.evaluate(&position(10, 100, 60)),
            ExitDecision::Exit {
                reason: ExitReason::TakeProfit,
                percent: Decimal::new(6, 0)
            }
        );
        assert_eq!(
            rule.evaluate(&position(10, 100, 50)),
            ExitDecision::Exit {
                reason: ExitReason::TakeProfit,
                percent: Decimal::new(5, 0)
            }
        );
        assert_eq!(
            rule.evaluate(&position(10, 100, 49)),
            ExitDecision::Hold {
                percent: Decimal::new(49, 1)
            }
        );
    }

    #[test]
    fn test_stoploss_threshold_on_short() {
        let rule = rule(Some(5), Some(2));
        // -30 on 20 x 50 = 1000 invested = -3%
        assert!(matches!(
            rule.evaluate(&position(-20, 50, -30)),
            ExitDecision::Exit {
                reason: ExitReason::Stoploss,
                ..
            }
        ));
        assert!(matches!(
            rule.evaluate(&position(-20, 50, -10)),
            ExitDecision::Hold { .. }
        ));
    }

    #[test]
    fn test_unresolvable_positions_are_skipped() {
        let rule = rule(Some(5), Some(2));
        assert_eq!(rule.evaluate(&Position::new("A", 10)), ExitDecision::NotApplicable);
        assert_eq!(rule.evaluate(&position(0, 100, 500)), ExitDecision::NotApplicable);
        assert_eq!(rule.evaluate(&position(10, 0, 500)), ExitDecision::NotApplicable);
        assert!(!PositionExitRule::default().is_enabled());
    }
}
