//! Results of a risk evaluation.

use guard_core::BreachReason;
use rust_decimal::Decimal;
use std::fmt;
use trading_engine::ActionSummary;

/// What happened when the kill switch step ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitchStatus {
    Activated { status: String },
    Rejected { status: String },
    NotEnabled,
}

/// Everything done in response to a limit breach.
#[derive(Debug, Clone, PartialEq)]
pub struct BreachReport {
    pub reason: BreachReason,
    pub pnl: Decimal,
    /// The level that was crossed.
    pub limit: Decimal,
    pub cancel: ActionSummary,
    pub flatten: ActionSummary,
    pub kill_switch: KillSwitchStatus,
}

impl BreachReport {
    pub fn detail(&self) -> String {
        match &self.kill_switch {
            KillSwitchStatus::Activated { status } | KillSwitchStatus::Rejected { status } => {
                status.clone()
            }
            KillSwitchStatus::NotEnabled => "Kill switch not enabled".to_string(),
        }
    }
}

/// Result of one engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    WithinLimits,
    StoplossBreached(BreachReport),
    TargetAchieved(BreachReport),
    /// Breach handled but the broker kill switch did not activate; the next
    /// check retries.
    KillSwitchFailed(BreachReport),
    /// A previous check already ended the session.
    KillSwitchActive,
    /// No snapshot this check. `transient` is false when retrying is unlikely
    /// to help, e.g. rejected credentials.
    DataUnavailable { error: String, transient: bool },
}

impl Outcome {
    /// Whether monitoring should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Outcome::StoplossBreached(_) | Outcome::TargetAchieved(_) | Outcome::KillSwitchActive
        )
    }

    pub fn report(&self) -> Option<&BreachReport> {
        match self {
            Outcome::StoplossBreached(report)
            | Outcome::TargetAchieved(report)
            | Outcome::KillSwitchFailed(report) => Some(report),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::WithinLimits => "WITHIN_LIMITS",
            Outcome::StoplossBreached(_) => "STOPLOSS_BREACHED",
            Outcome::TargetAchieved(_) => "TARGET_ACHIEVED",
            Outcome::KillSwitchFailed(_) => "KILL_SWITCH_FAILED",
            Outcome::KillSwitchActive => "KILL_SWITCH_ACTIVE",
            Outcome::DataUnavailable { .. } => "DATA_UNAVAILABLE",
        }
    }

    /// Human-readable detail accompanying the label.
    pub fn detail(&self) -> String {
        match self {
            Outcome::WithinLimits => "Within limits".to_string(),
            Outcome::KillSwitchActive => "Kill switch already triggered".to_string(),
            Outcome::DataUnavailable { error, .. } => error.clone(),
            Outcome::StoplossBreached(report)
            | Outcome::TargetAchieved(report)
            | Outcome::KillSwitchFailed(report) => report.detail(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(kill_switch: KillSwitchStatus) -> BreachReport {
        BreachReport {
            reason: BreachReason::Stoploss,
            pnl: Decimal::new(-1100, 0),
            limit: Decimal::new(-1000, 0),
            cancel: ActionSummary::default(),
            flatten: ActionSummary::default(),
            kill_switch,
        }
    }

    #[test]
    fn test_terminal_outcomes() {
        assert!(Outcome::StoplossBreached(report(KillSwitchStatus::NotEnabled)).is_terminal());
        assert!(Outcome::TargetAchieved(report(KillSwitchStatus::NotEnabled)).is_terminal());
        assert!(Outcome::KillSwitchActive.is_terminal());

        assert!(!Outcome::WithinLimits.is_terminal());
        assert!(!Outcome::KillSwitchFailed(report(KillSwitchStatus::Rejected {
            status: "x".to_string()
        }))
        .is_terminal());
        assert!(!Outcome::DataUnavailable {
            error: "timeout".to_string(),
            transient: true,
        }
        .is_terminal());
    }

    #[test]
    fn test_detail_rendering() {
        let outcome = Outcome::StoplossBreached(report(KillSwitchStatus::NotEnabled));
        assert_eq!(outcome.detail(), "Kill switch not enabled");
        assert_eq!(
            outcome.to_string(),
            "STOPLOSS_BREACHED: Kill switch not enabled"
        );

        let outcome = Outcome::TargetAchieved(report(KillSwitchStatus::Activated {
            status: "ACTIVATED".to_string(),
        }));
        assert_eq!(outcome.detail(), "ACTIVATED");
        assert!(outcome.report().is_some());
        assert!(Outcome::WithinLimits.report().is_none());
    }
}
