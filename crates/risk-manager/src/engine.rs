//! Risk decision engine.
//!
//! One engine per trading day. Each call evaluates a snapshot in a fixed
//! order: trailing ratchet, PNL update, per-position percent exits, then the
//! account-level breach check and its de-risking sequence. Once the breach
//! sequence completes with the kill switch activated (or the kill switch is
//! not enabled) the engine is terminal and every later call is a no-op.

use guard_core::config::RiskConfig;
use guard_core::types::{Position, Snapshot};
use guard_core::{
    BreachReason, Error, Notifier, PositionSummary, RiskEvent, SnapshotProvider,
};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use trading_engine::{ActionExecutor, ActionSummary, FlattenResult};

use crate::outcome::{BreachReport, KillSwitchStatus, Outcome};
use crate::position_exits::{ExitDecision, PositionExitRule};
use crate::trailing::TrailingStop;

/// Mutable risk state, owned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskState {
    /// Current stoploss; only ever raised by the trailing ratchet.
    pub stoploss_level: Decimal,
    pub target_level: Decimal,
    /// Set exactly once; terminal.
    pub kill_switch_triggered: bool,
    /// Most recent snapshot that reached evaluation.
    pub last_snapshot: Option<Snapshot>,
}

impl RiskState {
    fn new(config: &RiskConfig) -> Self {
        Self {
            stoploss_level: config.daily_stoploss,
            target_level: config.daily_target,
            kill_switch_triggered: false,
            last_snapshot: None,
        }
    }
}

/// Stateful decision engine for one account.
pub struct RiskEngine {
    config: RiskConfig,
    trailing: Option<TrailingStop>,
    exits: PositionExitRule,
    state: RiskState,
    provider: Arc<dyn SnapshotProvider>,
    executor: ActionExecutor,
    notifier: Arc<dyn Notifier>,
}

impl RiskEngine {
    pub fn new(
        config: RiskConfig,
        provider: Arc<dyn SnapshotProvider>,
        executor: ActionExecutor,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let trailing = config.trailing.map(TrailingStop::new);
        let exits = PositionExitRule::from_config(&config);
        let state = RiskState::new(&config);
        Self {
            config,
            trailing,
            exits,
            state,
            provider,
            executor,
            notifier,
        }
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn stoploss_level(&self) -> Decimal {
        self.state.stoploss_level
    }

    pub fn target_level(&self) -> Decimal {
        self.state.target_level
    }

    pub fn kill_switch_triggered(&self) -> bool {
        self.state.kill_switch_triggered
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.state.last_snapshot.as_ref()
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Fetch a fresh snapshot and evaluate it.
    pub async fn check(&mut self) -> Outcome {
        if self.state.kill_switch_triggered {
            info!("Kill switch already triggered, skipping check");
            return Outcome::KillSwitchActive;
        }

        match self.provider.fetch().await {
            Ok(snapshot) => self.evaluate(&snapshot).await,
            Err(e) => {
                let transient = e.is_transient();
                if transient {
                    warn!(error = %e, "Could not fetch PNL, skipping risk check");
                } else {
                    error!(error = %e, "PNL fetch rejected, skipping risk check");
                }
                self.notifier.emit(RiskEvent::Error {
                    message: format!("Failed to fetch PNL data: {}", e),
                });
                Outcome::DataUnavailable {
                    error: e.to_string(),
                    transient,
                }
            }
        }
    }

    /// Evaluate one snapshot and carry out whatever it calls for.
    pub async fn evaluate(&mut self, snapshot: &Snapshot) -> Outcome {
        if self.state.kill_switch_triggered {
            return Outcome::KillSwitchActive;
        }

        let pnl = snapshot.total_pnl();
        self.state.last_snapshot = Some(snapshot.clone());

        self.apply_trailing(pnl);

        info!(
            pnl = %pnl,
            stoploss = %self.state.stoploss_level,
            target = %self.state.target_level,
            positions = snapshot.positions().len(),
            "Risk check"
        );

        let policy = self.config.notifications;
        if policy.sends_pnl_updates() && policy.per_check {
            self.notifier.emit(self.pnl_update(snapshot));
        }

        let exited = self.apply_position_exits(snapshot).await;

        let (reason, limit) = if pnl <= self.state.stoploss_level {
            (BreachReason::Stoploss, self.state.stoploss_level)
        } else if pnl >= self.state.target_level {
            (BreachReason::Target, self.state.target_level)
        } else {
            info!("Within limits");
            return Outcome::WithinLimits;
        };

        let remaining: Vec<Position> = snapshot
            .positions()
            .iter()
            .enumerate()
            .filter(|(i, _)| !exited.contains(i))
            .map(|(_, p)| p.clone())
            .collect();

        self.handle_breach(reason, pnl, limit, &remaining).await
    }

    /// Emit a PNL update from the last evaluated snapshot. Returns whether
    /// one was sent.
    pub fn status_update(&self) -> bool {
        if self.state.kill_switch_triggered || !self.config.notifications.sends_pnl_updates() {
            return false;
        }
        match &self.state.last_snapshot {
            Some(snapshot) => {
                self.notifier.emit(self.pnl_update(snapshot));
                true
            }
            None => {
                debug!("No snapshot evaluated yet, skipping status update");
                false
            }
        }
    }

    fn pnl_update(&self, snapshot: &Snapshot) -> RiskEvent {
        let (top, remaining) = snapshot.top_positions(self.config.notifications.top_positions);
        RiskEvent::PnlUpdate {
            pnl: snapshot.total_pnl(),
            stoploss: self.state.stoploss_level,
            target: self.state.target_level,
            top_positions: top.into_iter().map(PositionSummary::from).collect(),
            remaining,
            at: snapshot.taken_at(),
        }
    }

    fn apply_trailing(&mut self, pnl: Decimal) {
        let Some(trailing) = &self.trailing else {
            return;
        };
        let previous = self.state.stoploss_level;
        if let Some(new_level) = trailing.ratchet(previous, pnl) {
            self.state.stoploss_level = new_level;
            info!(
                previous = %previous,
                new_level = %new_level,
                pnl = %pnl,
                "Trailing stoploss raised"
            );
            self.notifier.emit(RiskEvent::TrailingUpdate {
                previous,
                new_level,
                pnl,
            });
        }
    }

    /// Flatten positions past their percent thresholds. Returns the indices
    /// of positions that were closed.
    async fn apply_position_exits(&self, snapshot: &Snapshot) -> HashSet<usize> {
        let mut exited = HashSet::new();
        if !self.exits.is_enabled() {
            return exited;
        }

        for (index, position) in snapshot.positions().iter().enumerate() {
            if position.is_flat() {
                continue;
            }
            let (reason, percent) = match self.exits.evaluate(position) {
                ExitDecision::Exit { reason, percent } => (reason, percent),
                ExitDecision::Hold { percent } => {
                    debug!(symbol = %position.symbol, percent = %percent, "Position within percent limits");
                    continue;
                }
                ExitDecision::NotApplicable => {
                    debug!(
                        symbol = %position.symbol,
                        "Cannot resolve invested value, skipping percent check"
                    );
                    continue;
                }
            };

            warn!(
                symbol = %position.symbol,
                reason = %reason,
                percent = %percent.round_dp(2),
                "Position percent limit reached"
            );
            match self.executor.flatten_position(position).await {
                FlattenResult::Placed { order_id } => {
                    exited.insert(index);
                    self.notifier.emit(RiskEvent::PositionExit {
                        symbol: position.symbol.clone(),
                        reason,
                        percent,
                        order_id,
                    });
                }
                FlattenResult::Failed { error } => {
                    self.notifier.emit(RiskEvent::ActionFailure {
                        action: format!("{} exit {}", reason, position.symbol),
                        detail: error,
                    });
                }
                FlattenResult::Skipped => {}
            }
        }
        exited
    }

    async fn handle_breach(
        &mut self,
        reason: BreachReason,
        pnl: Decimal,
        limit: Decimal,
        positions: &[Position],
    ) -> Outcome {
        warn!(reason = %reason, pnl = %pnl, limit = %limit, "Daily limit breached");
        self.notifier.emit(RiskEvent::ThresholdBreach {
            reason,
            pnl,
            limit,
            kill_switch_enabled: self.config.kill_switch_enabled,
        });

        let cancel = self.executor.cancel_all_pending().await;
        self.report_failure("cancel_all_pending", &cancel);

        let flatten = self.executor.flatten_all(positions).await;
        self.report_failure("flatten_all", &flatten);

        if !self.config.kill_switch_enabled {
            warn!("Kill switch not enabled, stopping monitoring");
            self.state.kill_switch_triggered = true;
            return breach_outcome(BreachReport {
                reason,
                pnl,
                limit,
                cancel,
                flatten,
                kill_switch: KillSwitchStatus::NotEnabled,
            });
        }

        let result = self.executor.activate_kill_switch().await;
        if result.activated {
            self.state.kill_switch_triggered = true;
            breach_outcome(BreachReport {
                reason,
                pnl,
                limit,
                cancel,
                flatten,
                kill_switch: KillSwitchStatus::Activated {
                    status: result.status,
                },
            })
        } else {
            error!(status = %result.status, "Kill switch activation failed, will retry on next check");
            self.notifier.emit(RiskEvent::ActionFailure {
                action: "activate_kill_switch".to_string(),
                detail: Error::KillSwitchRejected {
                    status: result.status.clone(),
                }
                .to_string(),
            });
            Outcome::KillSwitchFailed(BreachReport {
                reason,
                pnl,
                limit,
                cancel,
                flatten,
                kill_switch: KillSwitchStatus::Rejected {
                    status: result.status,
                },
            })
        }
    }

    fn report_failure(&self, action: &str, summary: &ActionSummary) {
        if summary.is_clean() {
            return;
        }
        self.notifier.emit(RiskEvent::ActionFailure {
            action: action.to_string(),
            detail: summary.failure_detail(),
        });
    }
}

fn breach_outcome(report: BreachReport) -> Outcome {
    match report.reason {
        BreachReason::Stoploss => Outcome::StoplossBreached(report),
        BreachReason::Target => Outcome::TargetAchieved(report),
    }
}
