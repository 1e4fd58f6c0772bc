//! De-risking action executor.
//!
//! Every gateway call is bounded by [`ExecutorConfig::call_timeout`]. Errors
//! and timeouts never escape: they are folded into the returned result values
//! so a single failed order cannot stop the rest of the batch.

use guard_core::types::{OrderRecord, Position};
use guard_core::{Error, OrderGateway, Result};
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters for actions taken during the session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionMetrics {
    pub orders_placed: u64,
    pub orders_failed: u64,
    pub cancels_succeeded: u64,
    pub cancels_failed: u64,
    pub kill_switch_attempts: u64,
}

/// Configuration for the action executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound for any single gateway call.
    pub call_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Aggregate result of a batch action (cancel all, flatten all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Order ids (cancel) or symbols (flatten) that failed.
    pub failed_ids: Vec<String>,
    /// Set when the batch could not even start, e.g. the order book fetch failed.
    pub fetch_error: Option<String>,
}

impl ActionSummary {
    pub fn fetch_failed(error: impl Into<String>) -> Self {
        Self {
            fetch_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// No failures and nothing prevented the batch from running.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.fetch_error.is_none()
    }

    fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, id: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failed_ids.push(id.into());
    }

    /// Operator-facing description of what went wrong.
    pub fn failure_detail(&self) -> String {
        match &self.fetch_error {
            Some(error) => format!("could not start: {}", error),
            None => format!(
                "{} of {} failed ({})",
                self.failed,
                self.attempted,
                self.failed_ids.join(", ")
            ),
        }
    }
}

/// Outcome of flattening a single position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlattenResult {
    /// Nothing to close.
    Skipped,
    Placed { order_id: String },
    Failed { error: String },
}

/// Broker answer to a kill switch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillSwitchResult {
    pub activated: bool,
    /// Raw broker status, or the error text when the call failed.
    pub status: String,
}

impl KillSwitchResult {
    /// Interpret a broker status string. Anything mentioning "activated" but
    /// not "deactivated" counts as success, case-insensitively.
    pub fn from_status(status: impl Into<String>) -> Self {
        let status = status.into();
        let lower = status.to_lowercase();
        Self {
            activated: lower.contains("activated") && !lower.contains("deactivated"),
            status,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            activated: false,
            status: error.into(),
        }
    }
}

/// Executes de-risking actions through an [`OrderGateway`].
pub struct ActionExecutor {
    gateway: Arc<dyn OrderGateway>,
    config: ExecutorConfig,
    metrics: RwLock<ExecutionMetrics>,
}

impl ActionExecutor {
    pub fn new(gateway: Arc<dyn OrderGateway>, config: ExecutorConfig) -> Self {
        Self {
            gateway,
            config,
            metrics: RwLock::new(ExecutionMetrics::default()),
        }
    }

    /// Snapshot of the session counters.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.metrics
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn update_metrics(&self, f: impl FnOnce(&mut ExecutionMetrics)) {
        if let Ok(mut metrics) = self.metrics.write() {
            f(&mut metrics);
        }
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation)),
        }
    }

    /// Cancel every order that is still working (pending, in transit or
    /// partially traded). Each cancellation is independent.
    pub async fn cancel_all_pending(&self) -> ActionSummary {
        let orders = match self.bounded("list orders", self.gateway.list_orders()).await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "Failed to fetch order book");
                return ActionSummary::fetch_failed(e.to_string());
            }
        };

        let pending: Vec<OrderRecord> = orders
            .into_iter()
            .filter(|o| o.status.is_cancelable())
            .collect();

        if pending.is_empty() {
            info!("No pending orders to cancel");
            return ActionSummary::default();
        }

        warn!(count = pending.len(), "Cancelling pending orders");
        let mut summary = ActionSummary::default();
        for order in &pending {
            match self
                .bounded("cancel order", self.gateway.cancel_order(&order.order_id))
                .await
            {
                Ok(()) => {
                    warn!(order_id = %order.order_id, symbol = %order.symbol, "Order cancelled");
                    summary.record_success();
                }
                Err(e) => {
                    error!(
                        order_id = %order.order_id,
                        symbol = %order.symbol,
                        error = %e,
                        "Failed to cancel order"
                    );
                    summary.record_failure(order.order_id.clone());
                }
            }
        }

        self.update_metrics(|m| {
            m.cancels_succeeded += summary.succeeded as u64;
            m.cancels_failed += summary.failed as u64;
        });
        warn!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Cancellation complete"
        );
        summary
    }

    /// Close one position with a market order on the opposite side.
    pub async fn flatten_position(&self, position: &Position) -> FlattenResult {
        let Some(side) = position.closing_side() else {
            debug!(symbol = %position.symbol, "No net quantity to flatten");
            return FlattenResult::Skipped;
        };
        let quantity = position.net_qty.unsigned_abs();

        let result = self
            .bounded(
                "place order",
                self.gateway.place_market_order(position, side, quantity),
            )
            .await;

        match result {
            Ok(order_id) => {
                warn!(
                    symbol = %position.symbol,
                    side = %side,
                    quantity = quantity,
                    order_id = %order_id,
                    "Position flattened"
                );
                self.update_metrics(|m| m.orders_placed += 1);
                FlattenResult::Placed { order_id }
            }
            Err(e) => {
                error!(symbol = %position.symbol, error = %e, "Failed to flatten position");
                self.update_metrics(|m| m.orders_failed += 1);
                FlattenResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Flatten every position with a nonzero quantity, continuing past
    /// failures.
    pub async fn flatten_all(&self, positions: &[Position]) -> ActionSummary {
        let open: Vec<&Position> = positions.iter().filter(|p| !p.is_flat()).collect();
        if open.is_empty() {
            info!("No positions to flatten");
            return ActionSummary::default();
        }

        warn!(count = open.len(), "Flattening all positions");
        let mut summary = ActionSummary::default();
        for position in open {
            match self.flatten_position(position).await {
                FlattenResult::Placed { .. } => summary.record_success(),
                FlattenResult::Failed { .. } => summary.record_failure(position.symbol.clone()),
                FlattenResult::Skipped => {}
            }
        }

        warn!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Flatten complete"
        );
        summary
    }

    /// Ask the broker to disable trading for the rest of the day.
    pub async fn activate_kill_switch(&self) -> KillSwitchResult {
        warn!("Activating kill switch");
        self.update_metrics(|m| m.kill_switch_attempts += 1);

        match self
            .bounded("activate kill switch", self.gateway.activate_kill_switch())
            .await
        {
            Ok(status) => {
                let result = KillSwitchResult::from_status(status);
                if result.activated {
                    warn!(status = %result.status, "Kill switch activated");
                } else {
                    error!(status = %result.status, "Kill switch not activated");
                }
                result
            }
            Err(e) => {
                error!(error = %e, "Kill switch request failed");
                KillSwitchResult::failed(e.to_string())
            }
        }
    }
}
