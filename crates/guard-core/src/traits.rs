//! Collaborator contracts consumed by the risk engine and action executor.

use async_trait::async_trait;

use crate::events::RiskEvent;
use crate::types::{OrderRecord, OrderSide, Position, Snapshot};
use crate::Result;

/// Source of account snapshots.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Current positions with PNL. An empty snapshot is a valid answer.
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Broker order operations used by the action executor.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Today's order book.
    async fn list_orders(&self) -> Result<Vec<OrderRecord>>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Place a market order against `position`'s instrument. Returns the
    /// broker order id.
    async fn place_market_order(
        &self,
        position: &Position,
        side: OrderSide,
        quantity: u64,
    ) -> Result<String>;

    /// Ask the broker to disable trading for the rest of the day. Returns the
    /// raw status string the broker answered with.
    async fn activate_kill_switch(&self) -> Result<String>;
}

/// Fire-and-forget event sink.
///
/// Implementations must not block and must swallow their own delivery
/// failures.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: RiskEvent);
}
