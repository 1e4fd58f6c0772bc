//! Order types for flattening and cancellation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Broker transaction type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a broker order as reported by the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the gateway, not yet at the exchange.
    Transit,
    /// Resting at the exchange.
    Pending,
    /// Partially filled, remainder still resting.
    PartTraded,
    Traded,
    Rejected,
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Whether an order in this state still has quantity that can be cancelled.
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Transit | OrderStatus::Pending | OrderStatus::PartTraded
        )
    }
}

/// A live order from the broker order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub status: OrderStatus,
}

impl OrderRecord {
    pub fn new(order_id: impl Into<String>, symbol: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            status,
        }
    }
}
