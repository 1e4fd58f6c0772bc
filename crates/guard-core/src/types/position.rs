//! Position and account snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Broker-specific fields needed to place a closing order for a position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerRef {
    pub exchange_segment: String,
    pub product_type: String,
    pub security_id: String,
    /// Account the position belongs to, when the broker reports it.
    pub client_id: Option<String>,
}

/// Display status of a position in notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// Still carries unrealized PNL.
    Open,
    /// Fully booked with a realized profit.
    Closed,
    /// Neither of the above (flat at a loss or untouched).
    Unknown,
}

impl PositionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Unknown => "",
        }
    }
}

/// An open (or recently closed) intraday position.
///
/// Positions are refreshed wholesale on every snapshot; only `symbol` is
/// stable between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed net quantity: positive = long, negative = short.
    pub net_qty: i64,
    /// Average entry price, if the broker payload allowed resolving one.
    pub avg_price: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub broker: BrokerRef,
}

impl Position {
    pub fn new(symbol: impl Into<String>, net_qty: i64) -> Self {
        Self {
            symbol: symbol.into(),
            net_qty,
            avg_price: None,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            broker: BrokerRef::default(),
        }
    }

    pub fn with_avg_price(mut self, avg_price: Decimal) -> Self {
        self.avg_price = Some(avg_price);
        self
    }

    pub fn with_pnl(mut self, realized: Decimal, unrealized: Decimal) -> Self {
        self.realized_pnl = realized;
        self.unrealized_pnl = unrealized;
        self
    }

    pub fn with_broker(mut self, broker: BrokerRef) -> Self {
        self.broker = broker;
        self
    }

    /// Realized plus unrealized PNL.
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }

    pub fn is_flat(&self) -> bool {
        self.net_qty == 0
    }

    /// Capital at work: `|net_qty| * avg_price`. `None` when the average
    /// price is unknown or the product is zero.
    pub fn invested_value(&self) -> Option<Decimal> {
        let avg_price = self.avg_price?;
        let invested = Decimal::from(self.net_qty.unsigned_abs()) * avg_price;
        if invested.is_zero() {
            None
        } else {
            Some(invested)
        }
    }

    /// PNL as a percentage of invested value.
    pub fn pnl_percent(&self) -> Option<Decimal> {
        if self.is_flat() {
            return None;
        }
        let invested = self.invested_value()?;
        Some(self.total_pnl() / invested * Decimal::ONE_HUNDRED)
    }

    /// Side of the order that would flatten this position.
    pub fn closing_side(&self) -> Option<OrderSide> {
        match self.net_qty {
            0 => None,
            q if q > 0 => Some(OrderSide::Sell),
            _ => Some(OrderSide::Buy),
        }
    }

    pub fn status(&self) -> PositionStatus {
        if !self.unrealized_pnl.is_zero() {
            PositionStatus::Open
        } else if self.realized_pnl > Decimal::ZERO {
            PositionStatus::Closed
        } else {
            PositionStatus::Unknown
        }
    }
}

/// Account PNL and positions at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    total_pnl: Decimal,
    positions: Vec<Position>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot; the account PNL is the sum of position totals.
    pub fn new(positions: Vec<Position>) -> Self {
        let total_pnl = positions.iter().map(Position::total_pnl).sum();
        Self {
            total_pnl,
            positions,
            taken_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn total_pnl(&self) -> Decimal {
        self.total_pnl
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// The `limit` positions with the largest absolute PNL, plus how many
    /// were left out. Ties keep snapshot order.
    pub fn top_positions(&self, limit: usize) -> (Vec<&Position>, usize) {
        let mut ranked: Vec<&Position> = self.positions.iter().collect();
        ranked.sort_by(|a, b| b.total_pnl().abs().cmp(&a.total_pnl().abs()));
        let remaining = ranked.len().saturating_sub(limit);
        ranked.truncate(limit);
        (ranked, remaining)
    }
}
