//! Dhan REST API client.
//!
//! Implements both [`SnapshotProvider`] (positions) and [`OrderGateway`]
//! (order book, cancel, market orders, kill switch) over the v2 REST API.
//! Every request carries the `access-token` header and is bounded by the
//! client-wide request timeout.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::traits::{OrderGateway, SnapshotProvider};
use crate::types::{BrokerRef, OrderRecord, OrderSide, OrderStatus, Position, Snapshot};
use crate::{Error, Result};

const KILL_SWITCH_ACTIVATE_PATH: &str = "/killSwitch?killSwitchStatus=ACTIVATE";

/// Dhan API client.
pub struct DhanClient {
    base_url: String,
    access_token: String,
    /// `DHAN_CLIENT_ID` from configuration, used when positions carry none.
    configured_client_id: Option<String>,
    /// Client id seen on the first positions payload.
    captured_client_id: Mutex<Option<String>>,
    http_client: reqwest::Client,
}

impl DhanClient {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            configured_client_id: config.client_id.clone(),
            captured_client_id: Mutex::new(None),
            http_client,
        })
    }

    /// The client id orders will be placed under, if one is known yet.
    pub fn client_id(&self) -> Option<String> {
        self.captured_client_id
            .lock()
            .ok()
            .and_then(|id| id.clone())
            .or_else(|| self.configured_client_id.clone())
    }

    fn capture_client_id(&self, positions: &[DhanPosition]) {
        let Some(id) = positions.iter().find_map(|p| p.dhan_client_id.clone()) else {
            return;
        };
        if let Ok(mut captured) = self.captured_client_id.lock() {
            if captured.is_none() {
                debug!(client_id = %id, "Captured Dhan client id from positions");
                *captured = Some(id);
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        operation: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http_client
            .request(method, &url)
            .header("access-token", &self.access_token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| transport_error(e, operation))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, operation))?;

        if !status.is_success() {
            return Err(api_error(operation, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::from_str("null")?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn transport_error(error: reqwest::Error, operation: &str) -> Error {
    if error.is_timeout() {
        Error::timeout(operation)
    } else {
        Error::Http(error)
    }
}

fn api_error(operation: &str, status: StatusCode, body: &str) -> Error {
    let message = if status == StatusCode::UNAUTHORIZED {
        format!("{}: authentication failed, check DHAN_ACCESS_TOKEN", operation)
    } else {
        format!("{}: {} {}", operation, status, body.trim())
    };
    Error::Api {
        message,
        status: Some(status.as_u16()),
    }
}

#[async_trait]
impl SnapshotProvider for DhanClient {
    async fn fetch(&self) -> Result<Snapshot> {
        let raw: Option<Vec<DhanPosition>> = self
            .request(Method::GET, "/positions", "fetch positions", None::<&()>)
            .await?;
        let raw = raw.unwrap_or_default();

        self.capture_client_id(&raw);
        let fallback = self.client_id();
        let positions: Vec<Position> = raw
            .into_iter()
            .map(|p| p.into_position(fallback.as_deref()))
            .collect();

        debug!(positions = positions.len(), "Fetched positions");
        Ok(Snapshot::new(positions))
    }
}

#[async_trait]
impl OrderGateway for DhanClient {
    async fn list_orders(&self) -> Result<Vec<OrderRecord>> {
        let raw: Option<Vec<DhanOrder>> = self
            .request(Method::GET, "/orders", "list orders", None::<&()>)
            .await?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(OrderRecord::from)
            .collect())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let _: Option<serde_json::Value> = self
            .request(
                Method::DELETE,
                &format!("/orders/{}", order_id),
                "cancel order",
                None::<&()>,
            )
            .await?;
        Ok(())
    }

    async fn place_market_order(
        &self,
        position: &Position,
        side: OrderSide,
        quantity: u64,
    ) -> Result<String> {
        let client_id = position
            .broker
            .client_id
            .clone()
            .or_else(|| self.client_id())
            .ok_or_else(|| Error::Config {
                message: "no Dhan client id known; set DHAN_CLIENT_ID".to_string(),
            })?;

        let order = MarketOrderRequest::closing(client_id, position, side, quantity);
        let response: Option<OrderResponse> = self
            .request(Method::POST, "/orders", "place order", Some(&order))
            .await?;

        match response.and_then(|r| r.order_id) {
            Some(order_id) => {
                info!(
                    symbol = %position.symbol,
                    side = %side,
                    quantity = quantity,
                    order_id = %order_id,
                    "Market order placed"
                );
                Ok(order_id)
            }
            None => Err(Error::Api {
                message: "place order: response carried no orderId".to_string(),
                status: None,
            }),
        }
    }

    async fn activate_kill_switch(&self) -> Result<String> {
        let response: Option<KillSwitchResponse> = self
            .request(
                Method::POST,
                KILL_SWITCH_ACTIVATE_PATH,
                "activate kill switch",
                None::<&()>,
            )
            .await?;

        match response.and_then(|r| r.kill_switch_status) {
            Some(status) => Ok(status),
            None => {
                warn!("Kill switch response carried no status");
                Err(Error::Api {
                    message: "activate kill switch: response carried no killSwitchStatus"
                        .to_string(),
                    status: None,
                })
            }
        }
    }
}

/// Position row as returned by `GET /positions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhanPosition {
    #[serde(default)]
    dhan_client_id: Option<String>,
    #[serde(default)]
    trading_symbol: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    security_id: String,
    #[serde(default)]
    exchange_segment: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    net_qty: i64,
    #[serde(default)]
    average_price: Option<Decimal>,
    #[serde(default)]
    cost_price: Option<Decimal>,
    #[serde(default)]
    buy_avg: Option<Decimal>,
    #[serde(default)]
    sell_avg: Option<Decimal>,
    #[serde(default)]
    realized_profit: Option<Decimal>,
    #[serde(default)]
    unrealized_profit: Option<Decimal>,
}

impl DhanPosition {
    /// Entry price: `averagePrice`, then `costPrice`, then the side's
    /// average. Zero counts as missing.
    fn resolve_avg_price(&self) -> Option<Decimal> {
        let side_avg = if self.net_qty >= 0 {
            self.buy_avg
        } else {
            self.sell_avg
        };
        [self.average_price, self.cost_price, side_avg]
            .into_iter()
            .flatten()
            .find(|price| !price.is_zero())
    }

    fn into_position(self, fallback_client_id: Option<&str>) -> Position {
        let avg_price = self.resolve_avg_price();
        let client_id = self
            .dhan_client_id
            .or_else(|| fallback_client_id.map(str::to_string));

        let mut position = Position::new(
            self.trading_symbol.unwrap_or_else(|| "N/A".to_string()),
            self.net_qty,
        )
        .with_pnl(
            self.realized_profit.unwrap_or_default(),
            self.unrealized_profit.unwrap_or_default(),
        )
        .with_broker(BrokerRef {
            exchange_segment: self.exchange_segment,
            product_type: self.product_type,
            security_id: self.security_id,
            client_id,
        });
        position.avg_price = avg_price;
        position
    }
}

/// Order row as returned by `GET /orders`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhanOrder {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
    #[serde(default)]
    trading_symbol: Option<String>,
    #[serde(default = "unknown_status")]
    order_status: OrderStatus,
}

fn unknown_status() -> OrderStatus {
    OrderStatus::Unknown
}

impl From<DhanOrder> for OrderRecord {
    fn from(order: DhanOrder) -> Self {
        OrderRecord::new(
            order.order_id,
            order.trading_symbol.unwrap_or_else(|| "N/A".to_string()),
            order.order_status,
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketOrderRequest {
    dhan_client_id: String,
    transaction_type: &'static str,
    exchange_segment: String,
    product_type: String,
    order_type: &'static str,
    validity: &'static str,
    security_id: String,
    quantity: u64,
    after_market_order: bool,
}

impl MarketOrderRequest {
    fn closing(client_id: String, position: &Position, side: OrderSide, quantity: u64) -> Self {
        Self {
            dhan_client_id: client_id,
            transaction_type: side.as_str(),
            exchange_segment: position.broker.exchange_segment.clone(),
            product_type: position.broker.product_type.clone(),
            order_type: "MARKET",
            validity: "DAY",
            security_id: position.broker.security_id.clone(),
            quantity,
            after_market_order: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KillSwitchResponse {
    #[serde(default)]
    kill_switch_status: Option<String>,
}

/// Dhan is inconsistent about quoting ids.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(opt_string_or_number(deserializer)?.unwrap_or_default())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
