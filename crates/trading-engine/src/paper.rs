//! Paper gateway for dry runs.
//!
//! Accepts every order and kill switch request, logs it with a `[PAPER]`
//! prefix and hands back synthetic order ids. Nothing reaches the broker.

use async_trait::async_trait;
use guard_core::types::{OrderRecord, OrderSide, Position};
use guard_core::{OrderGateway, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Broker stand-in that records instead of trading.
#[derive(Debug, Default)]
pub struct PaperGateway {
    next_order: AtomicU64,
    kill_switch: AtomicBool,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders "placed" so far.
    pub fn orders_placed(&self) -> u64 {
        self.next_order.load(Ordering::SeqCst)
    }

    pub fn kill_switch_activated(&self) -> bool {
        self.kill_switch.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn list_orders(&self) -> Result<Vec<OrderRecord>> {
        info!("[PAPER] Order book is empty in paper mode");
        Ok(Vec::new())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        info!(order_id = %order_id, "[PAPER] Simulated order cancel");
        Ok(())
    }

    async fn place_market_order(
        &self,
        position: &Position,
        side: OrderSide,
        quantity: u64,
    ) -> Result<String> {
        let seq = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("PAPER-{:06}", seq);
        info!(
            order_id = %order_id,
            symbol = %position.symbol,
            side = %side,
            quantity = quantity,
            "[PAPER] Simulated market order"
        );
        Ok(order_id)
    }

    async fn activate_kill_switch(&self) -> Result<String> {
        self.kill_switch.store(true, Ordering::SeqCst);
        info!("[PAPER] Simulated kill switch activation");
        Ok("ACTIVATED".to_string())
    }
}
