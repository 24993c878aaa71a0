use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::broadcast;

use crate::domain::{OrderRequest, OrderStatus, OrderUpdate};
use crate::error::Result;

/// Order routing and book access supplied by the broker adapter
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Hand an order to the venue and return the venue's order id.
    ///
    /// Lifecycle updates for the order carry `request.client_order_id`.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String>;

    async fn best_bid(&self, code: &str) -> Result<Option<Decimal>>;

    async fn best_ask(&self, code: &str) -> Result<Option<Decimal>>;

    /// Signed net position: positive long, negative short
    async fn net_position(&self, code: &str) -> Result<Decimal>;

    /// Current status of an accepted order, None when the gateway does not know it
    async fn order_status(&self, order_id: &str) -> Result<Option<OrderStatus>>;

    /// Lifecycle notifications for every order this gateway accepted.
    ///
    /// Delivery may be lossy; callers that fall behind re-read `order_status`.
    fn subscribe(&self) -> broadcast::Receiver<OrderUpdate>;

    fn is_dry_run(&self) -> bool {
        false
    }
}
