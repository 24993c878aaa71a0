//! In-memory gateway for dry runs and tests
//!
//! Accepts every order (unless told to fail), acknowledges it immediately
//! and optionally fills it on the spot. Fills move the net position.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::OrderGateway;
use crate::domain::{OrderRequest, OrderStatus, OrderUpdate};
use crate::error::{CloseRtsError, Result};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    status: OrderStatus,
}

pub struct PaperGateway {
    quotes: DashMap<String, (Option<Decimal>, Option<Decimal>)>,
    positions: DashMap<String, Decimal>,
    orders: DashMap<String, PaperOrder>,
    submissions: Mutex<Vec<OrderRequest>>,
    updates: broadcast::Sender<OrderUpdate>,
    immediate_fill: bool,
    fail_submissions: AtomicBool,
}

impl PaperGateway {
    pub fn new(immediate_fill: bool) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            quotes: DashMap::new(),
            positions: DashMap::new(),
            orders: DashMap::new(),
            submissions: Mutex::new(Vec::new()),
            updates,
            immediate_fill,
            fail_submissions: AtomicBool::new(false),
        }
    }

    pub fn set_quote(&self, code: &str, bid: Option<Decimal>, ask: Option<Decimal>) {
        self.quotes.insert(code.to_string(), (bid, ask));
    }

    pub fn set_position(&self, code: &str, position: Decimal) {
        self.positions.insert(code.to_string(), position);
    }

    /// Make every following submission fail
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }

    /// All accepted submissions, in order
    pub async fn submitted(&self) -> Vec<OrderRequest> {
        self.submissions.lock().await.clone()
    }

    /// Working orders for an instrument
    pub fn working_orders(&self, code: &str) -> Vec<OrderRequest> {
        self.orders
            .iter()
            .filter(|o| o.request.code == code && o.status.is_active())
            .map(|o| o.request.clone())
            .collect()
    }

    /// Fill a working order at its limit price
    pub fn match_order(&self, order_id: &str) -> Result<()> {
        let request = self.finish(order_id, OrderStatus::Matched)?;
        *self
            .positions
            .entry(request.code.clone())
            .or_insert(Decimal::ZERO) += request.side.signed(request.volume);
        info!(
            "[PAPER] Filled {} {} {} @ {}",
            request.side, request.volume, request.code, request.price
        );
        self.publish(OrderUpdate::new(order_id, OrderStatus::Matched));
        Ok(())
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<()> {
        self.finish(order_id, OrderStatus::Cancelled)?;
        self.publish(OrderUpdate::new(order_id, OrderStatus::Cancelled));
        Ok(())
    }

    pub fn reject_order(&self, order_id: &str, reason: &str) -> Result<()> {
        self.finish(order_id, OrderStatus::Rejected)?;
        self.publish(OrderUpdate::new(order_id, OrderStatus::Rejected).with_reason(reason));
        Ok(())
    }

    /// Expire registered orders whose expiry is at or before `now`
    pub fn expire_orders(&self, now: NaiveDateTime) -> Vec<String> {
        let due: Vec<String> = self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Registered
                    && o.request.expiry.is_some_and(|expiry| expiry <= now)
            })
            .map(|o| o.key().clone())
            .collect();

        for order_id in &due {
            if self.finish(order_id, OrderStatus::Expired).is_ok() {
                self.publish(OrderUpdate::new(order_id.as_str(), OrderStatus::Expired));
            }
        }
        due
    }

    fn finish(&self, order_id: &str, status: OrderStatus) -> Result<OrderRequest> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| CloseRtsError::OrderNotFound(order_id.to_string()))?;
        if !order.status.can_transition_to(status) {
            return Err(CloseRtsError::InvalidStateTransition {
                from: order.status.to_string(),
                to: status.to_string(),
            });
        }
        order.status = status;
        Ok(order.request.clone())
    }

    fn publish(&self, update: OrderUpdate) {
        debug!("[PAPER] {} -> {}", update.order_id, update.status);
        // no listeners is fine in dry runs
        let _ = self.updates.send(update);
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn submit_order(&self, request: &OrderRequest) -> Result<String> {
        if self.fail_submissions.load(Ordering::SeqCst) {
            return Err(CloseRtsError::OrderSubmission(format!(
                "paper gateway refused {} {}",
                request.side, request.code
            )));
        }

        let order_id = request.client_order_id.clone();
        self.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: request.clone(),
                status: OrderStatus::Registered,
            },
        );
        self.submissions.lock().await.push(request.clone());

        info!(
            "[PAPER] Registered {} {} {} @ {} ({})",
            request.side,
            request.volume,
            request.code,
            request.price,
            request.comment()
        );
        self.publish(OrderUpdate::new(order_id.as_str(), OrderStatus::Registered));

        if self.immediate_fill {
            self.match_order(&order_id)?;
        }
        Ok(order_id)
    }

    async fn best_bid(&self, code: &str) -> Result<Option<Decimal>> {
        Ok(self.quotes.get(code).and_then(|q| q.0))
    }

    async fn best_ask(&self, code: &str) -> Result<Option<Decimal>> {
        Ok(self.quotes.get(code).and_then(|q| q.1))
    }

    async fn net_position(&self, code: &str) -> Result<Decimal> {
        Ok(self
            .positions
            .get(code)
            .map(|p| *p)
            .unwrap_or(Decimal::ZERO))
    }

    async fn order_status(&self, order_id: &str) -> Result<Option<OrderStatus>> {
        Ok(self.orders.get(order_id).map(|o| o.status))
    }

    fn subscribe(&self) -> broadcast::Receiver<OrderUpdate> {
        self.updates.subscribe()
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
