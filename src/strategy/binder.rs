//! Order lifecycle binder
//!
//! Single dispatcher keyed by order id. Each bound order carries its own
//! status and a list of one-shot hooks. A hook fires at most once, in the
//! order it was attached, and is then dropped. Reaching a terminal status
//! drops the binding along with any hooks that never fired.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::ledger::{ActiveTrade, ActiveTradeLedger};
use super::pending::PendingEntries;
use crate::domain::{OrderRequest, OrderSide, OrderStatus, OrderTag, OrderUpdate};
use crate::error::{CloseRtsError, Result};

/// Status change a hook waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookTrigger {
    Registered,
    Matched,
    /// Any of Matched, Cancelled, Rejected, Expired
    Terminal,
}

impl HookTrigger {
    fn matches(&self, status: OrderStatus) -> bool {
        match self {
            HookTrigger::Registered => status == OrderStatus::Registered,
            HookTrigger::Matched => status == OrderStatus::Matched,
            HookTrigger::Terminal => status.is_terminal(),
        }
    }
}

/// What a hook does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Log the venue acknowledgement
    LogRegistered,
    /// Add the instrument to the active-trade ledger
    RecordActiveTrade,
    /// Remove the instrument from the active-trade ledger
    ClearActiveTrade,
    /// Free the instrument's pending entry slot
    ReleasePendingEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hook {
    pub trigger: HookTrigger,
    pub action: HookAction,
}

impl Hook {
    const fn new(trigger: HookTrigger, action: HookAction) -> Self {
        Self { trigger, action }
    }
}

/// Hooks attached to an order, by tag
pub fn hooks_for(tag: OrderTag) -> Vec<Hook> {
    match tag {
        OrderTag::TimeExit => vec![
            Hook::new(HookTrigger::Registered, HookAction::LogRegistered),
            Hook::new(HookTrigger::Matched, HookAction::ClearActiveTrade),
        ],
        OrderTag::Entry => vec![
            Hook::new(HookTrigger::Registered, HookAction::LogRegistered),
            Hook::new(HookTrigger::Matched, HookAction::RecordActiveTrade),
            Hook::new(HookTrigger::Terminal, HookAction::ReleasePendingEntry),
        ],
    }
}

#[derive(Debug)]
struct Binding {
    code: String,
    tag: OrderTag,
    side: OrderSide,
    status: OrderStatus,
    hooks: Vec<Hook>,
}

/// Order identity as seen by the hook actions
#[derive(Debug, Clone)]
struct BoundOrder {
    code: String,
    tag: OrderTag,
    side: OrderSide,
}

pub struct OrderLifecycleBinder {
    strategy: String,
    bindings: Mutex<HashMap<String, Binding>>,
    ledger: ActiveTradeLedger,
    pending: Arc<PendingEntries>,
}

impl OrderLifecycleBinder {
    pub fn new(
        strategy: impl Into<String>,
        ledger: ActiveTradeLedger,
        pending: Arc<PendingEntries>,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            bindings: Mutex::new(HashMap::new()),
            ledger,
            pending,
        }
    }

    /// Attach the tag's hooks to an order. Call before submitting it.
    pub async fn bind(&self, request: &OrderRequest) {
        let binding = Binding {
            code: request.code.clone(),
            tag: request.tag,
            side: request.side,
            status: OrderStatus::Submitted,
            hooks: hooks_for(request.tag),
        };
        self.bindings
            .lock()
            .await
            .insert(request.client_order_id.clone(), binding);
        debug!(
            "Bound {:?} order {} for {}",
            request.tag, request.client_order_id, request.code
        );
    }

    /// Drop an order's binding without firing anything
    pub async fn unbind(&self, order_id: &str) -> bool {
        self.bindings.lock().await.remove(order_id).is_some()
    }

    pub async fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.bindings.lock().await.get(order_id).map(|b| b.status)
    }

    /// Ids and last known status of every order still being tracked
    pub async fn live_orders(&self) -> Vec<(String, OrderStatus)> {
        self.bindings
            .lock()
            .await
            .iter()
            .map(|(id, b)| (id.clone(), b.status))
            .collect()
    }

    /// Number of orders still being tracked
    pub async fn len(&self) -> usize {
        self.bindings.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.lock().await.is_empty()
    }

    /// Apply a lifecycle notification and run the hooks it triggers.
    ///
    /// Returns the actions that ran. Unknown orders and repeated statuses
    /// are ignored; an impossible transition is an error and fires nothing.
    pub async fn dispatch(&self, update: &OrderUpdate) -> Result<Vec<HookAction>> {
        let (order, fired) = {
            let mut bindings = self.bindings.lock().await;

            let Some(binding) = bindings.get_mut(&update.order_id) else {
                debug!(
                    "Ignoring {} for untracked order {}",
                    update.status, update.order_id
                );
                return Ok(Vec::new());
            };

            if binding.status == update.status {
                debug!(
                    "Duplicate {} for order {}",
                    update.status, update.order_id
                );
                return Ok(Vec::new());
            }

            if !binding.status.can_transition_to(update.status) {
                return Err(CloseRtsError::InvalidStateTransition {
                    from: binding.status.to_string(),
                    to: update.status.to_string(),
                });
            }

            binding.status = update.status;
            let (fired, remaining): (Vec<Hook>, Vec<Hook>) = std::mem::take(&mut binding.hooks)
                .into_iter()
                .partition(|hook| hook.trigger.matches(update.status));
            binding.hooks = remaining;

            let order = BoundOrder {
                code: binding.code.clone(),
                tag: binding.tag,
                side: binding.side,
            };

            if update.status.is_terminal() {
                if let Some(done) = bindings.remove(&update.order_id) {
                    if !done.hooks.is_empty() {
                        debug!(
                            "Order {} finished {}, detached {} unfired hook(s)",
                            update.order_id,
                            update.status,
                            done.hooks.len()
                        );
                    }
                }
            }

            (order, fired)
        };

        let mut actions = Vec::with_capacity(fired.len());
        for hook in fired {
            self.run(hook.action, &order, update).await;
            actions.push(hook.action);
        }
        Ok(actions)
    }

    async fn run(&self, action: HookAction, order: &BoundOrder, update: &OrderUpdate) {
        match action {
            HookAction::LogRegistered => match order.tag {
                OrderTag::TimeExit => info!(
                    "TIME EXIT {}: order {} registered at best {}",
                    order.code,
                    update.order_id,
                    book_side(order.side)
                ),
                OrderTag::Entry => info!(
                    "ENTRY {}: {} order {} registered",
                    order.code, order.side, update.order_id
                ),
            },
            HookAction::RecordActiveTrade => {
                let trade = ActiveTrade::new(order.code.clone(), self.strategy.clone())
                    .opened_at(update.timestamp);
                if self.ledger.insert(trade).await {
                    info!(
                        "ENTRY {}: {} order {} matched, position opened",
                        order.code, order.side, update.order_id
                    );
                }
            }
            HookAction::ClearActiveTrade => {
                self.ledger.remove(&order.code).await;
                info!(
                    "TIME EXIT {}: position closed at best {}",
                    order.code,
                    book_side(order.side)
                );
            }
            HookAction::ReleasePendingEntry => {
                self.pending.release_order(&update.order_id).await;
                if update.status != OrderStatus::Matched {
                    warn!(
                        "ENTRY {}: order {} ended {}{}; eligible again at the next entry gate",
                        order.code,
                        update.order_id,
                        update.status,
                        update
                            .reason
                            .as_deref()
                            .map(|r| format!(" ({})", r))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
}

/// Side of the book an exit trades against
fn book_side(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Ask",
        OrderSide::Sell => "Bid",
    }
}
