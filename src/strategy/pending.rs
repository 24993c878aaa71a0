//! Pending entry reservations
//!
//! At most one working entry order per instrument. A slot is reserved
//! before prices are read or an order is submitted, which closes the gap
//! between "no entry pending" and "entry submitted".

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// Reserved, order not yet submitted
    Reserved,
    /// Entry order working at the venue
    Working { order_id: String },
}

#[derive(Debug, Default)]
pub struct PendingEntries {
    slots: Mutex<HashMap<String, Slot>>,
}

impl PendingEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot for `code`. False if an entry is already reserved or working.
    pub async fn try_reserve(&self, code: &str) -> bool {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(code) {
            return false;
        }
        slots.insert(code.to_string(), Slot::Reserved);
        true
    }

    /// Bind a submitted order to a reserved slot
    pub async fn attach(&self, code: &str, order_id: &str) {
        let mut slots = self.slots.lock().await;
        slots.insert(
            code.to_string(),
            Slot::Working {
                order_id: order_id.to_string(),
            },
        );
    }

    pub async fn release(&self, code: &str) -> bool {
        self.slots.lock().await.remove(code).is_some()
    }

    /// Free the slot held by `order_id`. Returns the instrument code when one was held.
    pub async fn release_order(&self, order_id: &str) -> Option<String> {
        let mut slots = self.slots.lock().await;
        let code = slots.iter().find_map(|(code, slot)| match slot {
            Slot::Working { order_id: id } if id == order_id => Some(code.clone()),
            _ => None,
        })?;
        slots.remove(&code);
        debug!("Released pending entry slot for {} (order {})", code, order_id);
        Some(code)
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.slots.lock().await.contains_key(code)
    }

    /// Working order id for `code`, if any
    pub async fn order_id(&self, code: &str) -> Option<String> {
        match self.slots.lock().await.get(code) {
            Some(Slot::Working { order_id }) => Some(order_id.clone()),
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }
}
