//! Active trade ledger
//!
//! Open trades owned by this strategy, at most one per instrument code.
//! Every mutation is followed by a change notification on a broadcast channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// An instrument with an open position owned by the strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTrade {
    pub code: String,
    pub strategy: String,
    /// When the opening fill was reported, if known
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

impl ActiveTrade {
    pub fn new(code: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            strategy: strategy.into(),
            opened_at: None,
        }
    }

    pub fn opened_at(mut self, at: DateTime<Utc>) -> Self {
        self.opened_at = Some(at);
        self
    }
}

/// Notification that the ledger changed. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerChanged;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ActiveTradeLedger {
    trades: Arc<RwLock<HashMap<String, ActiveTrade>>>,
    changes: broadcast::Sender<LedgerChanged>,
}

impl Default for ActiveTradeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveTradeLedger {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            trades: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Ledger seeded from previously persisted trades. Later duplicates of a code are dropped.
    pub fn with_trades(trades: impl IntoIterator<Item = ActiveTrade>) -> Self {
        let mut map = HashMap::new();
        for trade in trades {
            map.entry(trade.code.clone()).or_insert(trade);
        }
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            trades: Arc::new(RwLock::new(map)),
            changes,
        }
    }

    /// 0 or 1
    pub async fn count(&self, code: &str) -> usize {
        usize::from(self.trades.read().await.contains_key(code))
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.trades.read().await.contains_key(code)
    }

    /// Record an open trade. False when the instrument already has one.
    pub async fn insert(&self, trade: ActiveTrade) -> bool {
        let code = trade.code.clone();
        let inserted = {
            let mut trades = self.trades.write().await;
            if trades.contains_key(&code) {
                false
            } else {
                trades.insert(code.clone(), trade);
                true
            }
        };

        if inserted {
            info!("Active trade recorded for {}", code);
            self.notify();
        } else {
            debug!("Active trade for {} already recorded", code);
        }
        inserted
    }

    /// Remove the trade for `code`. Removing an absent trade is a no-op.
    pub async fn remove(&self, code: &str) -> bool {
        let removed = self.trades.write().await.remove(code).is_some();
        if removed {
            info!("Active trade removed for {}", code);
            self.notify();
        }
        removed
    }

    pub async fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.trades.read().await.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Copy of all trades, sorted by code
    pub async fn snapshot(&self) -> Vec<ActiveTrade> {
        let mut trades: Vec<ActiveTrade> = self.trades.read().await.values().cloned().collect();
        trades.sort_by(|a, b| a.code.cmp(&b.code));
        trades
    }

    pub async fn len(&self) -> usize {
        self.trades.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.trades.read().await.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerChanged> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        // no subscribers is fine
        let _ = self.changes.send(LedgerChanged);
    }
}
