//! Active trade store
//!
//! One JSON file per strategy holding its open trades, so a restart can
//! pick up positions that still need the morning exit.

use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::strategy::{ActiveTrade, ActiveTradeLedger};

#[derive(Debug, Clone)]
pub struct ActiveTradeStore {
    dir: PathBuf,
}

impl ActiveTradeStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, strategy: &str) -> PathBuf {
        self.dir.join(format!("{}.json", strategy))
    }

    /// Saved trades for `strategy`; empty when nothing was saved yet
    pub async fn load(&self, strategy: &str) -> Result<Vec<ActiveTrade>> {
        let path = self.path_for(strategy);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No active trades saved at {}", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let trades: Vec<ActiveTrade> = serde_json::from_str(&raw)?;
        info!(
            "Loaded {} active trade(s) for {} from {}",
            trades.len(),
            strategy,
            path.display()
        );
        Ok(trades)
    }

    /// Replace the saved trades. Writes a temp file and renames it over the old one.
    pub async fn save(&self, strategy: &str, trades: &[ActiveTrade]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(strategy);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(trades)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Saved {} active trade(s) to {}", trades.len(), path.display());
        Ok(())
    }

    /// Save the ledger after every change. The task holds a ledger handle,
    /// so it runs until the returned handle is aborted.
    pub fn spawn_autosave(&self, strategy: &str, ledger: ActiveTradeLedger) -> JoinHandle<()> {
        let store = self.clone();
        let strategy = strategy.to_string();
        let mut changes = ledger.subscribe();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("Active trade autosave skipped {} notifications", n);
                    }
                    Err(RecvError::Closed) => break,
                }

                let trades = ledger.snapshot().await;
                if let Err(e) = store.save(&strategy, &trades).await {
                    error!("Failed to save active trades for {}: {}", strategy, e);
                }
            }
        })
    }
}
