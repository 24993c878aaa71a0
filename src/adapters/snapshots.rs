//! Session closing price sources
//!
//! The engine asks for two sessions: the prior day's close and the current
//! day's evening-session close. A code missing from a returned map means no
//! price for that instrument.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{PriceSnapshot, SnapshotMap};
use crate::error::Result;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSnapshotSource: Send + Sync {
    /// Main-session closing prices `sessions_ago` sessions back
    async fn closing_prices(&self, sessions_ago: u32) -> Result<SnapshotMap>;

    /// Evening-session closing prices `sessions_ago` sessions back
    async fn evening_prices(&self, sessions_ago: u32) -> Result<SnapshotMap>;
}

fn to_map(prices: impl IntoIterator<Item = PriceSnapshot>) -> SnapshotMap {
    prices.into_iter().map(|p| (p.code.clone(), p)).collect()
}

/// Fixed in-memory prices
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshotSource {
    closing: HashMap<u32, SnapshotMap>,
    evening: HashMap<u32, SnapshotMap>,
}

impl StaticSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_closing(mut self, sessions_ago: u32, prices: Vec<PriceSnapshot>) -> Self {
        self.closing.insert(sessions_ago, to_map(prices));
        self
    }

    pub fn with_evening(mut self, sessions_ago: u32, prices: Vec<PriceSnapshot>) -> Self {
        self.evening.insert(sessions_ago, to_map(prices));
        self
    }
}

#[async_trait]
impl PriceSnapshotSource for StaticSnapshotSource {
    async fn closing_prices(&self, sessions_ago: u32) -> Result<SnapshotMap> {
        Ok(self.closing.get(&sessions_ago).cloned().unwrap_or_default())
    }

    async fn evening_prices(&self, sessions_ago: u32) -> Result<SnapshotMap> {
        Ok(self.evening.get(&sessions_ago).cloned().unwrap_or_default())
    }
}

/// Prices of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPrices {
    pub sessions_ago: u32,
    pub prices: Vec<PriceSnapshot>,
}

/// On-disk layout read by [`FileSnapshotSource`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default)]
    pub closing: Vec<SessionPrices>,
    #[serde(default)]
    pub evening: Vec<SessionPrices>,
}

impl SnapshotFile {
    fn session(sessions: &[SessionPrices], sessions_ago: u32) -> SnapshotMap {
        sessions
            .iter()
            .find(|s| s.sessions_ago == sessions_ago)
            .map(|s| to_map(s.prices.iter().cloned()))
            .unwrap_or_default()
    }
}

/// JSON file re-read on every request, so prices written by an external
/// collector are picked up without a restart
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read(&self) -> Result<SnapshotFile> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let file: SnapshotFile = serde_json::from_str(&raw)?;
        debug!(
            "Read {} closing and {} evening sessions from {}",
            file.closing.len(),
            file.evening.len(),
            self.path.display()
        );
        Ok(file)
    }
}

#[async_trait]
impl PriceSnapshotSource for FileSnapshotSource {
    async fn closing_prices(&self, sessions_ago: u32) -> Result<SnapshotMap> {
        let file = self.read().await?;
        Ok(SnapshotFile::session(&file.closing, sessions_ago))
    }

    async fn evening_prices(&self, sessions_ago: u32) -> Result<SnapshotMap> {
        let file = self.read().await?;
        Ok(SnapshotFile::session(&file.evening, sessions_ago))
    }
}
