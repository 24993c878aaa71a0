//! Time-frame replay
//!
//! Loads recorded time-frame events (one JSON object per line), sorts them
//! by market time and feeds them to the engine in order. Before each event
//! the paper gateway's book is set from the bar closes so exits have a price.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::TimeFrameEvent;
use crate::error::{CloseRtsError, Result};
use crate::exchange::PaperGateway;

pub struct TimeFrameReplay {
    events: VecDeque<TimeFrameEvent>,
    /// Pause between events, zero for as fast as possible
    pace: Duration,
}

impl TimeFrameReplay {
    pub fn new(mut events: Vec<TimeFrameEvent>) -> Self {
        events.sort_by_key(|e| e.market_time);
        Self {
            events: events.into(),
            pace: Duration::ZERO,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Parse JSON lines. Blank lines and lines starting with '#' are skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut events = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event: TimeFrameEvent = serde_json::from_str(line).map_err(|e| {
                CloseRtsError::Validation(format!("time-frame line {}: {}", idx + 1, e))
            })?;
            events.push(event);
        }
        Ok(Self::new(events))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let replay = Self::parse(&raw)?;
        info!("Loaded {} time-frame events from {}", replay.len(), path.display());
        Ok(replay)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Send every event, then drop the sender so the engine sees the end of the stream.
    /// Returns the number of events delivered.
    pub async fn run(
        mut self,
        gateway: Arc<PaperGateway>,
        tx: mpsc::Sender<TimeFrameEvent>,
    ) -> Result<usize> {
        let mut sent = 0;
        while let Some(event) = self.events.pop_front() {
            for (code, bar) in &event.last_bars {
                gateway.set_quote(code, Some(bar.close), Some(bar.close));
            }
            gateway.expire_orders(event.market_time);

            debug!("Replaying time frame {}", event.market_time);
            tx.send(event)
                .await
                .map_err(|_| CloseRtsError::ChannelClosed("time frames".to_string()))?;
            sent += 1;

            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
        }
        Ok(sent)
    }
}
