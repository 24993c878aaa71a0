use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closing price of one session for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub code: String,
    pub price: Decimal,
    pub time: NaiveDateTime,
}

/// Snapshots keyed by instrument code. A missing key means no price for that instrument.
pub type SnapshotMap = HashMap<String, PriceSnapshot>;

/// Latest completed bar for an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: NaiveDateTime,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl Bar {
    /// Flat bar where every price equals `close`
    pub fn flat(open_time: NaiveDateTime, close: Decimal) -> Self {
        Self {
            open_time,
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
        }
    }
}

/// Periodic notification carrying market time and the latest bar per instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFrameEvent {
    /// Exchange-local market time
    pub market_time: NaiveDateTime,
    #[serde(default)]
    pub last_bars: HashMap<String, Bar>,
}

impl TimeFrameEvent {
    pub fn new(market_time: NaiveDateTime) -> Self {
        Self {
            market_time,
            last_bars: HashMap::new(),
        }
    }

    pub fn with_bar(mut self, code: impl Into<String>, bar: Bar) -> Self {
        self.last_bars.insert(code.into(), bar);
        self
    }

    /// Close of the latest bar for `code`
    pub fn last_close(&self, code: &str) -> Option<Decimal> {
        self.last_bars.get(code).map(|bar| bar.close)
    }
}
