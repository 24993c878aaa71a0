pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod persistence;
pub mod services;
pub mod strategy;

pub use adapters::{FileSnapshotSource, PriceSnapshotSource, StaticSnapshotSource};
pub use config::AppConfig;
pub use domain::{
    Bar, Instrument, OrderRequest, OrderSide, OrderStatus, OrderTag, OrderUpdate, PriceSnapshot,
    TimeFrameEvent, VolumeTable,
};
pub use error::{CloseRtsError, Result};
pub use exchange::{OrderGateway, PaperGateway};
pub use persistence::ActiveTradeStore;
pub use services::TimeFrameReplay;
pub use strategy::{
    ActiveTrade, ActiveTradeLedger, CycleReport, DecisionEngine, Gate, GateSchedule,
    OrderLifecycleBinder, PendingEntries,
};
