//! Persistence of strategy state across restarts

pub mod active_trades;

pub use active_trades::ActiveTradeStore;
