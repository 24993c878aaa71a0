pub mod snapshots;

pub use snapshots::{
    FileSnapshotSource, PriceSnapshotSource, SessionPrices, SnapshotFile, StaticSnapshotSource,
};

#[cfg(test)]
pub use snapshots::MockPriceSnapshotSource;
