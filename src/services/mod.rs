pub mod replay;

pub use replay::TimeFrameReplay;
