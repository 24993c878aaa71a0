pub mod paper;
mod traits;

pub use paper::PaperGateway;
pub use traits::OrderGateway;
