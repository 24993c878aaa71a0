use thiserror::Error;

/// Main error type for the CloseRts trading rule
#[derive(Error, Debug)]
pub enum CloseRtsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Quote unavailable for instrument: {code}")]
    QuoteUnavailable { code: String },

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    // Order execution errors
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for CloseRtsError
pub type Result<T> = std::result::Result<T, CloseRtsError>;
