use thiserror::Error;

/// Main error type for the trading bot
#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Connectivity errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Remote call {operation} failed: {reason}")]
    TransientCall { operation: String, reason: String },

    #[error("Startup aborted: {0}")]
    FatalStartup(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Signing errors
    #[error("Signature error: {0}")]
    Signature(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for BotError
pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Wrap any failure of a single remote call.
    pub fn transient(operation: &str, err: impl std::fmt::Display) -> Self {
        BotError::TransientCall {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }

    /// True when the exchange throttled us (HTTP 429 / 418).
    pub fn is_rate_limit(&self) -> bool {
        match self {
            BotError::RateLimited(_) => true,
            BotError::Http(e) => e
                .status()
                .map(|s| s.as_u16() == 429 || s.as_u16() == 418)
                .unwrap_or(false),
            _ => false,
        }
    }
}
