//! Error types for minswap-rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The session call ceiling of the rate limiter has been reached.
    #[error("Rate limit exceeded: made {made} calls, only {allowed} are allowed")]
    RateLimitExceeded { made: u64, allowed: u64 },

    #[error("Insufficient funds ({unit}): need {required}, have {available}")]
    InsufficientFunds {
        unit: String,
        required: u64,
        available: u64,
    },

    #[error("Invalid pool state: {0}")]
    InvalidPoolState(String),

    /// Non-success response from the indexing API, passed through as received.
    #[error("External API returned {status}: {message}")]
    ExternalApi { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("No collateral UTxO available in wallet")]
    MissingCollateral,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn insufficient(unit: &str, required: u64, available: u64) -> Self {
        Error::InsufficientFunds {
            unit: unit.to_string(),
            required,
            available,
        }
    }

    /// True for the errors raised locally before anything reaches the chain.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InsufficientFunds { .. }
                | Error::InvalidPoolState(_)
                | Error::InvalidTransaction(_)
                | Error::MissingCollateral
        )
    }
}
