//! Error types for core value parsing

use thiserror::Error;

/// Errors raised while parsing or converting core values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Address was not 20 bytes of hex
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Amount could not be parsed or does not fit in wei
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl CoreError {
    /// Create an invalid address error
    pub fn invalid_address<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Create an invalid amount error
    pub fn invalid_amount<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAmount(msg.into())
    }
}
