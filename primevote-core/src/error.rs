use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrimeError {
    #[error("{0} is not a prime number")]
    NotPrime(i64),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PrimeError {
    /// True for errors raised because a stop signal reached a suspended call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PrimeError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, PrimeError>;
