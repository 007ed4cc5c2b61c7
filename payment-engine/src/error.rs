//! Error types for the payment engine

use std::time::Duration;
use thiserror::Error;

/// Result type for payment operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payment engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] wallet_ledger::Error),

    /// Coordinate validation error
    #[error("Invalid input: {0}")]
    Geo(#[from] risk_engine::Error),

    /// Admission denied by the rate limiter
    #[error("Rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Time until the bucket refills
        retry_after: Duration,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse outcome class for the request-facing layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, missing or out-of-range input
    InvalidInput,
    /// Unknown account, vendor, wallet, transaction or admin
    NotFound,
    /// Balance check failed
    InsufficientFunds,
    /// Offline code not in the wallet's set
    InvalidCode,
    /// Idempotency guard on account state (already approved/enrolled)
    Conflict,
    /// Vendor cannot receive settlement yet
    VendorNotApproved,
    /// Admission denied
    RateLimited,
    /// Unexpected collaborator failure
    Internal,
}

impl Error {
    /// Classify for the request-facing layer
    pub fn kind(&self) -> ErrorKind {
        use wallet_ledger::Error as L;
        match self {
            Error::Ledger(err) => match err {
                L::InvalidInput(_) => ErrorKind::InvalidInput,
                L::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
                L::InvalidCode => ErrorKind::InvalidCode,
                L::AlreadyApproved(_) | L::AlreadyEnrolled(_) => ErrorKind::Conflict,
                L::VendorNotApproved(_) => ErrorKind::VendorNotApproved,
                L::AccountNotFound(_)
                | L::VendorNotFound(_)
                | L::WalletNotFound(_)
                | L::TransactionNotFound(_)
                | L::AdminNotFound(_) => ErrorKind::NotFound,
                L::InvalidTransition { .. } | L::Storage(_) | L::Internal(_) => ErrorKind::Internal,
            },
            Error::Geo(_) => ErrorKind::InvalidInput,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Config(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a rejected-input error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::Ledger(wallet_ledger::Error::InvalidInput(msg.into()))
    }
}
