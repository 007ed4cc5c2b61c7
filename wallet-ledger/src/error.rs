//! Error types for the wallet ledger

use crate::types::{Pocket, TransactionStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed, missing or out-of-range input (rejected before any mutation)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Vendor not found
    #[error("Vendor not found: {0}")]
    VendorNotFound(String),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Admin not found
    #[error("Admin not found: {0}")]
    AdminNotFound(String),

    /// Balance check failed
    #[error("insufficient {pocket} balance: available {available}")]
    InsufficientFunds {
        /// Which balance was checked
        pocket: Pocket,
        /// Balance at the time of the check
        available: Decimal,
    },

    /// Offline code not present in the wallet's code set
    #[error("Invalid code. Transaction failed.")]
    InvalidCode,

    /// Account already approved
    #[error("Account already approved: {0}")]
    AlreadyApproved(String),

    /// Account already enrolled for offline payments
    #[error("Account already enrolled: {0}")]
    AlreadyEnrolled(String),

    /// Status change not allowed by the forward-only state machine
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: TransactionStatus,
        /// Requested status
        to: TransactionStatus,
    },

    /// Vendor cannot receive settlement until approved
    #[error("Vendor not approved: {0}")]
    VendorNotApproved(String),

    /// Storage collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Any of the lookup failures
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::AccountNotFound(_)
                | Error::VendorNotFound(_)
                | Error::WalletNotFound(_)
                | Error::TransactionNotFound(_)
                | Error::AdminNotFound(_)
        )
    }

    /// Shorthand for [`Error::InvalidInput`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<risk_engine::Error> for Error {
    fn from(err: risk_engine::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
