//! GeoPay Wallet Ledger
//!
//! Accounts, vendors and their dual-balance wallets, with every balance
//! change made under per-key locks and committed atomically.
//!
//! # Architecture
//!
//! - **Repository**: pluggable persistence with all-or-nothing batch commits
//! - **Lock table**: one mutex per wallet/transaction, acquired in a fixed order
//! - **Code pool**: offline authorisation codes provisioned per wallet
//!
//! # Invariants
//!
//! - Balances never go negative
//! - Multi-record mutations are never partially visible
//! - Transaction status only moves forward

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod codes;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

// Re-exports
pub use codes::{CodePool, CODE_BATCH_SIZE, CODE_LENGTH};
pub use error::{Error, Result};
pub use ledger::{LedgerTxn, LockKey, WalletLedger};
pub use storage::{FaultyStore, MemoryStore, Repository, WriteBatch, WriteOp};
pub use types::{
    Account, AccountId, Admin, AdminId, PaymentMode, Pocket, Transaction, TransactionId,
    TransactionStatus, Vendor, VendorId, Wallet, WalletBalance, WalletId,
};
