//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money)
//! - Explicit identity types per entity
//! - Forward-only transaction status

use chrono::{DateTime, Utc};
use risk_engine::GeoPoint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Account identifier (opaque string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor identifier (positive integer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(i64);

impl VendorId {
    /// Create new vendor ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wallet identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(Uuid);

impl WalletId {
    /// Fresh random ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier (UUIDv7 for time-ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Fresh time-ordered ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Admin identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdminId(Uuid);

impl AdminId {
    /// Fresh random ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which balance of a wallet an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pocket {
    /// Connected balance
    Online,
    /// Disconnected float, spendable with an offline code
    Offline,
}

impl fmt::Display for Pocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pocket::Online => write!(f, "online"),
            Pocket::Offline => write!(f, "offline"),
        }
    }
}

/// Balance-holding record
///
/// Balances never go negative. Mutation happens only through
/// [`crate::ledger::LedgerTxn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet ID
    pub id: WalletId,
    online_balance: Decimal,
    offline_balance: Decimal,
    codes: BTreeSet<String>,
}

impl Wallet {
    /// Empty wallet
    pub fn new(id: WalletId) -> Self {
        Self {
            id,
            online_balance: Decimal::ZERO,
            offline_balance: Decimal::ZERO,
            codes: BTreeSet::new(),
        }
    }

    /// Online balance
    pub fn online_balance(&self) -> Decimal {
        self.online_balance
    }

    /// Offline balance
    pub fn offline_balance(&self) -> Decimal {
        self.offline_balance
    }

    /// Balance of one pocket
    pub fn balance(&self, pocket: Pocket) -> Decimal {
        match pocket {
            Pocket::Online => self.online_balance,
            Pocket::Offline => self.offline_balance,
        }
    }

    /// Both balances
    pub fn balances(&self) -> WalletBalance {
        WalletBalance {
            online: self.online_balance,
            offline: self.offline_balance,
        }
    }

    /// Unused offline codes
    pub fn codes(&self) -> &BTreeSet<String> {
        &self.codes
    }

    /// Whether `code` is in the code set
    pub fn has_code(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub(crate) fn debit(&mut self, pocket: Pocket, amount: Decimal) -> crate::Result<()> {
        let available = self.balance(pocket);
        if available < amount {
            return Err(crate::Error::InsufficientFunds { pocket, available });
        }
        *self.pocket_mut(pocket) = available - amount;
        Ok(())
    }

    pub(crate) fn credit(&mut self, pocket: Pocket, amount: Decimal) {
        *self.pocket_mut(pocket) += amount;
    }

    pub(crate) fn add_codes(&mut self, codes: impl IntoIterator<Item = String>) {
        self.codes.extend(codes);
    }

    fn pocket_mut(&mut self, pocket: Pocket) -> &mut Decimal {
        match pocket {
            Pocket::Online => &mut self.online_balance,
            Pocket::Offline => &mut self.offline_balance,
        }
    }
}

/// Snapshot of a wallet's two balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Online balance
    pub online: Decimal,
    /// Offline balance
    pub offline: Decimal,
}

impl WalletBalance {
    /// Sum of both pockets
    pub fn total(&self) -> Decimal {
        self.online + self.offline
    }
}

/// Paying customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub id: AccountId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// The account's single wallet
    pub wallet_id: WalletId,
    /// Set once approved
    pub approved_at: Option<DateTime<Utc>>,
    /// Enrolled for offline payments
    pub offline_enrolled: bool,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// New unapproved account
    pub fn new(id: AccountId, name: String, email: String, wallet_id: WalletId) -> Self {
        Self {
            id,
            name,
            email,
            wallet_id,
            approved_at: None,
            offline_enrolled: false,
            created_at: Utc::now(),
        }
    }

    /// Whether the account has been approved
    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

/// Merchant receiving payments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    /// Vendor ID
    pub id: VendorId,
    /// Display name
    pub name: String,
    /// Store location
    pub location: GeoPoint,
    /// Approval flag (required to receive settlement)
    pub approved: bool,
    /// Receives customer payments
    pub store_wallet: WalletId,
    /// Fed only by transfer from the store wallet
    pub personal_wallet: WalletId,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Holder of adjudication authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    /// Admin ID
    pub id: AdminId,
    /// Display name
    pub name: String,
}

/// Trust regime of a payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    /// Connected payment from the online balance
    Online,
    /// Code-authorised payment from the offline balance
    Offline,
}

impl PaymentMode {
    /// Pocket this mode spends from
    pub fn pocket(&self) -> Pocket {
        match self {
            PaymentMode::Online => Pocket::Online,
            PaymentMode::Offline => Pocket::Offline,
        }
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMode::Online => write!(f, "ONLINE"),
            PaymentMode::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Outside the geofence, awaiting adjudication
    Flagged,
    /// Staged for the reconciliation sweep
    Pending,
    /// Settled (terminal)
    Successful,
    /// Rejected or invalid (terminal)
    Failed,
}

impl TransactionStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Successful | TransactionStatus::Failed)
    }

    /// Forward-only transition table
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Flagged, TransactionStatus::Successful)
                | (TransactionStatus::Flagged, TransactionStatus::Failed)
                | (TransactionStatus::Pending, TransactionStatus::Successful)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Flagged => "FLAGGED",
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Successful => "SUCCESSFUL",
            TransactionStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Payment record: immutable identity, forward-only status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID
    pub id: TransactionId,
    /// Paying account
    pub payer_id: AccountId,
    /// Receiving vendor
    pub vendor_id: VendorId,
    /// Amount (> 0)
    pub amount: Decimal,
    /// Payment mode
    pub mode: PaymentMode,
    status: TransactionStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// New record with a fresh ID
    pub fn new(
        payer_id: AccountId,
        vendor_id: VendorId,
        amount: Decimal,
        mode: PaymentMode,
        status: TransactionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::generate(),
            payer_id,
            vendor_id,
            amount,
            mode,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current status
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Move to `next`, refusing backward or sideways moves
    pub fn transition(&mut self, next: TransactionStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
