//! Account, vendor and admin lifecycle
//!
//! Approval of accounts and vendors, and adjudication of flagged payments,
//! require an [`AdminGrant`]. A grant can only be obtained from
//! [`AccountService::authorize_admin`], which checks the admin exists.

use crate::validation::{validate_vendor_id, InputValidator};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use risk_engine::GeoPoint;
use std::sync::Arc;
use tracing::info;
use wallet_ledger::{
    Account, AccountId, Admin, AdminId, CodePool, LockKey, Vendor, VendorId, WalletId,
    WalletLedger,
};

/// Minutes an approved account waits before it is fully active
pub const DEFAULT_WAITING_PERIOD_MINUTES: i64 = 15;

/// Proof that an existing admin authorised the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminGrant {
    admin_id: AdminId,
}

impl AdminGrant {
    /// Admin holding the grant
    pub fn admin_id(&self) -> AdminId {
        self.admin_id
    }
}

/// Registration and approval of accounts, vendors and admins
#[derive(Debug)]
pub struct AccountService {
    ledger: Arc<WalletLedger>,
    codes: CodePool,
    validator: InputValidator,
}

impl AccountService {
    /// Service over a shared ledger
    pub fn new(ledger: Arc<WalletLedger>, codes: CodePool) -> Result<Self> {
        Ok(Self {
            ledger,
            codes,
            validator: InputValidator::new()?,
        })
    }

    /// Create an unapproved account with an empty wallet
    pub fn register_account(&self, name: &str, email: &str) -> Result<AccountId> {
        let name = self.validator.name(name)?;
        let email = self.validator.email(email)?;

        let id = AccountId::generate();
        let wallet_id = WalletId::generate();
        let account = Account::new(id.clone(), name, email, wallet_id);

        self.ledger.atomically(
            [LockKey::Account(id.clone()), LockKey::Wallet(wallet_id)],
            |txn| {
                txn.create_wallet(wallet_id)?;
                txn.put_account(account);
                Ok(())
            },
        )?;

        info!(account = %id, wallet = %wallet_id, "Account registered");
        Ok(id)
    }

    /// Look up an account
    pub fn account(&self, id: &AccountId) -> Result<Account> {
        self.ledger
            .repository()
            .account(id)?
            .ok_or_else(|| wallet_ledger::Error::AccountNotFound(id.to_string()).into())
    }

    /// All accounts, oldest first
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.ledger.repository().accounts()?)
    }

    /// Approve an account
    pub fn approve_account(&self, grant: &AdminGrant, id: &AccountId) -> Result<Account> {
        let approved = self.ledger.atomically([LockKey::Account(id.clone())], |txn| {
            let mut account = txn
                .repo()
                .account(id)?
                .ok_or_else(|| wallet_ledger::Error::AccountNotFound(id.to_string()))?;
            if account.is_approved() {
                return Err(wallet_ledger::Error::AlreadyApproved(id.to_string()));
            }
            account.approved_at = Some(Utc::now());
            txn.put_account(account.clone());
            Ok(account)
        })?;

        info!(account = %id, admin = %grant.admin_id(), "Account approved");
        Ok(approved)
    }

    /// Whether `minutes` have passed since approval
    ///
    /// Unknown and unapproved accounts have not finished waiting.
    pub fn is_waiting_period_over(&self, id: &AccountId, minutes: i64) -> Result<bool> {
        self.is_waiting_period_over_at(id, minutes, Utc::now())
    }

    /// [`AccountService::is_waiting_period_over`] against an explicit clock
    pub fn is_waiting_period_over_at(
        &self,
        id: &AccountId,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let approved_at = match self.ledger.repository().account(id)? {
            Some(account) => account.approved_at,
            None => return Ok(false),
        };
        Ok(approved_at.map_or(false, |at| now - at >= Duration::minutes(minutes)))
    }

    /// Enrol for offline payments and provision the code pool
    pub fn enroll_offline(&self, id: &AccountId) -> Result<()> {
        let wallet_id = self.account(id)?.wallet_id;

        self.ledger.atomically(
            [LockKey::Account(id.clone()), LockKey::Wallet(wallet_id)],
            |txn| {
                let mut account = txn
                    .repo()
                    .account(id)?
                    .ok_or_else(|| wallet_ledger::Error::AccountNotFound(id.to_string()))?;
                if account.offline_enrolled {
                    return Err(wallet_ledger::Error::AlreadyEnrolled(id.to_string()));
                }
                account.offline_enrolled = true;
                txn.put_account(account);
                self.codes.ensure_provisioned(txn, wallet_id)?;
                Ok(())
            },
        )?;

        info!(account = %id, "Account enrolled for offline payments");
        Ok(())
    }

    /// Create an unapproved vendor with store and personal wallets
    pub fn register_vendor(
        &self,
        vendor_id: i64,
        name: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vendor> {
        let id = validate_vendor_id(vendor_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid("Vendor name cannot be empty"));
        }
        let location = GeoPoint::new(latitude, longitude)?;

        let vendor = Vendor {
            id,
            name: name.to_string(),
            location,
            approved: false,
            store_wallet: WalletId::generate(),
            personal_wallet: WalletId::generate(),
            created_at: Utc::now(),
        };

        self.ledger.atomically(
            [
                LockKey::Vendor(id),
                LockKey::Wallet(vendor.store_wallet),
                LockKey::Wallet(vendor.personal_wallet),
            ],
            |txn| {
                if txn.repo().vendor(id)?.is_some() {
                    return Err(wallet_ledger::Error::invalid(
                        "vendor with the same id already exists",
                    ));
                }
                txn.create_wallet(vendor.store_wallet)?;
                txn.create_wallet(vendor.personal_wallet)?;
                txn.put_vendor(vendor.clone());
                Ok(())
            },
        )?;

        info!(vendor = %id, location = %location, "Vendor registered");
        Ok(vendor)
    }

    /// Look up a vendor
    pub fn vendor(&self, id: VendorId) -> Result<Vendor> {
        self.ledger
            .repository()
            .vendor(id)?
            .ok_or_else(|| wallet_ledger::Error::VendorNotFound(id.to_string()).into())
    }

    /// Approve a vendor (idempotent)
    pub fn approve_vendor(&self, grant: &AdminGrant, id: VendorId) -> Result<Vendor> {
        let vendor = self.ledger.atomically([LockKey::Vendor(id)], |txn| {
            let mut vendor = txn
                .repo()
                .vendor(id)?
                .ok_or_else(|| wallet_ledger::Error::VendorNotFound(id.to_string()))?;
            if !vendor.approved {
                vendor.approved = true;
                txn.put_vendor(vendor.clone());
            }
            Ok(vendor)
        })?;

        info!(vendor = %id, admin = %grant.admin_id(), "Vendor approved");
        Ok(vendor)
    }

    /// Create an admin
    pub fn register_admin(&self, name: &str) -> Result<Admin> {
        let name = self.validator.name(name)?;
        let admin = Admin {
            id: AdminId::generate(),
            name,
        };
        self.ledger.atomically([], |txn| {
            txn.put_admin(admin.clone());
            Ok(())
        })?;

        info!(admin = %admin.id, "Admin registered");
        Ok(admin)
    }

    /// Mint a grant for an existing admin
    pub fn authorize_admin(&self, id: AdminId) -> Result<AdminGrant> {
        match self.ledger.repository().admin(id)? {
            Some(admin) => Ok(AdminGrant { admin_id: admin.id }),
            None => Err(wallet_ledger::Error::AdminNotFound(id.to_string()).into()),
        }
    }
}
