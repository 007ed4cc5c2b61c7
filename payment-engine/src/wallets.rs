//! Wallet operations outside of payments

use crate::validation::validate_amount;
use crate::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use wallet_ledger::{
    AccountId, CodePool, LockKey, Pocket, VendorId, WalletBalance, WalletId, WalletLedger,
};

/// Top-ups, offline float and vendor payouts
#[derive(Debug)]
pub struct WalletService {
    ledger: Arc<WalletLedger>,
    codes: CodePool,
}

impl WalletService {
    /// Service over a shared ledger
    pub fn new(ledger: Arc<WalletLedger>, codes: CodePool) -> Self {
        Self { ledger, codes }
    }

    fn wallet_of(&self, id: &AccountId) -> Result<WalletId> {
        self.ledger
            .repository()
            .account(id)?
            .map(|account| account.wallet_id)
            .ok_or_else(|| wallet_ledger::Error::AccountNotFound(id.to_string()).into())
    }

    fn vendor_wallets(&self, id: VendorId) -> Result<(WalletId, WalletId)> {
        self.ledger
            .repository()
            .vendor(id)?
            .map(|vendor| (vendor.store_wallet, vendor.personal_wallet))
            .ok_or_else(|| wallet_ledger::Error::VendorNotFound(id.to_string()).into())
    }

    /// Credit the online balance from outside the system
    pub fn top_up(&self, id: &AccountId, amount: Decimal) -> Result<WalletBalance> {
        validate_amount(amount)?;
        let wallet = self.wallet_of(id)?;
        let balance = self.ledger.credit(wallet, Pocket::Online, amount)?;
        info!(account = %id, %amount, "Wallet topped up");
        Ok(balance)
    }

    /// Both balances of an account's wallet
    pub fn balance(&self, id: &AccountId) -> Result<WalletBalance> {
        let wallet = self.wallet_of(id)?;
        Ok(self.ledger.balance(wallet)?)
    }

    /// Move funds online → offline, provisioning codes if the set is empty
    pub fn transfer_to_offline(&self, id: &AccountId, amount: Decimal) -> Result<WalletBalance> {
        validate_amount(amount)?;
        let wallet = self.wallet_of(id)?;

        let (balance, provisioned) = self.ledger.atomically([LockKey::Wallet(wallet)], |txn| {
            let provisioned = self.codes.ensure_provisioned(txn, wallet)?;
            txn.debit(wallet, Pocket::Online, amount)?;
            txn.credit(wallet, Pocket::Offline, amount)?;
            Ok((txn.wallet(wallet)?.balances(), provisioned))
        })?;

        info!(account = %id, %amount, provisioned, "Transferred to offline balance");
        Ok(balance)
    }

    /// The wallet's offline codes, sorted
    pub fn codes(&self, id: &AccountId) -> Result<Vec<String>> {
        let wallet = self.wallet_of(id)?;
        Ok(self.codes.codes(&self.ledger, wallet)?.into_iter().collect())
    }

    /// Move vendor funds from the store wallet to the personal wallet
    pub fn transfer_to_personal(&self, vendor: VendorId, amount: Decimal) -> Result<()> {
        validate_amount(amount)?;
        let (store, personal) = self.vendor_wallets(vendor)?;
        self.ledger
            .transfer(store, Pocket::Online, personal, Pocket::Online, amount)?;
        info!(vendor = %vendor, %amount, "Transferred to personal wallet");
        Ok(())
    }

    /// Store and personal balances of a vendor
    pub fn vendor_balances(&self, vendor: VendorId) -> Result<(WalletBalance, WalletBalance)> {
        let (store, personal) = self.vendor_wallets(vendor)?;
        Ok((self.ledger.balance(store)?, self.ledger.balance(personal)?))
    }
}
