//! Balance mutation under per-key locks
//!
//! [`WalletLedger::atomically`] acquires a set of [`LockKey`]s in a fixed
//! global order, runs a closure against a [`LedgerTxn`] and commits the
//! staged writes as one [`WriteBatch`]. If the closure fails, nothing is
//! written.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_decimal::Decimal;
//! use wallet_ledger::{LockKey, MemoryStore, Pocket, WalletId, WalletLedger};
//!
//! # fn main() -> wallet_ledger::Result<()> {
//! let ledger = WalletLedger::new(Arc::new(MemoryStore::new()));
//! let id = WalletId::generate();
//! ledger.atomically([LockKey::Wallet(id)], |txn| txn.create_wallet(id))?;
//!
//! ledger.credit(id, Pocket::Online, Decimal::from(100))?;
//! ledger.convert_to_offline(id, Decimal::from(40))?;
//!
//! let balance = ledger.balance(id)?;
//! assert_eq!(balance.online, Decimal::from(60));
//! assert_eq!(balance.offline, Decimal::from(40));
//! # Ok(())
//! # }
//! ```

use crate::{
    storage::{Repository, WriteBatch},
    types::{
        Account, AccountId, Admin, Pocket, Transaction, TransactionId, TransactionStatus, Vendor,
        VendorId, Wallet, WalletBalance, WalletId,
    },
    Error, Result,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Lockable entity
///
/// The derived ordering is the global acquisition order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    /// Account record (registration, approval)
    Account(AccountId),
    /// Vendor record (registration, approval)
    Vendor(VendorId),
    /// Wallet balances and codes
    Wallet(WalletId),
    /// Transaction status
    Transaction(TransactionId),
}

/// Lock-scoped view over the repository
///
/// Wallets are loaded on first touch and written back on commit. Touching a
/// wallet whose key is not held is an internal error.
pub struct LedgerTxn<'a> {
    repo: &'a dyn Repository,
    held: &'a BTreeSet<LockKey>,
    wallets: BTreeMap<WalletId, Wallet>,
    dirty: BTreeSet<WalletId>,
    transactions: BTreeMap<TransactionId, Transaction>,
    batch: WriteBatch,
}

impl<'a> LedgerTxn<'a> {
    fn new(repo: &'a dyn Repository, held: &'a BTreeSet<LockKey>) -> Self {
        Self {
            repo,
            held,
            wallets: BTreeMap::new(),
            dirty: BTreeSet::new(),
            transactions: BTreeMap::new(),
            batch: WriteBatch::new(),
        }
    }

    /// Read-only repository access
    pub fn repo(&self) -> &dyn Repository {
        self.repo
    }

    /// Whether `key` is held by this transaction
    pub fn holds(&self, key: &LockKey) -> bool {
        self.held.contains(key)
    }

    fn require(&self, key: LockKey) -> Result<()> {
        if self.held.contains(&key) {
            Ok(())
        } else {
            Err(Error::Internal(format!("{:?} not locked", key)))
        }
    }

    fn wallet_mut(&mut self, id: WalletId) -> Result<&mut Wallet> {
        if !self.wallets.contains_key(&id) {
            self.require(LockKey::Wallet(id))?;
            let wallet = self
                .repo
                .wallet(id)?
                .ok_or_else(|| Error::WalletNotFound(id.to_string()))?;
            self.wallets.insert(id, wallet);
        }
        self.wallets
            .get_mut(&id)
            .ok_or_else(|| Error::WalletNotFound(id.to_string()))
    }

    /// Current state of a locked wallet, including staged changes
    pub fn wallet(&mut self, id: WalletId) -> Result<&Wallet> {
        self.wallet_mut(id).map(|w| &*w)
    }

    /// Create an empty wallet
    pub fn create_wallet(&mut self, id: WalletId) -> Result<()> {
        self.require(LockKey::Wallet(id))?;
        if self.wallets.contains_key(&id) || self.repo.wallet(id)?.is_some() {
            return Err(Error::Internal(format!("wallet {} already exists", id)));
        }
        self.wallets.insert(id, Wallet::new(id));
        self.dirty.insert(id);
        Ok(())
    }

    /// Subtract `amount` from one pocket, failing if it would go negative
    pub fn debit(&mut self, id: WalletId, pocket: Pocket, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.wallet_mut(id)?.debit(pocket, amount)?;
        self.dirty.insert(id);
        Ok(())
    }

    /// Add `amount` to one pocket
    pub fn credit(&mut self, id: WalletId, pocket: Pocket, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.wallet_mut(id)?.credit(pocket, amount);
        self.dirty.insert(id);
        Ok(())
    }

    /// Add codes to a wallet's code set
    pub fn add_codes(&mut self, id: WalletId, codes: impl IntoIterator<Item = String>) -> Result<()> {
        self.wallet_mut(id)?.add_codes(codes);
        self.dirty.insert(id);
        Ok(())
    }

    /// Current state of a transaction, including staged changes
    pub fn transaction(&mut self, id: TransactionId) -> Result<Transaction> {
        if let Some(tx) = self.transactions.get(&id) {
            return Ok(tx.clone());
        }
        self.repo
            .transaction(id)?
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    /// Record a new transaction
    pub fn record(&mut self, tx: Transaction) {
        self.transactions.insert(tx.id, tx);
    }

    /// Move a locked transaction to `next`
    pub fn transition(&mut self, id: TransactionId, next: TransactionStatus) -> Result<Transaction> {
        self.require(LockKey::Transaction(id))?;
        let mut tx = self.transaction(id)?;
        tx.transition(next)?;
        self.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    /// Add to the pending-settlement queue
    pub fn stage_pending(&mut self, id: TransactionId) {
        self.batch.stage_pending(id);
    }

    /// Remove from the pending-settlement queue
    pub fn clear_pending(&mut self, id: TransactionId) {
        self.batch.clear_pending(id);
    }

    /// Stage an account write
    pub fn put_account(&mut self, account: Account) {
        self.batch.put_account(account);
    }

    /// Stage a vendor write
    pub fn put_vendor(&mut self, vendor: Vendor) {
        self.batch.put_vendor(vendor);
    }

    /// Stage an admin write
    pub fn put_admin(&mut self, admin: Admin) {
        self.batch.put_admin(admin);
    }

    fn into_batch(mut self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for id in &self.dirty {
            if let Some(wallet) = self.wallets.remove(id) {
                batch.put_wallet(wallet);
            }
        }
        for (_, tx) in std::mem::take(&mut self.transactions) {
            batch.put_transaction(tx);
        }
        for op in self.batch.into_ops() {
            batch.push(op);
        }
        batch
    }
}

impl fmt::Debug for LedgerTxn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerTxn")
            .field("held", &self.held)
            .field("dirty", &self.dirty)
            .field("transactions", &self.transactions.len())
            .finish()
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid(format!("amount must be positive, got {}", amount)));
    }
    Ok(())
}

/// Wallet ledger
pub struct WalletLedger {
    repo: Arc<dyn Repository>,
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl WalletLedger {
    /// Ledger over the given repository
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            locks: DashMap::new(),
        }
    }

    /// Underlying repository (reads)
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Number of lock entries currently tracked
    pub fn lock_table_size(&self) -> usize {
        self.locks.len()
    }

    /// Run `f` while holding every key in `keys`, then commit its writes
    ///
    /// Keys are deduplicated and taken in [`LockKey`] order, so two callers
    /// locking overlapping sets cannot deadlock. An `Err` from `f` (or from
    /// the commit) leaves storage untouched.
    pub fn atomically<R, F>(&self, keys: impl IntoIterator<Item = LockKey>, f: F) -> Result<R>
    where
        F: FnOnce(&mut LedgerTxn<'_>) -> Result<R>,
    {
        let held: BTreeSet<LockKey> = keys.into_iter().collect();

        let guards: Vec<_> = held
            .iter()
            .map(|key| {
                let lock = self
                    .locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .value()
                    .clone();
                lock.lock_arc()
            })
            .collect();

        let outcome = {
            let mut txn = LedgerTxn::new(self.repo.as_ref(), &held);
            match f(&mut txn) {
                Ok(value) => self.repo.commit(txn.into_batch()).map(|_| value),
                Err(err) => Err(err),
            }
        };

        drop(guards);
        for key in &held {
            self.locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }

        outcome
    }

    /// Both balances of a wallet
    pub fn balance(&self, id: WalletId) -> Result<WalletBalance> {
        self.wallet(id).map(|w| w.balances())
    }

    /// Committed wallet snapshot
    pub fn wallet(&self, id: WalletId) -> Result<Wallet> {
        self.repo
            .wallet(id)?
            .ok_or_else(|| Error::WalletNotFound(id.to_string()))
    }

    /// Subtract from one pocket
    pub fn debit(&self, id: WalletId, pocket: Pocket, amount: Decimal) -> Result<WalletBalance> {
        self.atomically([LockKey::Wallet(id)], |txn| {
            txn.debit(id, pocket, amount)?;
            Ok(txn.wallet(id)?.balances())
        })
    }

    /// Add to one pocket
    pub fn credit(&self, id: WalletId, pocket: Pocket, amount: Decimal) -> Result<WalletBalance> {
        self.atomically([LockKey::Wallet(id)], |txn| {
            txn.credit(id, pocket, amount)?;
            Ok(txn.wallet(id)?.balances())
        })
    }

    /// Move `amount` between pockets of (possibly) different wallets
    pub fn transfer(
        &self,
        from: WalletId,
        from_pocket: Pocket,
        to: WalletId,
        to_pocket: Pocket,
        amount: Decimal,
    ) -> Result<()> {
        if from == to && from_pocket == to_pocket {
            return Err(Error::invalid("transfer source and destination are the same"));
        }
        self.atomically([LockKey::Wallet(from), LockKey::Wallet(to)], |txn| {
            txn.debit(from, from_pocket, amount)?;
            txn.credit(to, to_pocket, amount)
        })
    }

    /// Move `amount` from the online to the offline pocket of one wallet
    pub fn convert_to_offline(&self, id: WalletId, amount: Decimal) -> Result<WalletBalance> {
        self.atomically([LockKey::Wallet(id)], |txn| {
            txn.debit(id, Pocket::Online, amount)?;
            txn.credit(id, Pocket::Offline, amount)?;
            Ok(txn.wallet(id)?.balances())
        })
    }
}

impl fmt::Debug for WalletLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletLedger")
            .field("locks", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FaultyStore, MemoryStore};
    use crate::types::PaymentMode;
    use std::thread;

    fn ledger_with(repo: Arc<dyn Repository>) -> (WalletLedger, WalletId) {
        let ledger = WalletLedger::new(repo);
        let id = WalletId::generate();
        ledger
            .atomically([LockKey::Wallet(id)], |txn| txn.create_wallet(id))
            .unwrap();
        (ledger, id)
    }

    fn new_wallet(ledger: &WalletLedger) -> WalletId {
        let id = WalletId::generate();
        ledger
            .atomically([LockKey::Wallet(id)], |txn| txn.create_wallet(id))
            .unwrap();
        id
    }

    #[test]
    fn test_debit_rejects_overdraw() {
        let (ledger, id) = ledger_with(Arc::new(MemoryStore::new()));
        ledger.credit(id, Pocket::Online, Decimal::from(10)).unwrap();

        let err = ledger.debit(id, Pocket::Online, Decimal::from(11)).unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(id).unwrap().online, Decimal::from(10));
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let (ledger, id) = ledger_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            ledger.credit(id, Pocket::Online, Decimal::ZERO),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.credit(id, Pocket::Online, Decimal::from(-5)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_failed_closure_commits_nothing() {
        let (ledger, a) = ledger_with(Arc::new(MemoryStore::new()));
        let b = new_wallet(&ledger);
        ledger.credit(a, Pocket::Online, Decimal::from(100)).unwrap();

        let result: Result<()> = ledger.atomically([LockKey::Wallet(a), LockKey::Wallet(b)], |txn| {
            txn.debit(a, Pocket::Online, Decimal::from(60))?;
            txn.credit(b, Pocket::Online, Decimal::from(60))?;
            txn.debit(a, Pocket::Online, Decimal::from(60))
        });

        assert!(result.is_err());
        assert_eq!(ledger.balance(a).unwrap().online, Decimal::from(100));
        assert_eq!(ledger.balance(b).unwrap().online, Decimal::ZERO);
    }

    #[test]
    fn test_failed_commit_commits_nothing() {
        let store = Arc::new(FaultyStore::new());
        let (ledger, a) = ledger_with(store.clone());
        let b = new_wallet(&ledger);
        ledger.credit(a, Pocket::Online, Decimal::from(100)).unwrap();

        store.set_fail_commits(true);
        let err = ledger
            .transfer(a, Pocket::Online, b, Pocket::Online, Decimal::from(30))
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        store.set_fail_commits(false);
        assert_eq!(ledger.balance(a).unwrap().online, Decimal::from(100));
        assert_eq!(ledger.balance(b).unwrap().online, Decimal::ZERO);
    }

    #[test]
    fn test_unlocked_wallet_is_internal_error() {
        let (ledger, a) = ledger_with(Arc::new(MemoryStore::new()));
        let b = new_wallet(&ledger);

        let err = ledger
            .atomically([LockKey::Wallet(a)], |txn| {
                txn.credit(b, Pocket::Online, Decimal::ONE)
            })
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_transition_requires_lock_and_records() {
        let (ledger, _) = ledger_with(Arc::new(MemoryStore::new()));
        let tx = Transaction::new(
            AccountId::new("p"),
            VendorId::new(1),
            Decimal::from(5),
            PaymentMode::Online,
            TransactionStatus::Flagged,
        );
        let id = tx.id;
        ledger.atomically([], |txn| {
            txn.record(tx);
            Ok(())
        })
        .unwrap();

        let err = ledger
            .atomically([], |txn| txn.transition(id, TransactionStatus::Failed))
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        let updated = ledger
            .atomically([LockKey::Transaction(id)], |txn| {
                txn.transition(id, TransactionStatus::Failed)
            })
            .unwrap();
        assert_eq!(updated.status(), TransactionStatus::Failed);
        assert_eq!(
            ledger.repository().transaction(id).unwrap().unwrap().status(),
            TransactionStatus::Failed
        );
    }

    #[test]
    fn test_lock_table_is_pruned() {
        let (ledger, id) = ledger_with(Arc::new(MemoryStore::new()));
        ledger.credit(id, Pocket::Online, Decimal::ONE).unwrap();
        assert_eq!(ledger.lock_table_size(), 0);
    }

    #[test]
    fn test_concurrent_opposite_transfers_conserve() {
        let (ledger, a) = ledger_with(Arc::new(MemoryStore::new()));
        let b = new_wallet(&ledger);
        ledger.credit(a, Pocket::Online, Decimal::from(1000)).unwrap();
        ledger.credit(b, Pocket::Online, Decimal::from(1000)).unwrap();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    for _ in 0..100 {
                        let _ = ledger.transfer(from, Pocket::Online, to, Pocket::Online, Decimal::from(7));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = ledger.balance(a).unwrap().online + ledger.balance(b).unwrap().online;
        assert_eq!(total, Decimal::from(2000));
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let (ledger, id) = ledger_with(Arc::new(MemoryStore::new()));
        ledger.credit(id, Pocket::Online, Decimal::from(100)).unwrap();
        let ledger = Arc::new(ledger);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.debit(id, Pocket::Online, Decimal::from(30)).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 3);
        assert_eq!(ledger.balance(id).unwrap().online, Decimal::from(10));
    }
}
