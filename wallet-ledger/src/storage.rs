//! Storage layer
//!
//! The [`Repository`] trait is the persistence seam. Writes go through a
//! [`WriteBatch`] that is applied all-or-nothing, so a multi-record
//! mutation (debit + credit + transaction row) is never half-visible.
//!
//! [`MemoryStore`] is the in-process implementation used by the server and
//! the tests.

use crate::{
    error::{Error, Result},
    types::{
        Account, AccountId, Admin, AdminId, Transaction, TransactionId, TransactionStatus, Vendor,
        VendorId, Wallet, WalletId,
    },
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Single staged write
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace an account
    PutAccount(Account),
    /// Insert or replace a vendor
    PutVendor(Vendor),
    /// Insert or replace a wallet
    PutWallet(Wallet),
    /// Insert or replace a transaction
    PutTransaction(Transaction),
    /// Insert or replace an admin
    PutAdmin(Admin),
    /// Add a reference to the pending-settlement queue
    StagePending(TransactionId),
    /// Remove a reference from the pending-settlement queue
    ClearPending(TransactionId),
}

/// Ordered set of writes applied atomically by [`Repository::commit`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an account write
    pub fn put_account(&mut self, account: Account) -> &mut Self {
        self.ops.push(WriteOp::PutAccount(account));
        self
    }

    /// Stage a vendor write
    pub fn put_vendor(&mut self, vendor: Vendor) -> &mut Self {
        self.ops.push(WriteOp::PutVendor(vendor));
        self
    }

    /// Stage a wallet write
    pub fn put_wallet(&mut self, wallet: Wallet) -> &mut Self {
        self.ops.push(WriteOp::PutWallet(wallet));
        self
    }

    /// Stage a transaction write
    pub fn put_transaction(&mut self, tx: Transaction) -> &mut Self {
        self.ops.push(WriteOp::PutTransaction(tx));
        self
    }

    /// Stage an admin write
    pub fn put_admin(&mut self, admin: Admin) -> &mut Self {
        self.ops.push(WriteOp::PutAdmin(admin));
        self
    }

    /// Stage a pending-queue insert
    pub fn stage_pending(&mut self, id: TransactionId) -> &mut Self {
        self.ops.push(WriteOp::StagePending(id));
        self
    }

    /// Stage a pending-queue removal
    pub fn clear_pending(&mut self, id: TransactionId) -> &mut Self {
        self.ops.push(WriteOp::ClearPending(id));
        self
    }

    /// Append an already-built write
    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Staged writes in order
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume into the staged writes
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Persistence collaborator
///
/// Reads return `Ok(None)` for a missing record; lookups never fail just
/// because a key is absent.
pub trait Repository: Send + Sync {
    /// Look up an account
    fn account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// All accounts
    fn accounts(&self) -> Result<Vec<Account>>;

    /// Look up a vendor
    fn vendor(&self, id: VendorId) -> Result<Option<Vendor>>;

    /// Look up a wallet
    fn wallet(&self, id: WalletId) -> Result<Option<Wallet>>;

    /// Look up a transaction
    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Transactions with the given status, oldest first
    fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>>;

    /// Look up an admin
    fn admin(&self, id: AdminId) -> Result<Option<Admin>>;

    /// Snapshot of the pending-settlement queue, oldest first
    fn pending_refs(&self) -> Result<Vec<TransactionId>>;

    /// Apply every write in `batch`, or none of them
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    vendors: HashMap<VendorId, Vendor>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    admins: HashMap<AdminId, Admin>,
    // TransactionId is UUIDv7, so ordering is creation order
    pending: BTreeSet<TransactionId>,
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryStore {
    fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.state.read().accounts.get(id).cloned())
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self.state.read().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(accounts)
    }

    fn vendor(&self, id: VendorId) -> Result<Option<Vendor>> {
        Ok(self.state.read().vendors.get(&id).cloned())
    }

    fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        Ok(self.state.read().wallets.get(&id).cloned())
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.state.read().transactions.get(&id).cloned())
    }

    fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .state
            .read()
            .transactions
            .values()
            .filter(|tx| tx.status() == status)
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.id);
        Ok(txs)
    }

    fn admin(&self, id: AdminId) -> Result<Option<Admin>> {
        Ok(self.state.read().admins.get(&id).cloned())
    }

    fn pending_refs(&self) -> Result<Vec<TransactionId>> {
        Ok(self.state.read().pending.iter().copied().collect())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut state = self.state.write();
        for op in batch.into_ops() {
            match op {
                WriteOp::PutAccount(account) => {
                    state.accounts.insert(account.id.clone(), account);
                }
                WriteOp::PutVendor(vendor) => {
                    state.vendors.insert(vendor.id, vendor);
                }
                WriteOp::PutWallet(wallet) => {
                    state.wallets.insert(wallet.id, wallet);
                }
                WriteOp::PutTransaction(tx) => {
                    state.transactions.insert(tx.id, tx);
                }
                WriteOp::PutAdmin(admin) => {
                    state.admins.insert(admin.id, admin);
                }
                WriteOp::StagePending(id) => {
                    state.pending.insert(id);
                }
                WriteOp::ClearPending(id) => {
                    state.pending.remove(&id);
                }
            }
        }

        tracing::trace!(ops = count, "Batch committed");
        Ok(())
    }
}

/// Repository wrapper whose commits can be switched to fail
///
/// Used to exercise the all-or-nothing path.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_commits: std::sync::atomic::AtomicBool,
}

impl FaultyStore {
    /// Wrap a fresh in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail (or succeed again)
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Repository for FaultyStore {
    fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.inner.account(id)
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        self.inner.accounts()
    }

    fn vendor(&self, id: VendorId) -> Result<Option<Vendor>> {
        self.inner.vendor(id)
    }

    fn wallet(&self, id: WalletId) -> Result<Option<Wallet>> {
        self.inner.wallet(id)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.inner.transaction(id)
    }

    fn transactions_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        self.inner.transactions_by_status(status)
    }

    fn admin(&self, id: AdminId) -> Result<Option<Admin>> {
        self.inner.admin(id)
    }

    fn pending_refs(&self) -> Result<Vec<TransactionId>> {
        self.inner.pending_refs()
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if self.fail_commits.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Storage(format!(
                "commit of {} ops refused",
                batch.len()
            )));
        }
        self.inner.commit(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMode, Pocket};
    use rust_decimal::Decimal;

    #[test]
    fn test_missing_records_are_none() {
        let store = MemoryStore::new();
        assert!(store.account(&AccountId::new("nobody")).unwrap().is_none());
        assert!(store.vendor(VendorId::new(1)).unwrap().is_none());
        assert!(store.wallet(WalletId::generate()).unwrap().is_none());
        assert!(store.pending_refs().unwrap().is_empty());
    }

    #[test]
    fn test_batch_applies_all_writes() {
        let store = MemoryStore::new();
        let mut wallet = Wallet::new(WalletId::generate());
        wallet.credit(Pocket::Offline, Decimal::from(5));
        let tx = Transaction::new(
            AccountId::new("a"),
            VendorId::new(3),
            Decimal::from(5),
            PaymentMode::Offline,
            TransactionStatus::Pending,
        );

        let mut batch = WriteBatch::new();
        batch
            .put_wallet(wallet.clone())
            .put_transaction(tx.clone())
            .stage_pending(tx.id);
        store.commit(batch).unwrap();

        assert_eq!(store.wallet(wallet.id).unwrap(), Some(wallet));
        assert_eq!(store.pending_refs().unwrap(), vec![tx.id]);
        assert_eq!(
            store
                .transactions_by_status(TransactionStatus::Pending)
                .unwrap()
                .len(),
            1
        );

        let mut clear = WriteBatch::new();
        clear.clear_pending(tx.id);
        store.commit(clear).unwrap();
        assert!(store.pending_refs().unwrap().is_empty());
    }

    #[test]
    fn test_faulty_store_applies_nothing() {
        let store = FaultyStore::new();
        store.set_fail_commits(true);

        let wallet = Wallet::new(WalletId::generate());
        let mut batch = WriteBatch::new();
        batch.put_wallet(wallet.clone());

        assert!(matches!(store.commit(batch), Err(Error::Storage(_))));
        assert!(store.wallet(wallet.id).unwrap().is_none());
    }
}
