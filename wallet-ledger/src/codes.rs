//! Offline authorisation codes
//!
//! A wallet carries a set of short alphanumeric codes. Any code in the set
//! authorises an offline payment; codes are not removed on use. A fresh batch
//! is provisioned only when the set is empty.

use crate::{
    ledger::{LedgerTxn, LockKey, WalletLedger},
    types::WalletId,
    Error, Result,
};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::BTreeSet;

/// Codes generated per provisioning
pub const CODE_BATCH_SIZE: usize = 5;

/// Characters per code
pub const CODE_LENGTH: usize = 8;

/// Code generation and membership checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePool {
    batch_size: usize,
    code_length: usize,
}

impl Default for CodePool {
    fn default() -> Self {
        Self {
            batch_size: CODE_BATCH_SIZE,
            code_length: CODE_LENGTH,
        }
    }
}

impl CodePool {
    /// Pool with default sizing
    pub fn new() -> Self {
        Self::default()
    }

    /// Codes generated per provisioning
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Generate `batch_size` distinct codes
    pub fn generate(&self) -> BTreeSet<String> {
        let mut rng = rand::thread_rng();
        let mut codes = BTreeSet::new();
        while codes.len() < self.batch_size {
            let code: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(self.code_length)
                .map(char::from)
                .collect();
            codes.insert(code);
        }
        codes
    }

    /// Give the wallet a batch if its set is empty
    ///
    /// Must run inside a transaction holding the wallet's lock, which makes
    /// concurrent calls provision at most once. Returns whether a batch was
    /// added.
    pub fn ensure_provisioned(&self, txn: &mut LedgerTxn<'_>, wallet: WalletId) -> Result<bool> {
        if !txn.wallet(wallet)?.codes().is_empty() {
            return Ok(false);
        }
        txn.add_codes(wallet, self.generate())?;
        tracing::debug!(wallet = %wallet, count = self.batch_size, "Offline codes provisioned");
        Ok(true)
    }

    /// Check `code` against the wallet's set
    ///
    /// The code stays in the set.
    pub fn consume(&self, txn: &mut LedgerTxn<'_>, wallet: WalletId, code: &str) -> Result<()> {
        if txn.wallet(wallet)?.has_code(code) {
            Ok(())
        } else {
            Err(Error::InvalidCode)
        }
    }

    /// Provision outside any other operation
    pub fn provision(&self, ledger: &WalletLedger, wallet: WalletId) -> Result<bool> {
        ledger.atomically([LockKey::Wallet(wallet)], |txn| {
            self.ensure_provisioned(txn, wallet)
        })
    }

    /// Whether the wallet has no codes
    pub fn is_exhausted(&self, ledger: &WalletLedger, wallet: WalletId) -> Result<bool> {
        Ok(ledger.wallet(wallet)?.codes().is_empty())
    }

    /// The wallet's current codes
    pub fn codes(&self, ledger: &WalletLedger, wallet: WalletId) -> Result<BTreeSet<String>> {
        Ok(ledger.wallet(wallet)?.codes().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use std::thread;

    fn setup() -> (Arc<WalletLedger>, WalletId) {
        let ledger = WalletLedger::new(Arc::new(MemoryStore::new()));
        let id = WalletId::generate();
        ledger
            .atomically([LockKey::Wallet(id)], |txn| txn.create_wallet(id))
            .unwrap();
        (Arc::new(ledger), id)
    }

    #[test]
    fn test_generated_codes_shape() {
        let codes = CodePool::new().generate();
        assert_eq!(codes.len(), CODE_BATCH_SIZE);
        for code in &codes {
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_provision_only_when_empty() {
        let (ledger, id) = setup();
        let pool = CodePool::new();

        assert!(pool.is_exhausted(&ledger, id).unwrap());
        assert!(pool.provision(&ledger, id).unwrap());
        let first = pool.codes(&ledger, id).unwrap();
        assert_eq!(first.len(), CODE_BATCH_SIZE);

        assert!(!pool.provision(&ledger, id).unwrap());
        assert_eq!(pool.codes(&ledger, id).unwrap(), first);
    }

    #[test]
    fn test_consume_keeps_code() {
        let (ledger, id) = setup();
        let pool = CodePool::new();
        pool.provision(&ledger, id).unwrap();
        let code = pool.codes(&ledger, id).unwrap().into_iter().next().unwrap();

        for _ in 0..3 {
            ledger
                .atomically([LockKey::Wallet(id)], |txn| pool.consume(txn, id, &code))
                .unwrap();
        }
        assert!(pool.codes(&ledger, id).unwrap().contains(&code));

        let err = ledger
            .atomically([LockKey::Wallet(id)], |txn| pool.consume(txn, id, "nope1234"))
            .unwrap_err();
        assert_eq!(err, Error::InvalidCode);
    }

    #[test]
    fn test_concurrent_provision_happens_once() {
        let (ledger, id) = setup();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || CodePool::new().provision(&ledger, id).unwrap())
            })
            .collect();
        let provisioned = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();

        assert_eq!(provisioned, 1);
        assert_eq!(CodePool::new().codes(&ledger, id).unwrap().len(), CODE_BATCH_SIZE);
    }
}
