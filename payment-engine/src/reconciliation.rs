//! Background settlement of deferred offline payments
//!
//! [`PaymentProcessor::defer_offline`](crate::PaymentProcessor::defer_offline)
//! debits the payer and parks the transaction as PENDING in the pending
//! set. Every tick the sweep retires each entry:
//!
//! - transaction missing, or no longer PENDING: the reference is dropped
//! - `amount > 0` and payer present: vendor store credited, SUCCESSFUL
//! - otherwise: payer's offline balance refunded when possible, FAILED
//!
//! Each entry is its own atomic unit. A failing entry is logged and left in
//! the set for the next tick; the rest of the sweep carries on.

use crate::metrics::PaymentMetrics;
use crate::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use wallet_ledger::{LockKey, Pocket, TransactionId, TransactionStatus, WalletLedger};

/// Counts from one pass over the pending set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Settled to the vendor
    pub settled: usize,
    /// Failed the validity check
    pub failed: usize,
    /// References with nothing left to settle
    pub dropped: usize,
    /// Entries left for the next tick
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Settled,
    Failed,
    Dropped,
}

/// Periodic pending-set reconciler
#[derive(Debug)]
pub struct ReconciliationSweep {
    ledger: Arc<WalletLedger>,
    metrics: PaymentMetrics,
}

impl ReconciliationSweep {
    /// Create new sweep
    pub fn new(ledger: Arc<WalletLedger>, metrics: PaymentMetrics) -> Self {
        Self { ledger, metrics }
    }

    /// One pass over the pending set
    pub fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();

        let pending = match self.ledger.repository().pending_refs() {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Failed to read pending set");
                report.errors += 1;
                return report;
            }
        };

        for id in pending {
            match self.reconcile(id) {
                Ok(EntryOutcome::Settled) => {
                    self.metrics.reconciliation_settled.inc();
                    report.settled += 1;
                }
                Ok(EntryOutcome::Failed) => {
                    self.metrics.reconciliation_failed.inc();
                    report.failed += 1;
                }
                Ok(EntryOutcome::Dropped) => report.dropped += 1,
                Err(e) => {
                    error!(transaction_id = %id, error = %e, "Failed to reconcile pending transaction");
                    report.errors += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                settled = report.settled,
                failed = report.failed,
                dropped = report.dropped,
                errors = report.errors,
                "Reconciliation sweep finished"
            );
        }
        report
    }

    fn reconcile(&self, id: TransactionId) -> Result<EntryOutcome> {
        let repo = self.ledger.repository();

        let snapshot = match repo.transaction(id)? {
            Some(tx) => tx,
            None => {
                self.ledger.atomically([LockKey::Transaction(id)], |txn| {
                    txn.clear_pending(id);
                    Ok(())
                })?;
                debug!(transaction_id = %id, "Dropped reference to missing transaction");
                return Ok(EntryOutcome::Dropped);
            }
        };

        let payer_wallet = repo.account(&snapshot.payer_id)?.map(|a| a.wallet_id);
        let store_wallet = repo.vendor(snapshot.vendor_id)?.map(|v| v.store_wallet);

        let mut keys = vec![LockKey::Transaction(id)];
        keys.extend(payer_wallet.map(LockKey::Wallet));
        keys.extend(store_wallet.map(LockKey::Wallet));

        let outcome = self.ledger.atomically(keys, |txn| {
            txn.clear_pending(id);

            let current = txn.transaction(id)?;
            if current.status() != TransactionStatus::Pending {
                return Ok(EntryOutcome::Dropped);
            }

            let amount = current.amount;
            let valid = amount > Decimal::ZERO && payer_wallet.is_some();

            match (valid, store_wallet) {
                (true, Some(store)) => {
                    txn.credit(store, Pocket::Online, amount)?;
                    txn.transition(id, TransactionStatus::Successful)?;
                    Ok(EntryOutcome::Settled)
                }
                _ => {
                    if let (Some(wallet), true) = (payer_wallet, amount > Decimal::ZERO) {
                        txn.credit(wallet, Pocket::Offline, amount)?;
                    }
                    txn.transition(id, TransactionStatus::Failed)?;
                    Ok(EntryOutcome::Failed)
                }
            }
        })?;

        debug!(transaction_id = %id, ?outcome, "Pending transaction reconciled");
        Ok(outcome)
    }

    /// Sweep every `interval` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "Reconciliation sweep started");

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation sweep stopped");
    }

    /// Start [`ReconciliationSweep::run`] on the current runtime
    ///
    /// Send `true` on the returned sender to stop it.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(interval, rx));
        (handle, tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use risk_engine::GeoPoint;
    use wallet_ledger::{
        Account, AccountId, FaultyStore, MemoryStore, PaymentMode, Repository, Transaction,
        Vendor, VendorId, WalletBalance, WalletId, WriteBatch,
    };

    struct Fixture {
        ledger: Arc<WalletLedger>,
        sweep: ReconciliationSweep,
        payer: Account,
        vendor: Vendor,
    }

    fn fixture_over(repo: Arc<dyn Repository>) -> Fixture {
        let ledger = Arc::new(WalletLedger::new(repo));
        let payer = Account::new(
            AccountId::new("payer"),
            "Payer".into(),
            "payer@example.com".into(),
            WalletId::generate(),
        );
        let vendor = Vendor {
            id: VendorId::new(1),
            name: "Shop".into(),
            location: GeoPoint::new(0.0, 0.0).unwrap(),
            approved: true,
            store_wallet: WalletId::generate(),
            personal_wallet: WalletId::generate(),
            created_at: Utc::now(),
        };
        ledger
            .atomically(
                [
                    LockKey::Wallet(payer.wallet_id),
                    LockKey::Wallet(vendor.store_wallet),
                    LockKey::Wallet(vendor.personal_wallet),
                ],
                |txn| {
                    txn.create_wallet(payer.wallet_id)?;
                    txn.create_wallet(vendor.store_wallet)?;
                    txn.create_wallet(vendor.personal_wallet)?;
                    txn.put_account(payer.clone());
                    txn.put_vendor(vendor.clone());
                    Ok(())
                },
            )
            .unwrap();

        let sweep = ReconciliationSweep::new(ledger.clone(), PaymentMetrics::new().unwrap());
        Fixture {
            ledger,
            sweep,
            payer,
            vendor,
        }
    }

    fn fixture() -> Fixture {
        fixture_over(Arc::new(MemoryStore::new()))
    }

    fn stage(f: &Fixture, payer: AccountId, amount: i64) -> TransactionId {
        let tx = Transaction::new(
            payer,
            f.vendor.id,
            Decimal::from(amount),
            PaymentMode::Offline,
            TransactionStatus::Pending,
        );
        let id = tx.id;
        let mut batch = WriteBatch::new();
        batch.put_transaction(tx).stage_pending(id);
        f.ledger.repository().commit(batch).unwrap();
        id
    }

    fn balances(f: &Fixture, wallet: WalletId) -> WalletBalance {
        f.ledger.balance(wallet).unwrap()
    }

    fn status(f: &Fixture, id: TransactionId) -> TransactionStatus {
        f.ledger
            .repository()
            .transaction(id)
            .unwrap()
            .unwrap()
            .status()
    }

    #[test]
    fn test_valid_entry_settles_to_vendor() {
        let f = fixture();
        let id = stage(&f, f.payer.id.clone(), 40);

        let report = f.sweep.run_once();
        assert_eq!(report.settled, 1);
        assert_eq!(status(&f, id), TransactionStatus::Successful);
        assert_eq!(balances(&f, f.vendor.store_wallet).online, Decimal::from(40));
        assert!(f.ledger.repository().pending_refs().unwrap().is_empty());
        assert_eq!(f.sweep.metrics.reconciliation_settled.get(), 1);

        // Second pass has nothing to do
        assert_eq!(f.sweep.run_once(), SweepReport::default());
    }

    #[test]
    fn test_missing_payer_fails_entry() {
        let f = fixture();
        let id = stage(&f, AccountId::new("ghost"), 40);

        let report = f.sweep.run_once();
        assert_eq!(report.failed, 1);
        assert_eq!(status(&f, id), TransactionStatus::Failed);
        assert_eq!(balances(&f, f.vendor.store_wallet).online, Decimal::ZERO);
        assert!(f.ledger.repository().pending_refs().unwrap().is_empty());
    }

    #[test]
    fn test_missing_and_terminal_references_dropped() {
        let f = fixture();

        let mut batch = WriteBatch::new();
        batch.stage_pending(TransactionId::generate());
        f.ledger.repository().commit(batch).unwrap();

        let settled = stage(&f, f.payer.id.clone(), 5);
        let mut tx = f.ledger.repository().transaction(settled).unwrap().unwrap();
        tx.transition(TransactionStatus::Successful).unwrap();
        let mut batch = WriteBatch::new();
        batch.put_transaction(tx);
        f.ledger.repository().commit(batch).unwrap();

        let report = f.sweep.run_once();
        assert_eq!(report.dropped, 2);
        assert_eq!(report.settled, 0);
        assert_eq!(balances(&f, f.vendor.store_wallet).online, Decimal::ZERO);
        assert!(f.ledger.repository().pending_refs().unwrap().is_empty());
    }

    #[test]
    fn test_failing_entry_retried_next_tick() {
        let store = Arc::new(FaultyStore::new());
        let f = fixture_over(store.clone());
        let id = stage(&f, f.payer.id.clone(), 10);

        store.set_fail_commits(true);
        let report = f.sweep.run_once();
        assert_eq!(report.errors, 1);
        assert_eq!(status(&f, id), TransactionStatus::Pending);
        assert_eq!(f.ledger.repository().pending_refs().unwrap(), vec![id]);

        store.set_fail_commits(false);
        assert_eq!(f.sweep.run_once().settled, 1);
        assert_eq!(status(&f, id), TransactionStatus::Successful);
    }

    #[tokio::test]
    async fn test_spawned_sweep_settles_and_stops() {
        let f = fixture();
        let id = stage(&f, f.payer.id.clone(), 15);

        let sweep = Arc::new(ReconciliationSweep::new(
            f.ledger.clone(),
            PaymentMetrics::new().unwrap(),
        ));
        let (handle, shutdown) = sweep.spawn(Duration::from_millis(10));

        for _ in 0..100 {
            if status(&f, id) == TransactionStatus::Successful {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status(&f, id), TransactionStatus::Successful);

        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }
}
