//! Admin review of flagged payments
//!
//! A FLAGGED transaction has already debited the payer. Review resolves it:
//! approval settles the amount to the vendor's store wallet, rejection
//! refunds it to the payer's online balance (regardless of the original
//! mode). Reviewing a transaction that is no longer FLAGGED does nothing.

use crate::events::{emit, EventSink, PaymentEvent, PaymentEventType};
use crate::onboarding::AdminGrant;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};
use wallet_ledger::{
    Error as LedgerError, LockKey, Pocket, Transaction, TransactionId, TransactionStatus,
    WalletLedger,
};

/// What a review did
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// Settled to the vendor
    Approved(Transaction),
    /// Refunded to the payer
    Rejected(Transaction),
    /// Transaction was not FLAGGED; nothing changed
    AlreadyResolved(TransactionStatus),
}

/// Resolves FLAGGED transactions
#[derive(Debug)]
pub struct AdjudicationWorkflow {
    ledger: Arc<WalletLedger>,
    events: Arc<dyn EventSink>,
}

impl AdjudicationWorkflow {
    /// Create new workflow
    pub fn new(ledger: Arc<WalletLedger>, events: Arc<dyn EventSink>) -> Self {
        Self { ledger, events }
    }

    /// Approve or reject a flagged transaction
    pub fn review(
        &self,
        grant: &AdminGrant,
        id: TransactionId,
        approve: bool,
    ) -> Result<ReviewOutcome> {
        let repo = self.ledger.repository();
        let snapshot = repo
            .transaction(id)?
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()))?;
        let payer = repo
            .account(&snapshot.payer_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(snapshot.payer_id.to_string()))?;
        let vendor = repo
            .vendor(snapshot.vendor_id)?
            .ok_or_else(|| LedgerError::VendorNotFound(snapshot.vendor_id.to_string()))?;

        let outcome = self.ledger.atomically(
            [
                LockKey::Transaction(id),
                LockKey::Wallet(payer.wallet_id),
                LockKey::Wallet(vendor.store_wallet),
            ],
            |txn| {
                let current = txn.transaction(id)?;
                if current.status() != TransactionStatus::Flagged {
                    return Ok(ReviewOutcome::AlreadyResolved(current.status()));
                }

                if approve {
                    txn.credit(vendor.store_wallet, Pocket::Online, current.amount)?;
                    let tx = txn.transition(id, TransactionStatus::Successful)?;
                    Ok(ReviewOutcome::Approved(tx))
                } else {
                    txn.credit(payer.wallet_id, Pocket::Online, current.amount)?;
                    let tx = txn.transition(id, TransactionStatus::Failed)?;
                    Ok(ReviewOutcome::Rejected(tx))
                }
            },
        )?;

        match &outcome {
            ReviewOutcome::Approved(tx) => {
                info!(transaction_id = %id, admin = %grant.admin_id(), amount = %tx.amount, "Flagged payment approved");
                emit(
                    self.events.as_ref(),
                    PaymentEvent::for_transaction(PaymentEventType::PaymentCompleted, tx),
                );
            }
            ReviewOutcome::Rejected(tx) => {
                info!(transaction_id = %id, admin = %grant.admin_id(), amount = %tx.amount, "Flagged payment rejected, payer refunded");
                emit(
                    self.events.as_ref(),
                    PaymentEvent::for_transaction(PaymentEventType::PaymentFailed, tx)
                        .with_detail("rejected on review"),
                );
            }
            ReviewOutcome::AlreadyResolved(status) => {
                debug!(transaction_id = %id, %status, "Review of resolved transaction ignored");
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::metrics::PaymentMetrics;
    use crate::onboarding::AccountService;
    use crate::processor::PaymentProcessor;
    use crate::validation::OnlinePaymentRequest;
    use crate::wallets::WalletService;
    use crate::ErrorKind;
    use rust_decimal::Decimal;
    use wallet_ledger::{AccountId, CodePool, MemoryStore};

    struct Fixture {
        workflow: AdjudicationWorkflow,
        wallets: WalletService,
        grant: AdminGrant,
        payer: AccountId,
        flagged: Transaction,
        events: Arc<RecordingEventSink>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(WalletLedger::new(Arc::new(MemoryStore::new())));
        let accounts = AccountService::new(ledger.clone(), CodePool::new()).unwrap();
        let wallets = WalletService::new(ledger.clone(), CodePool::new());
        let events = Arc::new(RecordingEventSink::new());
        let processor = PaymentProcessor::new(
            ledger.clone(),
            CodePool::new(),
            events.clone(),
            PaymentMetrics::new().unwrap(),
        );
        let workflow = AdjudicationWorkflow::new(ledger, events.clone());

        let admin = accounts.register_admin("Root").unwrap();
        let grant = accounts.authorize_admin(admin.id).unwrap();
        let payer = accounts.register_account("Payer", "payer@example.com").unwrap();
        accounts.register_vendor(7, "Kiosk", 0.0, 0.0).unwrap();
        accounts.approve_vendor(&grant, wallet_ledger::VendorId::new(7)).unwrap();
        wallets.top_up(&payer, Decimal::from(100)).unwrap();

        let flagged = processor
            .pay_online(&OnlinePaymentRequest {
                payer_id: payer.to_string(),
                vendor_id: 7,
                amount: Decimal::from(50),
                latitude: 10.0,
                longitude: 10.0,
            })
            .unwrap();
        assert_eq!(flagged.status(), TransactionStatus::Flagged);

        Fixture {
            workflow,
            wallets,
            grant,
            payer,
            flagged,
            events,
        }
    }

    fn store(f: &Fixture) -> Decimal {
        f.wallets
            .vendor_balances(wallet_ledger::VendorId::new(7))
            .unwrap()
            .0
            .online
    }

    #[test]
    fn test_approve_settles_to_vendor() {
        let f = fixture();
        assert_eq!(f.wallets.balance(&f.payer).unwrap().online, Decimal::from(50));

        let outcome = f.workflow.review(&f.grant, f.flagged.id, true).unwrap();
        match outcome {
            ReviewOutcome::Approved(tx) => assert_eq!(tx.status(), TransactionStatus::Successful),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store(&f), Decimal::from(50));
        assert_eq!(f.wallets.balance(&f.payer).unwrap().online, Decimal::from(50));
        assert_eq!(
            f.events.event_types().last(),
            Some(&PaymentEventType::PaymentCompleted)
        );
    }

    #[test]
    fn test_reject_refunds_payer_online() {
        let f = fixture();

        let outcome = f.workflow.review(&f.grant, f.flagged.id, false).unwrap();
        assert!(matches!(outcome, ReviewOutcome::Rejected(_)));
        assert_eq!(f.wallets.balance(&f.payer).unwrap().online, Decimal::from(100));
        assert_eq!(store(&f), Decimal::ZERO);
    }

    #[test]
    fn test_second_review_is_noop() {
        let f = fixture();
        f.workflow.review(&f.grant, f.flagged.id, true).unwrap();

        let outcome = f.workflow.review(&f.grant, f.flagged.id, false).unwrap();
        assert_eq!(
            outcome,
            ReviewOutcome::AlreadyResolved(TransactionStatus::Successful)
        );
        assert_eq!(store(&f), Decimal::from(50));
        assert_eq!(f.wallets.balance(&f.payer).unwrap().online, Decimal::from(50));
    }

    #[test]
    fn test_unknown_transaction() {
        let f = fixture();
        let err = f
            .workflow
            .review(&f.grant, TransactionId::generate(), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
