//! Online and offline payment execution
//!
//! # Online protocol
//!
//! 1. Validate the request (no ledger access on failure)
//! 2. Look up payer, then vendor; the vendor must be approved
//! 3. Debit the payer's online balance
//! 4. Inside the 20 km geofence: credit the vendor store wallet, SUCCESSFUL.
//!    Outside: the payer stays debited, the vendor is not credited, FLAGGED.
//!
//! # Offline protocol
//!
//! Same shape, except the payer must present a code from their wallet's
//! code set and the offline balance is debited. The failure order is
//! payer, code, offline balance, vendor, approval.
//!
//! Every balance change and its transaction record commit as one unit.

use crate::events::{emit, EventSink, PaymentEvent, PaymentEventType};
use crate::metrics::PaymentMetrics;
use crate::validation::{OfflinePaymentRequest, OnlinePaymentRequest, ValidatedPayment};
use crate::Result;
use risk_engine::Geofence;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use wallet_ledger::{
    Account, CodePool, Error as LedgerError, LockKey, PaymentMode, Pocket, Transaction,
    TransactionId, TransactionStatus, Vendor, WalletLedger,
};

/// Executes payments against the ledger
#[derive(Debug)]
pub struct PaymentProcessor {
    ledger: Arc<WalletLedger>,
    codes: CodePool,
    geofence: Geofence,
    events: Arc<dyn EventSink>,
    metrics: PaymentMetrics,
}

/// Recorded transaction and the payer's distance from the vendor
type Outcome = (Transaction, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfflineSettlement {
    Immediate,
    Deferred,
}

impl PaymentProcessor {
    /// Create new processor
    pub fn new(
        ledger: Arc<WalletLedger>,
        codes: CodePool,
        events: Arc<dyn EventSink>,
        metrics: PaymentMetrics,
    ) -> Self {
        Self {
            ledger,
            codes,
            geofence: Geofence::payments(),
            events,
            metrics,
        }
    }

    /// Execute an online payment
    pub fn pay_online(&self, request: &OnlinePaymentRequest) -> Result<Transaction> {
        let started = Instant::now();
        let payment = request.validate()?;
        self.begin(&payment, PaymentMode::Online);

        let result = self.execute_online(&payment);
        self.finish(&payment, PaymentMode::Online, started, result)
    }

    /// Execute an offline payment, settling immediately
    pub fn pay_offline(&self, request: &OfflinePaymentRequest) -> Result<Transaction> {
        self.offline(request, OfflineSettlement::Immediate)
    }

    /// Execute an offline payment, leaving vendor settlement to the sweep
    ///
    /// Outside the geofence this behaves exactly like
    /// [`PaymentProcessor::pay_offline`].
    pub fn defer_offline(&self, request: &OfflinePaymentRequest) -> Result<Transaction> {
        self.offline(request, OfflineSettlement::Deferred)
    }

    /// Transactions awaiting adjudication, oldest first
    pub fn flagged_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self
            .ledger
            .repository()
            .transactions_by_status(TransactionStatus::Flagged)?)
    }

    /// Look up a transaction
    pub fn transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.ledger
            .repository()
            .transaction(id)?
            .ok_or_else(|| LedgerError::TransactionNotFound(id.to_string()).into())
    }

    fn offline(
        &self,
        request: &OfflinePaymentRequest,
        settlement: OfflineSettlement,
    ) -> Result<Transaction> {
        let started = Instant::now();
        let (payment, code) = request.validate()?;
        self.begin(&payment, PaymentMode::Offline);

        let result = self.execute_offline(&payment, &code, settlement);
        self.finish(&payment, PaymentMode::Offline, started, result)
    }

    fn payer(&self, payment: &ValidatedPayment) -> wallet_ledger::Result<Account> {
        self.ledger
            .repository()
            .account(&payment.payer_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(payment.payer_id.to_string()))
    }

    fn execute_online(&self, payment: &ValidatedPayment) -> wallet_ledger::Result<Outcome> {
        let payer = self.payer(payment)?;
        let vendor = self
            .ledger
            .repository()
            .vendor(payment.vendor_id)?
            .ok_or_else(|| LedgerError::VendorNotFound(payment.vendor_id.to_string()))?;
        ensure_approved(&vendor)?;

        let verdict = self.geofence.check(&vendor.location, &payment.location);
        let amount = payment.amount;

        self.ledger.atomically(
            [
                LockKey::Wallet(payer.wallet_id),
                LockKey::Wallet(vendor.store_wallet),
            ],
            |txn| {
                txn.debit(payer.wallet_id, Pocket::Online, amount)?;

                let status = if verdict.within {
                    txn.credit(vendor.store_wallet, Pocket::Online, amount)?;
                    TransactionStatus::Successful
                } else {
                    warn!(
                        payer = %payer.id,
                        vendor = %vendor.id,
                        distance_km = verdict.distance_km,
                        "Online payment outside geofence, flagging"
                    );
                    TransactionStatus::Flagged
                };

                let tx = Transaction::new(
                    payer.id.clone(),
                    vendor.id,
                    amount,
                    PaymentMode::Online,
                    status,
                );
                txn.record(tx.clone());
                Ok((tx, verdict.distance_km))
            },
        )
    }

    fn execute_offline(
        &self,
        payment: &ValidatedPayment,
        code: &str,
        settlement: OfflineSettlement,
    ) -> wallet_ledger::Result<Outcome> {
        let payer = self.payer(payment)?;
        let vendor = self.ledger.repository().vendor(payment.vendor_id)?;
        let amount = payment.amount;

        let mut keys = vec![LockKey::Wallet(payer.wallet_id)];
        if let Some(vendor) = &vendor {
            keys.push(LockKey::Wallet(vendor.store_wallet));
        }

        self.ledger.atomically(keys, |txn| {
            self.codes.consume(txn, payer.wallet_id, code)?;
            txn.debit(payer.wallet_id, Pocket::Offline, amount)?;

            let vendor = vendor
                .as_ref()
                .ok_or_else(|| LedgerError::VendorNotFound(payment.vendor_id.to_string()))?;
            ensure_approved(vendor)?;

            let verdict = self.geofence.check(&vendor.location, &payment.location);
            let status = match (verdict.within, settlement) {
                (false, _) => {
                    warn!(
                        payer = %payer.id,
                        vendor = %vendor.id,
                        distance_km = verdict.distance_km,
                        "Offline payment outside geofence, flagging"
                    );
                    TransactionStatus::Flagged
                }
                (true, OfflineSettlement::Immediate) => {
                    txn.credit(vendor.store_wallet, Pocket::Online, amount)?;
                    TransactionStatus::Successful
                }
                (true, OfflineSettlement::Deferred) => TransactionStatus::Pending,
            };

            let tx = Transaction::new(
                payer.id.clone(),
                vendor.id,
                amount,
                PaymentMode::Offline,
                status,
            );
            if status == TransactionStatus::Pending {
                txn.stage_pending(tx.id);
            }
            txn.record(tx.clone());
            Ok((tx, verdict.distance_km))
        })
    }

    fn begin(&self, payment: &ValidatedPayment, mode: PaymentMode) {
        debug!(payer = %payment.payer_id, vendor = %payment.vendor_id, %mode, "Payment initiated");
        self.metrics.record_attempt(mode);
        emit(
            self.events.as_ref(),
            PaymentEvent::for_request(
                PaymentEventType::PaymentInitiated,
                payment.payer_id.clone(),
                payment.vendor_id,
                payment.amount,
                mode,
            ),
        );
    }

    fn finish(
        &self,
        payment: &ValidatedPayment,
        mode: PaymentMode,
        started: Instant,
        result: wallet_ledger::Result<Outcome>,
    ) -> Result<Transaction> {
        self.metrics.record_duration(started.elapsed());

        match &result {
            Ok((tx, distance_km)) => match tx.status() {
                TransactionStatus::Successful => {
                    info!(transaction_id = %tx.id, %mode, amount = %tx.amount, "Payment completed");
                    emit(
                        self.events.as_ref(),
                        PaymentEvent::for_transaction(PaymentEventType::PaymentCompleted, tx),
                    );
                }
                TransactionStatus::Flagged => {
                    self.metrics.record_flagged();
                    emit(
                        self.events.as_ref(),
                        PaymentEvent::for_transaction(PaymentEventType::FraudDetected, tx)
                            .with_detail(format!("{:.2} km from vendor", distance_km)),
                    );
                }
                TransactionStatus::Pending => {
                    info!(transaction_id = %tx.id, "Offline payment staged for reconciliation");
                }
                TransactionStatus::Failed => {}
            },
            Err(err) => {
                self.metrics.record_failure();
                warn!(payer = %payment.payer_id, %mode, error = %err, "Payment failed");
                emit(
                    self.events.as_ref(),
                    PaymentEvent::for_request(
                        PaymentEventType::PaymentFailed,
                        payment.payer_id.clone(),
                        payment.vendor_id,
                        payment.amount,
                        mode,
                    )
                    .with_detail(err.to_string()),
                );
            }
        }

        Ok(result?.0)
    }
}

fn ensure_approved(vendor: &Vendor) -> wallet_ledger::Result<()> {
    if vendor.approved {
        Ok(())
    } else {
        Err(LedgerError::VendorNotApproved(vendor.id.to_string()))
    }
}
