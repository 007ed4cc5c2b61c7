//! Payment lifecycle events
//!
//! Events are fire-and-forget: a sink failure is logged and never changes
//! the outcome of the payment that produced it.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use wallet_ledger::{AccountId, PaymentMode, Transaction, TransactionId, TransactionStatus, VendorId};

/// Event names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventType {
    /// Request passed validation and is about to touch the ledger
    PaymentInitiated,
    /// Funds reached the vendor
    PaymentCompleted,
    /// Payment rejected or refunded
    PaymentFailed,
    /// Payment made outside the geofence
    FraudDetected,
}

impl fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentEventType::PaymentInitiated => "PAYMENT_INITIATED",
            PaymentEventType::PaymentCompleted => "PAYMENT_COMPLETED",
            PaymentEventType::PaymentFailed => "PAYMENT_FAILED",
            PaymentEventType::FraudDetected => "FRAUD_DETECTED",
        };
        write!(f, "{}", s)
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Event name
    pub event_type: PaymentEventType,
    /// Transaction, once one exists
    pub transaction_id: Option<TransactionId>,
    /// Paying account
    pub payer_id: AccountId,
    /// Receiving vendor
    pub vendor_id: VendorId,
    /// Amount
    pub amount: Decimal,
    /// Payment mode
    pub mode: PaymentMode,
    /// Transaction status, once one exists
    pub status: Option<TransactionStatus>,
    /// Free-form detail (failure reason, distance)
    pub detail: Option<String>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

impl PaymentEvent {
    /// Event about a request that has no transaction (yet)
    pub fn for_request(
        event_type: PaymentEventType,
        payer_id: AccountId,
        vendor_id: VendorId,
        amount: Decimal,
        mode: PaymentMode,
    ) -> Self {
        Self {
            event_type,
            transaction_id: None,
            payer_id,
            vendor_id,
            amount,
            mode,
            status: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Event describing a recorded transaction
    pub fn for_transaction(event_type: PaymentEventType, tx: &Transaction) -> Self {
        Self {
            event_type,
            transaction_id: Some(tx.id),
            payer_id: tx.payer_id.clone(),
            vendor_id: tx.vendor_id,
            amount: tx.amount,
            mode: tx.mode,
            status: Some(tx.status()),
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a detail string
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink failure
#[derive(Debug, Error)]
#[error("event sink error: {0}")]
pub struct SinkError(pub String);

/// Observability collaborator receiving payment events
pub trait EventSink: Send + Sync + fmt::Debug {
    /// Deliver one event
    fn publish(&self, event: &PaymentEvent) -> Result<(), SinkError>;
}

/// Sink writing each event as a JSON tracing record
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: &PaymentEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event).map_err(|e| SinkError(e.to_string()))?;
        tracing::info!(
            target: "payment_events",
            event_type = %event.event_type,
            payload = %payload,
            "Payment event"
        );
        Ok(())
    }
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: &PaymentEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Publish and swallow failures
pub(crate) fn emit(sink: &dyn EventSink, event: PaymentEvent) {
    if let Err(e) = sink.publish(&event) {
        tracing::warn!(event_type = %event.event_type, error = %e, "Event emission failed");
    }
}

/// Sink that keeps events in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PaymentEvent>>,
}

impl RecordingEventSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the recorded events, in order
    pub fn event_types(&self) -> Vec<PaymentEventType> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    /// Copy of every recorded event
    pub fn snapshot(&self) -> Vec<PaymentEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: &PaymentEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
