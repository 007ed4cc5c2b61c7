//! GeoPay Payment Engine
//!
//! Online and offline wallet payments guarded by a vendor geofence.
//!
//! # Architecture
//!
//! - **Gateway**: token-bucket admission per client IP and per payer
//! - **Processor**: validates, debits the payer and settles or flags
//! - **Adjudication**: admin review of flagged payments
//! - **Reconciliation**: background settlement of deferred offline payments
//!
//! A payment made within 20 km of the vendor settles immediately. Further
//! away, the payer is still debited but the vendor is only paid once an
//! admin approves; rejection refunds the payer.
//!
//! # Example
//!
//! ```no_run
//! use payment_engine::{Config, OnlinePaymentRequest, PaymentEngine};
//! use rust_decimal::Decimal;
//!
//! fn main() -> payment_engine::Result<()> {
//!     let engine = PaymentEngine::new(Config::default())?;
//!     let accounts = engine.accounts();
//!
//!     let admin = accounts.register_admin("Ops")?;
//!     let grant = accounts.authorize_admin(admin.id)?;
//!     let payer = accounts.register_account("Jane Doe", "jane@example.com")?;
//!     let vendor = accounts.register_vendor(1, "Corner Shop", 40.7128, -74.0060)?;
//!     accounts.approve_vendor(&grant, vendor.id)?;
//!     engine.wallets().top_up(&payer, Decimal::from(1000))?;
//!
//!     let tx = engine.processor().pay_online(&OnlinePaymentRequest {
//!         payer_id: payer.to_string(),
//!         vendor_id: 1,
//!         amount: Decimal::from(100),
//!         latitude: 40.7130,
//!         longitude: -74.0062,
//!     })?;
//!     println!("{} {}", tx.id, tx.status());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod adjudication;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod metrics;
pub mod onboarding;
pub mod processor;
pub mod reconciliation;
pub mod telemetry;
pub mod validation;
pub mod wallets;

// Re-exports
pub use adjudication::{AdjudicationWorkflow, ReviewOutcome};
pub use config::{Config, LoggingConfig, ReconciliationConfig};
pub use engine::{PaymentEngine, SweepHandle};
pub use error::{Error, ErrorKind, Result};
pub use events::{
    EventSink, LogEventSink, NoopEventSink, PaymentEvent, PaymentEventType, RecordingEventSink,
    SinkError,
};
pub use gateway::PaymentGateway;
pub use metrics::PaymentMetrics;
pub use onboarding::{AccountService, AdminGrant, DEFAULT_WAITING_PERIOD_MINUTES};
pub use processor::PaymentProcessor;
pub use reconciliation::{ReconciliationSweep, SweepReport};
pub use validation::{InputValidator, OfflinePaymentRequest, OnlinePaymentRequest, ValidatedPayment};
pub use wallets::WalletService;
