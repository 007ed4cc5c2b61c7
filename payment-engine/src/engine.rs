//! Payment engine
//!
//! Wires the ledger, services, processor, adjudication, sweep and gateway
//! over one repository and one set of observability collaborators.

use crate::{
    adjudication::AdjudicationWorkflow,
    config::Config,
    events::{EventSink, LogEventSink},
    gateway::PaymentGateway,
    metrics::PaymentMetrics,
    onboarding::AccountService,
    processor::PaymentProcessor,
    reconciliation::ReconciliationSweep,
    wallets::WalletService,
    Error, Result,
};
use security::RateLimiter;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use wallet_ledger::{CodePool, MemoryStore, Repository, WalletLedger};

/// Payment engine
#[derive(Debug)]
pub struct PaymentEngine {
    /// Configuration
    config: Config,

    /// Shared ledger
    ledger: Arc<WalletLedger>,

    /// Account, vendor and admin lifecycle
    accounts: AccountService,

    /// Top-ups and transfers
    wallets: WalletService,

    /// Payment execution
    processor: Arc<PaymentProcessor>,

    /// Flagged payment review
    adjudication: AdjudicationWorkflow,

    /// Deferred settlement
    sweep: Arc<ReconciliationSweep>,

    /// Rate-limited entry point
    gateway: PaymentGateway,

    /// Metrics
    metrics: PaymentMetrics,
}

/// Running reconciliation task
#[derive(Debug)]
pub struct SweepHandle {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl SweepHandle {
    /// Signal the sweep to stop and wait for it
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task already exited
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| Error::Config(format!("reconciliation task failed: {}", e)))
    }
}

impl PaymentEngine {
    /// Engine over an in-memory store, logging events through tracing
    pub fn new(config: Config) -> Result<Self> {
        Self::with_collaborators(config, Arc::new(MemoryStore::new()), Arc::new(LogEventSink))
    }

    /// Engine over an injected repository and event sink
    pub fn with_collaborators(
        config: Config,
        repository: Arc<dyn Repository>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = PaymentMetrics::new()
            .map_err(|e| Error::Config(format!("metrics registry: {}", e)))?;
        let ledger = Arc::new(WalletLedger::new(repository));
        let codes = CodePool::new();

        let accounts = AccountService::new(ledger.clone(), codes)?;
        let wallets = WalletService::new(ledger.clone(), codes);
        let processor = Arc::new(PaymentProcessor::new(
            ledger.clone(),
            codes,
            events.clone(),
            metrics.clone(),
        ));
        let adjudication = AdjudicationWorkflow::new(ledger.clone(), events);
        let sweep = Arc::new(ReconciliationSweep::new(ledger.clone(), metrics.clone()));
        let gateway = PaymentGateway::new(
            Arc::new(RateLimiter::new(config.rate_limiter)),
            processor.clone(),
        );

        info!(
            service = %config.service_name,
            version = %config.service_version,
            "Payment engine initialised"
        );

        Ok(Self {
            config,
            ledger,
            accounts,
            wallets,
            processor,
            adjudication,
            sweep,
            gateway,
            metrics,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared ledger
    pub fn ledger(&self) -> &Arc<WalletLedger> {
        &self.ledger
    }

    /// Account, vendor and admin lifecycle
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    /// Wallet operations
    pub fn wallets(&self) -> &WalletService {
        &self.wallets
    }

    /// Payment execution without admission control
    pub fn processor(&self) -> &PaymentProcessor {
        &self.processor
    }

    /// Flagged payment review
    pub fn adjudication(&self) -> &AdjudicationWorkflow {
        &self.adjudication
    }

    /// Deferred settlement sweep
    pub fn sweep(&self) -> &Arc<ReconciliationSweep> {
        &self.sweep
    }

    /// Rate-limited entry point
    pub fn gateway(&self) -> &PaymentGateway {
        &self.gateway
    }

    /// Metrics
    pub fn metrics(&self) -> &PaymentMetrics {
        &self.metrics
    }

    /// Spawn the reconciliation sweep if enabled
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_reconciliation(&self) -> Option<SweepHandle> {
        if !self.config.reconciliation.enabled {
            info!("Reconciliation sweep disabled");
            return None;
        }
        let (handle, shutdown) = self
            .sweep
            .clone()
            .spawn(self.config.reconciliation.interval());
        Some(SweepHandle { handle, shutdown })
    }
}
