//! Admission control in front of the processor
//!
//! Each submission spends one token from the client IP bucket, then one
//! from the payer bucket. A denied submission never reaches the ledger.

use crate::processor::PaymentProcessor;
use crate::validation::{OfflinePaymentRequest, OnlinePaymentRequest};
use crate::{Error, Result};
use security::{RateLimitResult, RateLimiter};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;
use wallet_ledger::Transaction;

/// Rate-limited entry point for payment submissions
#[derive(Debug)]
pub struct PaymentGateway {
    rate_limiter: Arc<RateLimiter>,
    processor: Arc<PaymentProcessor>,
}

impl PaymentGateway {
    /// Create new gateway
    pub fn new(rate_limiter: Arc<RateLimiter>, processor: Arc<PaymentProcessor>) -> Self {
        Self {
            rate_limiter,
            processor,
        }
    }

    /// Limiter shared by every submission
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Admit, then run an online payment
    pub fn submit_online(
        &self,
        client_ip: IpAddr,
        request: &OnlinePaymentRequest,
    ) -> Result<Transaction> {
        self.admit(client_ip, &request.payer_id)?;
        self.processor.pay_online(request)
    }

    /// Admit, then run an offline payment
    pub fn submit_offline(
        &self,
        client_ip: IpAddr,
        request: &OfflinePaymentRequest,
    ) -> Result<Transaction> {
        self.admit(client_ip, &request.payer_id)?;
        self.processor.pay_offline(request)
    }

    fn admit(&self, client_ip: IpAddr, payer_id: &str) -> Result<()> {
        if let RateLimitResult::Denied { retry_after } = self.rate_limiter.check_ip(client_ip) {
            debug!(%client_ip, "Submission refused at IP tier");
            return Err(Error::RateLimited { retry_after });
        }

        if let RateLimitResult::Denied { retry_after } =
            self.rate_limiter.check_user(payer_id.trim())
        {
            debug!(payer = payer_id, "Submission refused at user tier");
            return Err(Error::RateLimited { retry_after });
        }

        Ok(())
    }
}
