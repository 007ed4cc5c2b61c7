//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring payments.
//!
//! # Metrics
//!
//! - `payments_online_total` - Online payments attempted past validation
//! - `payments_offline_total` - Offline payments attempted past validation
//! - `payments_failed_total` - Payments rejected after validation
//! - `payments_flagged_total` - Payments flagged for adjudication
//! - `fraud_detection_total` - Geofence violations
//! - `payment_processing_duration_seconds` - Histogram of processing latencies
//! - `reconciliation_settled_total` - Pending entries settled by the sweep
//! - `reconciliation_failed_total` - Pending entries failed by the sweep

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use wallet_ledger::PaymentMode;

/// Metrics collector
///
/// Each collector owns its registry, so several engines can live in one
/// process.
#[derive(Clone)]
pub struct PaymentMetrics {
    /// Online payments
    pub online_total: IntCounter,

    /// Offline payments
    pub offline_total: IntCounter,

    /// Failed payments
    pub failed_total: IntCounter,

    /// Flagged payments
    pub flagged_total: IntCounter,

    /// Geofence violations
    pub fraud_total: IntCounter,

    /// Processing duration histogram
    pub processing_duration: Histogram,

    /// Sweep settlements
    pub reconciliation_settled: IntCounter,

    /// Sweep failures
    pub reconciliation_failed: IntCounter,

    /// Prometheus registry
    registry: Arc<Registry>,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl PaymentMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let online_total = counter(&registry, "payments_online_total", "Total online payments")?;
        let offline_total = counter(&registry, "payments_offline_total", "Total offline payments")?;
        let failed_total = counter(&registry, "payments_failed_total", "Total failed payments")?;
        let flagged_total = counter(&registry, "payments_flagged_total", "Total flagged payments")?;
        let fraud_total = counter(&registry, "fraud_detection_total", "Total geofence violations")?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "payment_processing_duration_seconds",
                "Histogram of payment processing latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let reconciliation_settled = counter(
            &registry,
            "reconciliation_settled_total",
            "Pending transactions settled by the sweep",
        )?;
        let reconciliation_failed = counter(
            &registry,
            "reconciliation_failed_total",
            "Pending transactions failed by the sweep",
        )?;

        Ok(Self {
            online_total,
            offline_total,
            failed_total,
            flagged_total,
            fraud_total,
            processing_duration,
            reconciliation_settled,
            reconciliation_failed,
            registry,
        })
    }

    /// Record a payment attempt
    pub fn record_attempt(&self, mode: PaymentMode) {
        match mode {
            PaymentMode::Online => self.online_total.inc(),
            PaymentMode::Offline => self.offline_total.inc(),
        }
    }

    /// Record a failed payment
    pub fn record_failure(&self) {
        self.failed_total.inc();
    }

    /// Record a flagged payment
    pub fn record_flagged(&self) {
        self.flagged_total.inc();
        self.fraud_total.inc();
    }

    /// Record processing duration
    pub fn record_duration(&self, elapsed: Duration) {
        self.processing_duration.observe(elapsed.as_secs_f64());
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every metric
    pub fn gather_text(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for PaymentMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentMetrics")
            .field("online_total", &self.online_total.get())
            .field("offline_total", &self.offline_total.get())
            .field("failed_total", &self.failed_total.get())
            .field("flagged_total", &self.flagged_total.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_independent_registries() {
        let a = PaymentMetrics::new().unwrap();
        let b = PaymentMetrics::new().unwrap();

        a.record_attempt(PaymentMode::Online);
        a.record_flagged();

        assert_eq!(a.online_total.get(), 1);
        assert_eq!(a.flagged_total.get(), 1);
        assert_eq!(a.fraud_total.get(), 1);
        assert_eq!(b.online_total.get(), 0);
    }

    #[test]
    fn test_text_exposition() {
        let metrics = PaymentMetrics::new().unwrap();
        metrics.record_attempt(PaymentMode::Offline);
        metrics.record_duration(Duration::from_millis(3));

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("payments_offline_total 1"));
        assert!(text.contains("payment_processing_duration_seconds_count 1"));
    }
}
