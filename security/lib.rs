//! Security Module for GeoPay
//!
//! Admission control applied before any payment reaches the ledger.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Security Layer                      │
//! ├─────────────────────────────────────────────────────┤
//! │  Rate Limiter (per user id, per client IP)          │
//! └─────────────────────────────────────────────────────┘
//!                          ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Payment Engine                          │
//! │  Gateway │ Processor │ Adjudication │ Sweep         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rate Limiting (`rate_limiter`)
//! - Token bucket per identity, refilled in whole intervals
//! - Independent user and IP tiers
//! - Buckets created lazily in a concurrent map, never persisted
//!
//! # Usage
//!
//! ```rust
//! use security::rate_limiter::{RateLimiter, RateLimiterConfig, RateLimitResult};
//! use std::net::IpAddr;
//!
//! let limiter = RateLimiter::new(RateLimiterConfig::default());
//!
//! let ip: IpAddr = "192.168.1.1".parse().unwrap();
//! match limiter.check_ip(ip) {
//!     RateLimitResult::Allowed => {
//!         // Process request
//!     }
//!     RateLimitResult::Denied { retry_after } => {
//!         // Return 429 Too Many Requests
//!         let _ = retry_after;
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod rate_limiter;

// Re-exports for convenience
pub use rate_limiter::{
    BucketConfig, BucketStore, Clock, ConfigError, ManualClock, MemoryBucketStore,
    RateLimitResult, RateLimiter, RateLimiterConfig, SystemClock, TokenBucket,
};
