//! Rate Limiting
//!
//! Implements token bucket admission control for:
//! - Per-user rate limiting
//! - Per-IP rate limiting
//!
//! Buckets refill in whole intervals: after each full `refill_interval`
//! since the last refill, `refill_tokens` are added up to `capacity`.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Invalid limiter configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Bucket with no room for a single request
    #[error("{tier} bucket capacity must be positive")]
    ZeroCapacity {
        /// Which tier
        tier: &'static str,
    },

    /// Refill that never happens or adds nothing
    #[error("{tier} bucket must refill a positive amount over a positive interval")]
    NoRefill {
        /// Which tier
        tier: &'static str,
    },
}

/// Sizing of one bucket tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum tokens (burst size)
    pub capacity: u32,

    /// Tokens added per elapsed interval
    pub refill_tokens: u32,

    /// Refill interval in seconds
    pub refill_interval_secs: u64,
}

impl BucketConfig {
    /// Refill interval as a duration
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_interval_secs)
    }

    fn validate(&self, tier: &'static str) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity { tier });
        }
        if self.refill_tokens == 0 || self.refill_interval_secs == 0 {
            return Err(ConfigError::NoRefill { tier });
        }
        Ok(())
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Per-user tier
    pub user: BucketConfig,

    /// Per-IP tier
    pub ip: BucketConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            user: BucketConfig {
                capacity: 10,
                refill_tokens: 10,
                refill_interval_secs: 60,
            },
            ip: BucketConfig {
                capacity: 100,
                refill_tokens: 100,
                refill_interval_secs: 60,
            },
        }
    }
}

impl RateLimiterConfig {
    /// Reject configurations that would deny forever
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.user.validate("user")?;
        self.ip.validate("ip")
    }
}

/// Rate limiter result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request allowed
    Allowed,

    /// Request denied (rate limit exceeded)
    Denied {
        /// Time until the next refill
        retry_after: Duration,
    },
}

impl RateLimitResult {
    /// Whether the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// Time source
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Clock frozen at the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

/// Token bucket with interval refill
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u32,
    capacity: u32,
    refill_tokens: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    /// Full bucket
    pub fn new(config: &BucketConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity,
            capacity: config.capacity,
            refill_tokens: config.refill_tokens,
            refill_interval: config.refill_interval(),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if self.refill_interval.is_zero() || elapsed < self.refill_interval {
            return;
        }
        let interval = self.refill_interval.as_nanos();
        let periods = elapsed.as_nanos() / interval;
        let added = periods.saturating_mul(self.refill_tokens as u128);
        self.tokens = (self.tokens as u128 + added).min(self.capacity as u128) as u32;
        // Keep the phase of the interval grid
        let remainder = (elapsed.as_nanos() % interval) as u64;
        self.last_refill = now - Duration::from_nanos(remainder);
    }

    /// Take one token if available
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`
    pub fn available(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    /// Time until the next refill
    pub fn time_until_refill(&self, now: Instant) -> Duration {
        let next = self.last_refill + self.refill_interval;
        next.saturating_duration_since(now)
    }
}

/// Concurrent per-identity bucket storage
pub trait BucketStore<K>: Send + Sync + fmt::Debug {
    /// Bucket for `key`, created with `make` on first sight
    fn get_or_insert(&self, key: &K, make: &dyn Fn() -> TokenBucket) -> Arc<Mutex<TokenBucket>>;

    /// Bucket for `key` if one exists
    fn get(&self, key: &K) -> Option<Arc<Mutex<TokenBucket>>>;

    /// Number of tracked identities
    fn len(&self) -> usize;

    /// Whether no identity is tracked
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime bucket map
#[derive(Debug)]
pub struct MemoryBucketStore<K: Eq + Hash> {
    buckets: DashMap<K, Arc<Mutex<TokenBucket>>>,
}

impl<K: Eq + Hash> MemoryBucketStore<K> {
    /// Empty store
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash> Default for MemoryBucketStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> BucketStore<K> for MemoryBucketStore<K>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug,
{
    fn get_or_insert(&self, key: &K, make: &dyn Fn() -> TokenBucket) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.value().clone();
        }
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(make())))
            .value()
            .clone()
    }

    fn get(&self, key: &K) -> Option<Arc<Mutex<TokenBucket>>> {
        self.buckets.get(key).map(|b| b.value().clone())
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

/// Two-tier rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Configuration
    config: RateLimiterConfig,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Per-user buckets
    users: Arc<dyn BucketStore<String>>,

    /// Per-IP buckets
    ips: Arc<dyn BucketStore<IpAddr>>,
}

impl RateLimiter {
    /// Create new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Rate limiter over an explicit clock
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_stores(
            config,
            clock,
            Arc::new(MemoryBucketStore::new()),
            Arc::new(MemoryBucketStore::new()),
        )
    }

    /// Rate limiter over injected bucket stores
    pub fn with_stores(
        config: RateLimiterConfig,
        clock: Arc<dyn Clock>,
        users: Arc<dyn BucketStore<String>>,
        ips: Arc<dyn BucketStore<IpAddr>>,
    ) -> Self {
        Self {
            config,
            clock,
            users,
            ips,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn admit(
        &self,
        bucket: Arc<Mutex<TokenBucket>>,
        tier: &'static str,
        identity: &dyn fmt::Display,
    ) -> RateLimitResult {
        let now = self.clock.now();
        let mut bucket = bucket.lock();
        if bucket.try_consume(now) {
            debug!(tier, identity = %identity, "Request admitted");
            RateLimitResult::Allowed
        } else {
            let retry_after = bucket.time_until_refill(now);
            warn!(tier, identity = %identity, ?retry_after, "Rate limit exceeded");
            RateLimitResult::Denied { retry_after }
        }
    }

    /// Check user rate limit
    pub fn check_user(&self, user_id: &str) -> RateLimitResult {
        let config = self.config.user;
        let now = self.clock.now();
        let bucket = self
            .users
            .get_or_insert(&user_id.to_string(), &|| TokenBucket::new(&config, now));
        self.admit(bucket, "user", &user_id)
    }

    /// Check IP rate limit
    pub fn check_ip(&self, ip: IpAddr) -> RateLimitResult {
        let config = self.config.ip;
        let now = self.clock.now();
        let bucket = self.ips.get_or_insert(&ip, &|| TokenBucket::new(&config, now));
        self.admit(bucket, "ip", &ip)
    }

    /// Boolean form of [`RateLimiter::check_user`]
    pub fn is_allowed_for_user(&self, user_id: &str) -> bool {
        self.check_user(user_id).is_allowed()
    }

    /// Boolean form of [`RateLimiter::check_ip`]
    pub fn is_allowed_for_ip(&self, ip: IpAddr) -> bool {
        self.check_ip(ip).is_allowed()
    }

    /// Remaining tokens for a user (full capacity if never seen)
    pub fn available_tokens_for_user(&self, user_id: &str) -> u32 {
        match self.users.get(&user_id.to_string()) {
            Some(bucket) => bucket.lock().available(self.clock.now()),
            None => self.config.user.capacity,
        }
    }

    /// Remaining tokens for an IP (full capacity if never seen)
    pub fn available_tokens_for_ip(&self, ip: IpAddr) -> u32 {
        match self.ips.get(&ip) {
            Some(bucket) => bucket.lock().available(self.clock.now()),
            None => self.config.ip.capacity,
        }
    }

    /// Number of (users, IPs) with a bucket
    pub fn tracked_identities(&self) -> (usize, usize) {
        (self.users.len(), self.ips.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn limiter() -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(RateLimiterConfig::default(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_token_bucket() {
        let config = BucketConfig {
            capacity: 3,
            refill_tokens: 2,
            refill_interval_secs: 10,
        };
        let start = Instant::now();
        let mut bucket = TokenBucket::new(&config, start);

        assert!(bucket.try_consume(start));
        assert!(bucket.try_consume(start));
        assert!(bucket.try_consume(start));
        assert!(!bucket.try_consume(start));
        assert_eq!(bucket.time_until_refill(start), Duration::from_secs(10));

        // Partial interval adds nothing
        assert!(!bucket.try_consume(start + Duration::from_secs(9)));

        // One interval adds refill_tokens
        assert_eq!(bucket.available(start + Duration::from_secs(10)), 2);

        // Many intervals cap at capacity
        assert_eq!(bucket.available(start + Duration::from_secs(100)), 3);
    }

    #[test]
    fn test_user_saturation_and_refill() {
        let (limiter, clock) = limiter();

        for _ in 0..10 {
            assert_eq!(limiter.check_user("alice"), RateLimitResult::Allowed);
        }
        let denied = limiter.check_user("alice");
        assert!(matches!(denied, RateLimitResult::Denied { .. }));
        assert_eq!(limiter.available_tokens_for_user("alice"), 0);

        clock.advance(Duration::from_secs(59));
        assert!(!limiter.is_allowed_for_user("alice"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(limiter.available_tokens_for_user("alice"), 10);
        assert!(limiter.is_allowed_for_user("alice"));
    }

    #[test]
    fn test_identities_are_independent() {
        let (limiter, _) = limiter();

        for _ in 0..10 {
            assert!(limiter.is_allowed_for_user("alice"));
        }
        assert!(!limiter.is_allowed_for_user("alice"));
        assert!(limiter.is_allowed_for_user("bob"));
        assert_eq!(limiter.tracked_identities(), (2, 0));
    }

    #[test]
    fn test_ip_tier() {
        let (limiter, _) = limiter();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        for _ in 0..100 {
            assert!(limiter.is_allowed_for_ip(ip));
        }
        assert!(!limiter.is_allowed_for_ip(ip));

        let other: IpAddr = "::1".parse().unwrap();
        assert_eq!(limiter.available_tokens_for_ip(other), 100);
    }

    #[test]
    fn test_unseen_user_reports_capacity() {
        let (limiter, _) = limiter();
        assert_eq!(limiter.available_tokens_for_user("ghost"), 10);
        assert_eq!(limiter.tracked_identities(), (0, 0));
    }

    #[test]
    fn test_concurrent_first_requests_share_bucket() {
        let (limiter, _) = limiter();
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.is_allowed_for_user("carol"))
            })
            .collect();
        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimiterConfig::default().validate().is_ok());

        let mut config = RateLimiterConfig::default();
        config.user.capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity { tier: "user" }));

        let mut config = RateLimiterConfig::default();
        config.ip.refill_interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoRefill { tier: "ip" }));
    }

    #[test]
    fn test_config_serde() {
        let json = serde_json::to_string(&RateLimiterConfig::default()).unwrap();
        let parsed: RateLimiterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, RateLimiterConfig::default());
    }
}
