//! Per-platform rate limiting for entity fetches
//!
//! Implements reactive rate limiting that only activates after a platform
//! answers 429. Until then requests are sent without throttling.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;
use tokio::sync::RwLock;

/// Requests per second allowed once a platform has started throttling us
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Rate limiter state for a single platform.
pub struct PlatformRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    platform_id: String,
}

impl PlatformRateLimiter {
    /// Create a new limiter allowing `per_second` requests once active.
    pub fn new(platform_id: impl Into<String>, per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: RateLimiter::direct(quota),
            active: AtomicBool::new(false),
            platform_id: platform_id.into(),
        }
    }

    /// Activate rate limiting for this platform.
    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            debug!("Rate limiting activated for {}", self.platform_id);
        }
    }

    /// Check if rate limiting is active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for permission if rate limiting is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter {}", self.platform_id);
            self.limiter.until_ready().await;
        }
    }
}

/// Rate limiters for every configured platform.
pub struct RateLimiterSet {
    limiters: RwLock<HashMap<String, Arc<PlatformRateLimiter>>>,
    per_second: u32,
}

impl Default for RateLimiterSet {
    fn default() -> Self {
        Self::new(DEFAULT_REQUESTS_PER_SECOND)
    }
}

impl RateLimiterSet {
    pub fn new(per_second: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            per_second,
        }
    }

    /// Pre-create limiters for a set of `(platform_id, requests_per_second)` pairs.
    pub fn for_platforms<'a, I>(platforms: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let map = platforms
            .into_iter()
            .map(|(id, rate)| (id.to_string(), Arc::new(PlatformRateLimiter::new(id, rate))))
            .collect();

        Self {
            limiters: RwLock::new(map),
            per_second: DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    fn get(
        limiters: &HashMap<String, Arc<PlatformRateLimiter>>,
        platform_id: &str,
    ) -> Option<Arc<PlatformRateLimiter>> {
        limiters.get(platform_id).cloned()
    }

    /// Wait for rate limit permission for a platform (if active).
    ///
    /// The map lock is not held while waiting.
    pub async fn wait_for(&self, platform_id: &str) {
        let limiter = Self::get(&*self.limiters.read().await, platform_id);
        if let Some(limiter) = limiter {
            limiter.wait_if_active().await;
        }
    }

    /// Activate rate limiting for a platform (called on 429).
    pub async fn activate(&self, platform_id: &str) {
        let existing = Self::get(&*self.limiters.read().await, platform_id);
        if let Some(limiter) = existing {
            limiter.activate();
            return;
        }

        let mut limiters = self.limiters.write().await;
        limiters
            .entry(platform_id.to_string())
            .or_insert_with(|| Arc::new(PlatformRateLimiter::new(platform_id, self.per_second)))
            .activate();
    }

    /// Whether a platform is currently throttled.
    pub async fn is_active(&self, platform_id: &str) -> bool {
        let limiters = self.limiters.read().await;
        limiters
            .get(platform_id)
            .map(|limiter| limiter.is_active())
            .unwrap_or(false)
    }
}
