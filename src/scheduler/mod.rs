//! Background cache refresh
//!
//! One [`RefreshScheduler`] exists per [`PlatformFamily`]. A scheduler runs a
//! refresh pass over every configured platform of its family, then re-arms a
//! timer: the long interval after a fully healthy pass, the short interval
//! otherwise. Only one pass per scheduler is ever in flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::models::PlatformFamily;
use crate::source::PlatformEntitySource;

mod refresh;
pub mod service;

pub use service::{RefreshService, RefreshStatus};

/// Supplies the platform ids configured for a family.
pub trait PlatformRegistry: Send + Sync {
    fn configured_platforms(&self, family: PlatformFamily) -> Vec<String>;
}

/// Fixed platform list, for embedding without a config file
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    platforms: BTreeMap<PlatformFamily, Vec<String>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platform(mut self, family: PlatformFamily, platform_id: &str) -> Self {
        self.platforms
            .entry(family)
            .or_default()
            .push(platform_id.to_string());
        self
    }
}

impl PlatformRegistry for StaticRegistry {
    fn configured_platforms(&self, family: PlatformFamily) -> Vec<String> {
        self.platforms.get(&family).cloned().unwrap_or_default()
    }
}

/// Timing knobs for a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshIntervals {
    /// Next pass delay after a fully healthy pass
    pub long: Duration,
    /// Next pass delay after any failure
    pub short: Duration,
    /// Upper bound a forced refresh waits for an in-flight pass
    pub force_wait: Duration,
    /// Concurrent category fetches per platform
    pub max_concurrent_fetches: usize,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            long: Duration::from_secs(30 * 60),
            short: Duration::from_secs(5 * 60),
            force_wait: Duration::from_secs(30),
            max_concurrent_fetches: 8,
        }
    }
}

impl RefreshIntervals {
    pub fn for_health(&self, healthy: bool) -> Duration {
        if healthy { self.long } else { self.short }
    }
}

/// Point-in-time view of one scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub family: PlatformFamily,
    pub is_refreshing: bool,
    pub all_caches_healthy: bool,
    pub timer_armed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_interval_secs: Option<u64>,
}

#[derive(Default)]
struct TimerSlot {
    handle: Option<JoinHandle<()>>,
    interval: Option<Duration>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.interval = None;
    }
}

struct SchedulerInner {
    family: PlatformFamily,
    source: Arc<dyn PlatformEntitySource>,
    store: Arc<dyn CacheStore>,
    registry: Arc<dyn PlatformRegistry>,
    intervals: RefreshIntervals,
    refreshing: watch::Sender<bool>,
    healthy: AtomicBool,
    timer: Mutex<TimerSlot>,
}

/// Clears the in-flight flag when the pass that set it ends, however it ends.
struct PassGuard<'a> {
    refreshing: &'a watch::Sender<bool>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.refreshing.send_replace(false);
    }
}

impl SchedulerInner {
    fn try_begin(&self) -> Option<PassGuard<'_>> {
        let acquired = self.refreshing.send_if_modified(|refreshing| {
            if *refreshing {
                false
            } else {
                *refreshing = true;
                true
            }
        });

        acquired.then_some(PassGuard {
            refreshing: &self.refreshing,
        })
    }

    fn is_refreshing(&self) -> bool {
        *self.refreshing.borrow()
    }

    /// Wait (bounded) for the in-flight pass to end and take the guard.
    ///
    /// Returns `None` when the bound expires with a pass still running.
    async fn wait_and_begin(&self) -> Option<PassGuard<'_>> {
        let deadline = tokio::time::Instant::now() + self.intervals.force_wait;
        let mut rx = self.refreshing.subscribe();

        loop {
            if let Some(guard) = self.try_begin() {
                return Some(guard);
            }

            let idle = tokio::time::timeout_at(deadline, rx.wait_for(|refreshing| !*refreshing))
                .await
                .map(|result| result.is_ok())
                .unwrap_or(false);

            if !idle && tokio::time::Instant::now() >= deadline {
                return None;
            }
        }
    }

    async fn check_and_refresh_all(self: &Arc<Self>, force: bool) -> bool {
        let guard = match self.try_begin() {
            Some(guard) => Some(guard),
            None if !force => {
                debug!("{} refresh already running, skipping", self.family);
                return self.healthy.load(Ordering::SeqCst);
            }
            None => {
                debug!("{} refresh running, waiting before forced pass", self.family);
                let guard = self.wait_and_begin().await;
                if guard.is_none() {
                    warn!(
                        "{} refresh still running after {:?}, forcing a pass anyway",
                        self.family, self.intervals.force_wait
                    );
                }
                guard
            }
        };

        let all_ok = self.run_pass(force).await;
        drop(guard);

        let was_healthy = self.healthy.swap(all_ok, Ordering::SeqCst);
        if all_ok && !was_healthy {
            info!("{} caches healthy again", self.family);
            self.rearm_if_armed(self.intervals.long);
        }

        all_ok
    }

    async fn run_pass(&self, force: bool) -> bool {
        let platforms = self.registry.configured_platforms(self.family);
        if platforms.is_empty() {
            debug!("No {} platforms configured", self.family);
            return true;
        }

        let mut refreshed = 0;
        let mut failed = 0;
        for platform_id in &platforms {
            if !force && !self.store.should_refresh(platform_id).await {
                debug!("{} is fresh, skipping", platform_id);
                continue;
            }

            refreshed += 1;
            if !self.refresh_one(platform_id).await {
                failed += 1;
            }
        }

        info!(
            "{} pass: {} platforms, {} refreshed, {} failed",
            self.family,
            platforms.len(),
            refreshed,
            failed
        );

        failed == 0
    }

    fn rearm_if_armed(self: &Arc<Self>, interval: Duration) {
        let armed = self
            .timer
            .lock()
            .map(|slot| slot.handle.is_some())
            .unwrap_or(false);
        if armed {
            self.arm(interval);
        }
    }

    /// Cancel any pending timer and arm a new one.
    fn arm(self: &Arc<Self>, interval: Duration) {
        let Ok(mut slot) = self.timer.lock() else {
            warn!("{} timer lock poisoned, not rescheduling", self.family);
            return;
        };

        slot.cancel();
        debug!("{} next refresh in {:?}", self.family, interval);
        slot.handle = Some(tokio::spawn(timer_loop(Arc::downgrade(self), interval)));
        slot.interval = Some(interval);
    }

    fn set_next_interval(&self, interval: Duration) {
        if let Ok(mut slot) = self.timer.lock() {
            slot.interval = Some(interval);
        }
    }
}

async fn timer_loop(inner: Weak<SchedulerInner>, mut interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let Some(scheduler) = inner.upgrade() else {
            return;
        };

        // The pass gets its own task so cancelling the timer never cuts it short
        let pass = tokio::spawn(async move { scheduler.check_and_refresh_all(false).await });
        if pass.await.is_err() {
            warn!("Scheduled refresh pass panicked");
        }

        let Some(scheduler) = inner.upgrade() else {
            return;
        };
        interval = scheduler
            .intervals
            .for_health(scheduler.healthy.load(Ordering::SeqCst));
        scheduler.set_next_interval(interval);
        debug!("{} next refresh in {:?}", scheduler.family, interval);
    }
}

/// Keeps one platform family's snapshots fresh.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new(
        family: PlatformFamily,
        source: Arc<dyn PlatformEntitySource>,
        store: Arc<dyn CacheStore>,
        registry: Arc<dyn PlatformRegistry>,
        intervals: RefreshIntervals,
    ) -> Self {
        let (refreshing, _) = watch::channel(false);

        Self {
            inner: Arc::new(SchedulerInner {
                family,
                source,
                store,
                registry,
                intervals,
                refreshing,
                healthy: AtomicBool::new(true),
                timer: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    pub fn family(&self) -> PlatformFamily {
        self.inner.family
    }

    /// Cancel any timer, run one pass now, then arm the timer.
    ///
    /// Calling this on a running scheduler restarts it.
    pub async fn start(&self) {
        self.stop();
        info!("Starting {} refresh scheduler", self.inner.family);

        let healthy = self.inner.check_and_refresh_all(false).await;
        self.inner.arm(self.inner.intervals.for_health(healthy));
    }

    /// Cancel the timer. A pass already in progress runs to completion.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.inner.timer.lock()
            && slot.handle.is_some()
        {
            debug!("Stopping {} refresh scheduler", self.inner.family);
            slot.cancel();
        }
    }

    /// Refresh every platform that is due (or every platform when `force`).
    ///
    /// Returns true only if every refreshed platform succeeded.
    pub async fn check_and_refresh_all(&self, force: bool) -> bool {
        self.inner.check_and_refresh_all(force).await
    }

    /// Refresh one platform regardless of age. Never fails; returns the verdict.
    pub async fn refresh_one(&self, platform_id: &str) -> bool {
        self.inner.refresh_one(platform_id).await
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.is_refreshing()
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.healthy.load(Ordering::SeqCst)
    }

    /// Delay before the next scheduled pass, `None` when stopped
    pub fn current_interval(&self) -> Option<Duration> {
        self.inner.timer.lock().ok().and_then(|slot| slot.interval)
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .map(|slot| slot.handle.is_some())
            .unwrap_or(false)
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            family: self.inner.family,
            is_refreshing: self.is_refreshing(),
            all_caches_healthy: self.is_healthy(),
            timer_armed: self.is_running(),
            next_interval_secs: self.current_interval().map(|d| d.as_secs()),
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
