//! Control surface over the per-family schedulers

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use super::{PlatformRegistry, RefreshIntervals, RefreshScheduler, SchedulerState};
use crate::cache::CacheStore;
use crate::models::PlatformFamily;
use crate::source::PlatformEntitySource;

/// Owns one [`RefreshScheduler`] per platform family.
pub struct RefreshService {
    schedulers: Vec<RefreshScheduler>,
}

/// Refresh state of every family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    pub families: Vec<SchedulerState>,
}

impl RefreshStatus {
    pub fn is_refreshing(&self, family: PlatformFamily) -> bool {
        self.families
            .iter()
            .any(|state| state.family == family && state.is_refreshing)
    }

    pub fn all_healthy(&self) -> bool {
        self.families.iter().all(|state| state.all_caches_healthy)
    }
}

impl RefreshService {
    pub fn new(
        source: Arc<dyn PlatformEntitySource>,
        store: Arc<dyn CacheStore>,
        registry: Arc<dyn PlatformRegistry>,
        intervals: RefreshIntervals,
    ) -> Self {
        let schedulers = PlatformFamily::ALL
            .iter()
            .map(|family| {
                RefreshScheduler::new(
                    *family,
                    source.clone(),
                    store.clone(),
                    registry.clone(),
                    intervals,
                )
            })
            .collect();

        Self { schedulers }
    }

    pub fn scheduler(&self, family: PlatformFamily) -> Option<&RefreshScheduler> {
        self.schedulers.iter().find(|s| s.family() == family)
    }

    /// Start every family's scheduler (each runs one pass immediately)
    pub async fn start(&self) {
        join_all(self.schedulers.iter().map(|s| s.start())).await;
    }

    pub fn stop(&self) {
        for scheduler in &self.schedulers {
            scheduler.stop();
        }
    }

    /// Refresh every platform of every family regardless of age
    pub async fn force_refresh_all(&self) -> bool {
        self.refresh_all(true, None).await
    }

    /// Run a pass for one family or all of them; true when every pass was healthy
    pub async fn refresh_all(&self, force: bool, family: Option<PlatformFamily>) -> bool {
        let passes = self
            .schedulers
            .iter()
            .filter(|s| family.is_none_or(|f| s.family() == f))
            .map(|s| s.check_and_refresh_all(force));

        join_all(passes).await.into_iter().all(|ok| ok)
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        RefreshStatus {
            families: self.schedulers.iter().map(RefreshScheduler::state).collect(),
        }
    }
}
