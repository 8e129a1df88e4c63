//! Refreshing a single platform

use chrono::Utc;
use log::{debug, error, info, warn};

use super::SchedulerInner;
use crate::models::PlatformCacheSnapshot;
use crate::source::{fetch_isolated, normalize_all};

impl SchedulerInner {
    /// Fetch every category of the family concurrently and replace the snapshot.
    ///
    /// Failed categories are logged and contribute nothing. The snapshot is
    /// written even when some categories failed.
    pub(super) async fn refresh_one(&self, platform_id: &str) -> bool {
        let categories = self.source.categories(self.family);
        let total_categories = categories.len();
        debug!(
            "Refreshing {} ({} categories)",
            platform_id, total_categories
        );

        let results = fetch_isolated(
            categories,
            |category| self.source.fetch_category(platform_id, category),
            self.intervals.max_concurrent_fetches,
        )
        .await;

        let mut snapshot = PlatformCacheSnapshot::empty(platform_id, self.family);
        let mut failed_categories = 0;

        for (category, result) in results {
            match result {
                Ok(raws) => {
                    let entities = normalize_all(platform_id, category, raws);
                    debug!("{} {}: {} entities", platform_id, category, entities.len());
                    snapshot
                        .entities_by_type
                        .entry(category.entity_type)
                        .or_default()
                        .extend(entities);
                }
                Err(e) => {
                    failed_categories += 1;
                    warn!("Failed to fetch {} from {}: {}", category, platform_id, e);
                }
            }
        }

        let total_entities = snapshot.entity_count();
        let succeeded = total_entities > 0 && failed_categories < total_categories;

        snapshot.timestamp = Some(Utc::now());
        snapshot.last_refresh_succeeded = succeeded;

        if let Err(e) = self.store.save_snapshot(&snapshot).await {
            error!("Failed to save snapshot for {}: {}", platform_id, e);
            return false;
        }

        if succeeded {
            info!(
                "Refreshed {}: {} entities, {}/{} categories failed",
                platform_id, total_entities, failed_categories, total_categories
            );
        } else {
            warn!(
                "Refresh of {} unhealthy: {} entities, {}/{} categories failed",
                platform_id, total_entities, failed_categories, total_categories
            );
        }

        succeeded
    }
}
