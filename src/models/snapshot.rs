//! Per-platform cache snapshot

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{CachedEntity, EntityType, PlatformFamily};

/// The complete, atomically replaced set of cached entities for one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformCacheSnapshot {
    pub platform_id: String,

    pub family: PlatformFamily,

    #[serde(default)]
    pub entities_by_type: BTreeMap<EntityType, Vec<CachedEntity>>,

    /// When the snapshot was written; `None` until the first refresh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_refresh_succeeded: bool,
}

impl PlatformCacheSnapshot {
    /// Snapshot of a platform that has been configured but never populated.
    pub fn empty(platform_id: impl Into<String>, family: PlatformFamily) -> Self {
        Self {
            platform_id: platform_id.into(),
            family,
            entities_by_type: BTreeMap::new(),
            timestamp: None,
            last_refresh_succeeded: false,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities_by_type.values().map(Vec::len).sum()
    }

    pub fn entities(&self) -> impl Iterator<Item = &CachedEntity> {
        self.entities_by_type.values().flatten()
    }

    /// Age of the snapshot at `now`, `None` when never populated.
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timestamp
            .map(|ts| (now - ts).to_std().unwrap_or(Duration::ZERO))
    }

    /// Whether a refresh is due: never populated, last refresh failed, or older than `threshold`.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        if !self.last_refresh_succeeded {
            return true;
        }
        match self.age_at(now) {
            None => true,
            Some(age) => age > threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated(age_secs: i64, succeeded: bool) -> PlatformCacheSnapshot {
        let mut snapshot = PlatformCacheSnapshot::empty("p1", PlatformFamily::Cti);
        snapshot.entities_by_type.insert(
            EntityType::Malware,
            vec![CachedEntity::new("m1", "Emotet", EntityType::Malware, "p1")],
        );
        snapshot.timestamp = Some(Utc::now() - chrono::Duration::seconds(age_secs));
        snapshot.last_refresh_succeeded = succeeded;
        snapshot
    }

    #[test]
    fn test_empty_snapshot_is_stale() {
        let snapshot = PlatformCacheSnapshot::empty("p1", PlatformFamily::Simulation);
        assert_eq!(snapshot.entity_count(), 0);
        assert!(snapshot.is_stale(Duration::from_secs(3600), Utc::now()));
    }

    #[test]
    fn test_fresh_snapshot_is_not_stale() {
        let snapshot = populated(10, true);
        assert_eq!(snapshot.entity_count(), 1);
        assert!(!snapshot.is_stale(Duration::from_secs(60), Utc::now()));
    }

    #[test]
    fn test_old_snapshot_is_stale() {
        let snapshot = populated(120, true);
        assert!(snapshot.is_stale(Duration::from_secs(60), Utc::now()));
    }

    #[test]
    fn test_failed_snapshot_is_always_stale() {
        let snapshot = populated(1, false);
        assert!(snapshot.is_stale(Duration::from_secs(3600), Utc::now()));
    }
}
