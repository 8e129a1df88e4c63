//! The snapshot persistence boundary and its implementations

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::CacheTtl;
use super::storage::{CacheStats, CacheStorage, SnapshotMeta};
use crate::error::CacheError;
use crate::models::PlatformCacheSnapshot;

type Result<T> = std::result::Result<T, CacheError>;

/// Persistence for per-platform snapshots.
///
/// Every write replaces the whole snapshot; readers never observe a partial
/// write. Implementations must be durable and atomic per call.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the current snapshot for a platform
    async fn load_snapshot(&self, platform_id: &str) -> Result<Option<PlatformCacheSnapshot>>;

    /// Replace the snapshot for `snapshot.platform_id`
    async fn save_snapshot(&self, snapshot: &PlatformCacheSnapshot) -> Result<()>;

    /// Remove a platform's snapshot (platform removed or cache cleared)
    async fn delete_snapshot(&self, platform_id: &str) -> Result<bool>;

    /// Every stored snapshot, ordered by platform id
    async fn list_snapshots(&self) -> Result<Vec<PlatformCacheSnapshot>>;

    /// Remove every snapshot, returning how many were removed
    async fn clear_all(&self) -> Result<usize>;

    /// Maximum snapshot age before a refresh is due
    fn refresh_threshold(&self) -> Duration;

    /// Whether a platform needs refreshing: never populated, last refresh
    /// failed, or older than [`refresh_threshold`](Self::refresh_threshold).
    ///
    /// A snapshot that cannot be read counts as due.
    async fn should_refresh(&self, platform_id: &str) -> bool {
        match self.load_snapshot(platform_id).await {
            Ok(Some(snapshot)) => snapshot.is_stale(self.refresh_threshold(), Utc::now()),
            Ok(None) => true,
            Err(e) => {
                log::warn!("Could not read snapshot for {}: {}", platform_id, e);
                true
            }
        }
    }
}

/// SQLite-backed [`CacheStore`].
///
/// The storage is wrapped in a Mutex; every call is a short synchronous
/// SQLite operation that never spans an await point.
pub struct SqliteCacheStore {
    storage: Mutex<CacheStorage>,
    refresh_threshold: Duration,
}

impl SqliteCacheStore {
    /// Open the store at the default cache location
    pub fn open() -> Result<Self> {
        Ok(Self::from_storage(CacheStorage::open()?))
    }

    /// Open the store at a specific directory
    pub fn open_at(dir: &Path) -> Result<Self> {
        Ok(Self::from_storage(CacheStorage::open_at(dir)?))
    }

    fn from_storage(storage: CacheStorage) -> Self {
        Self {
            storage: Mutex::new(storage),
            refresh_threshold: CacheTtl::REFRESH_THRESHOLD,
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.with_storage(|s| s.stats())
    }

    pub fn list_meta(&self) -> Result<Vec<SnapshotMeta>> {
        self.with_storage(|s| s.list_meta())
    }

    fn with_storage<T>(&self, f: impl FnOnce(&CacheStorage) -> Result<T>) -> Result<T> {
        let guard = self
            .storage
            .lock()
            .map_err(|_| CacheError::Io("Cache storage lock poisoned".to_string()))?;
        f(&guard)
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn load_snapshot(&self, platform_id: &str) -> Result<Option<PlatformCacheSnapshot>> {
        self.with_storage(|s| s.get(platform_id))
    }

    async fn save_snapshot(&self, snapshot: &PlatformCacheSnapshot) -> Result<()> {
        self.with_storage(|s| s.put(snapshot))
    }

    async fn delete_snapshot(&self, platform_id: &str) -> Result<bool> {
        self.with_storage(|s| s.delete(platform_id))
    }

    async fn list_snapshots(&self) -> Result<Vec<PlatformCacheSnapshot>> {
        self.with_storage(|s| s.list())
    }

    async fn clear_all(&self) -> Result<usize> {
        self.with_storage(|s| s.clear_all().map(|stats| stats.entries_removed))
    }

    fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }
}

/// Process-local [`CacheStore`]
pub struct MemoryCacheStore {
    snapshots: RwLock<BTreeMap<String, PlatformCacheSnapshot>>,
    refresh_threshold: Duration,
    fail_saves: AtomicBool,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(BTreeMap::new()),
            refresh_threshold: CacheTtl::REFRESH_THRESHOLD,
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Make every subsequent save fail (simulates a persistence outage)
    #[cfg(test)]
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load_snapshot(&self, platform_id: &str) -> Result<Option<PlatformCacheSnapshot>> {
        Ok(self.snapshots.read().await.get(platform_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &PlatformCacheSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CacheError::Io("Snapshot store unavailable".to_string()));
        }
        self.snapshots
            .write()
            .await
            .insert(snapshot.platform_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete_snapshot(&self, platform_id: &str) -> Result<bool> {
        Ok(self.snapshots.write().await.remove(platform_id).is_some())
    }

    async fn list_snapshots(&self) -> Result<Vec<PlatformCacheSnapshot>> {
        Ok(self.snapshots.read().await.values().cloned().collect())
    }

    async fn clear_all(&self) -> Result<usize> {
        let mut snapshots = self.snapshots.write().await;
        let removed = snapshots.len();
        snapshots.clear();
        Ok(removed)
    }

    fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CachedEntity, EntityType, PlatformFamily};
    use tempfile::TempDir;

    fn snapshot(platform_id: &str, age_secs: i64, succeeded: bool) -> PlatformCacheSnapshot {
        let mut snapshot = PlatformCacheSnapshot::empty(platform_id, PlatformFamily::Cti);
        snapshot.entities_by_type.insert(
            EntityType::Malware,
            vec![CachedEntity::new("m1", "Emotet", EntityType::Malware, platform_id)],
        );
        snapshot.timestamp = Some(Utc::now() - chrono::Duration::seconds(age_secs));
        snapshot.last_refresh_succeeded = succeeded;
        snapshot
    }

    #[tokio::test]
    async fn test_memory_store_should_refresh() {
        let store = MemoryCacheStore::new().with_refresh_threshold(Duration::from_secs(60));

        assert!(store.should_refresh("p1").await);

        store.save_snapshot(&snapshot("p1", 5, true)).await.unwrap();
        assert!(!store.should_refresh("p1").await);

        store.save_snapshot(&snapshot("p1", 120, true)).await.unwrap();
        assert!(store.should_refresh("p1").await);

        store.save_snapshot(&snapshot("p1", 5, false)).await.unwrap();
        assert!(store.should_refresh("p1").await);
    }

    #[tokio::test]
    async fn test_memory_store_failing_saves_keep_previous() {
        let store = MemoryCacheStore::new();
        store.save_snapshot(&snapshot("p1", 0, true)).await.unwrap();

        store.set_fail_saves(true);
        let mut replacement = PlatformCacheSnapshot::empty("p1", PlatformFamily::Cti);
        replacement.timestamp = Some(Utc::now());
        assert!(store.save_snapshot(&replacement).await.is_err());

        let current = store.load_snapshot("p1").await.unwrap().unwrap();
        assert_eq!(current.entity_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_and_clear() {
        let store = MemoryCacheStore::new();
        store.save_snapshot(&snapshot("p1", 0, true)).await.unwrap();
        store.save_snapshot(&snapshot("p2", 0, true)).await.unwrap();

        assert!(store.delete_snapshot("p1").await.unwrap());
        assert_eq!(store.list_snapshots().await.unwrap().len(), 1);
        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert!(store.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_store_roundtrip_and_threshold() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCacheStore::open_at(dir.path())
            .unwrap()
            .with_refresh_threshold(Duration::from_secs(60));

        assert!(store.should_refresh("p1").await);
        store.save_snapshot(&snapshot("p1", 1, true)).await.unwrap();
        assert!(!store.should_refresh("p1").await);

        let loaded = store.load_snapshot("p1").await.unwrap().unwrap();
        assert_eq!(loaded.entity_count(), 1);
        assert_eq!(store.stats().unwrap().total_snapshots, 1);
    }
}
