//! Snapshot persistence
//!
//! [`CacheStore`] is the persistence boundary used by the refresh scheduler
//! and by scan callers. Two implementations ship with the crate:
//! [`SqliteCacheStore`] (SQLite with file blobs, the default for the CLI) and
//! [`MemoryCacheStore`] (process-local, for embedding and tests).

pub mod digest;
pub mod storage;
mod store;

use std::time::Duration;

/// Snapshot age configuration
pub struct CacheTtl;

impl CacheTtl {
    /// Snapshots older than this are refreshed on the next pass. Kept below
    /// the long scheduler interval so a healthy pass always finds them due.
    pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(25 * 60); // 25 min
}

// Re-export main types
pub use digest::snapshot_digest;
pub use storage::{CacheStats, CacheStorage, ClearStats, SnapshotMeta};
pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};
