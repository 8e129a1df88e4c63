//! SQLite-based snapshot storage with file blob support
//!
//! Stores small snapshots inline in SQLite, large ones (>64KB) as files named
//! by their digest. A snapshot row is replaced in a single statement and its
//! blob is written before the row points at it, so readers only ever see a
//! complete old or a complete new snapshot.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use super::digest::snapshot_digest;
use crate::error::CacheError;
use crate::models::PlatformCacheSnapshot;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Payloads larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 64 * 1024; // 64KB

type Result<T> = std::result::Result<T, CacheError>;

/// SQLite-backed snapshot storage
pub struct CacheStorage {
    conn: Connection,
    blobs_dir: PathBuf,
}

impl CacheStorage {
    /// Open or create storage at the default XDG cache location
    pub fn open() -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir)
    }

    /// Get the cache directory path (~/.cache/ctiscan on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("ctiscan"))
    }

    /// Open storage at a specific directory
    pub fn open_at(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join("snapshots.db");
        let blobs_dir = cache_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(cache_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                platform_id TEXT PRIMARY KEY NOT NULL,
                family TEXT NOT NULL,
                data TEXT,
                blob_path TEXT,
                digest TEXT NOT NULL,
                entity_count INTEGER NOT NULL,
                refreshed_at INTEGER,
                succeeded INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_family ON snapshots(family);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn, blobs_dir })
    }

    /// Load the snapshot for a platform, if one is stored and intact
    pub fn get(&self, platform_id: &str) -> Result<Option<PlatformCacheSnapshot>> {
        let row: Option<(Option<String>, Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT data, blob_path, digest FROM snapshots WHERE platform_id = ?1",
                [platform_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((data, blob_path, digest)) = row else {
            return Ok(None);
        };

        let payload = match (data, blob_path) {
            (Some(data), None) => data.into_bytes(),
            (None, Some(blob_path)) => match std::fs::read(self.blobs_dir.join(&blob_path)) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Failed to read snapshot blob {}: {}", blob_path, e);
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        };

        if snapshot_digest(platform_id, &payload) != digest {
            log::warn!(
                "Snapshot for {} failed digest check, ignoring it",
                platform_id
            );
            return Ok(None);
        }

        match serde_json::from_slice(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                log::warn!("Snapshot for {} could not be decoded: {}", platform_id, e);
                Ok(None)
            }
        }
    }

    /// Replace the snapshot for its platform
    pub fn put(&self, snapshot: &PlatformCacheSnapshot) -> Result<()> {
        let payload = serde_json::to_vec(snapshot)?;
        let digest = snapshot_digest(&snapshot.platform_id, &payload);
        let refreshed_at = snapshot.timestamp.map(|ts| ts.timestamp());

        let tx = self.conn.unchecked_transaction()?;

        let old_blob: Option<String> = tx
            .query_row(
                "SELECT blob_path FROM snapshots WHERE platform_id = ?1",
                [&snapshot.platform_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let new_blob = if payload.len() > INLINE_THRESHOLD {
            Some(self.write_blob(&digest, &payload)?)
        } else {
            None
        };
        let inline = new_blob
            .is_none()
            .then(|| String::from_utf8_lossy(&payload).to_string());

        let stored = tx
            .execute(
                "INSERT OR REPLACE INTO snapshots
                 (platform_id, family, data, blob_path, digest, entity_count, refreshed_at, succeeded, size_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    snapshot.platform_id,
                    snapshot.family.as_str(),
                    inline,
                    new_blob,
                    digest,
                    snapshot.entity_count(),
                    refreshed_at,
                    snapshot.last_refresh_succeeded,
                    payload.len()
                ],
            )
            .and_then(|_| tx.commit());

        if let Err(e) = stored {
            // The row still points at the old blob, so only a new one is orphaned
            if let Some(blob) = &new_blob
                && old_blob.as_deref() != Some(blob.as_str())
            {
                self.remove_blob(blob);
            }
            return Err(e.into());
        }

        if let Some(old) = old_blob
            && new_blob.as_deref() != Some(old.as_str())
        {
            self.remove_blob(&old);
        }

        Ok(())
    }

    /// Delete the snapshot for a platform
    pub fn delete(&self, platform_id: &str) -> Result<bool> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT blob_path FROM snapshots WHERE platform_id = ?1",
                [platform_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let deleted = self
            .conn
            .execute("DELETE FROM snapshots WHERE platform_id = ?1", [platform_id])?;

        if let Some(blob) = blob {
            self.remove_blob(&blob);
        }

        Ok(deleted > 0)
    }

    /// Load every stored snapshot, ordered by platform id
    pub fn list(&self) -> Result<Vec<PlatformCacheSnapshot>> {
        let mut stmt = self
            .conn
            .prepare("SELECT platform_id FROM snapshots ORDER BY platform_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut snapshots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(snapshot) = self.get(&id)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Per-snapshot metadata without decoding payloads
    pub fn list_meta(&self) -> Result<Vec<SnapshotMeta>> {
        let mut stmt = self.conn.prepare(
            "SELECT platform_id, family, entity_count, refreshed_at, succeeded, size_bytes
             FROM snapshots ORDER BY platform_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let refreshed_at: Option<i64> = row.get(3)?;
            Ok(SnapshotMeta {
                platform_id: row.get(0)?,
                family: row.get(1)?,
                entity_count: row.get::<_, i64>(2)? as usize,
                refreshed_at: refreshed_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
                succeeded: row.get(4)?,
                size_bytes: row.get::<_, i64>(5)? as usize,
            })
        })?;

        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Clear all snapshots
    pub fn clear_all(&self) -> Result<ClearStats> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?;

        self.conn.execute("DELETE FROM snapshots", [])?;

        // Clear blobs directory
        if self.blobs_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.blobs_dir) {
                log::warn!("Failed to clear blobs directory: {}", e);
            }
            std::fs::create_dir_all(&self.blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to recreate blobs dir: {}", e)))?;
        }

        Ok(ClearStats {
            entries_removed: count as usize,
        })
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let (total, healthy, entities, size): (i64, i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(succeeded), 0),
                    COALESCE(SUM(entity_count), 0),
                    COALESCE(SUM(size_bytes), 0)
             FROM snapshots",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(refreshed_at), MAX(refreshed_at) FROM snapshots",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        Ok(CacheStats {
            total_snapshots: total as usize,
            healthy_snapshots: healthy as usize,
            total_entities: entities as usize,
            total_size_bytes: size as usize,
            oldest_refresh: oldest,
            newest_refresh: newest,
        })
    }

    /// Write a blob file, sharded by first 2 chars of its digest
    fn write_blob(&self, digest: &str, data: &[u8]) -> Result<String> {
        let shard = &digest[..2.min(digest.len())];
        let shard_dir = self.blobs_dir.join(shard);
        std::fs::create_dir_all(&shard_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create shard dir: {}", e)))?;

        let filename = format!("{}.json", digest);
        let rel_path = format!("{}/{}", shard, filename);
        let full_path = shard_dir.join(&filename);
        let tmp_path = shard_dir.join(format!("{}.tmp", filename));

        std::fs::write(&tmp_path, data)
            .map_err(|e| CacheError::Io(format!("Failed to write blob: {}", e)))?;
        std::fs::rename(&tmp_path, &full_path)
            .map_err(|e| CacheError::Io(format!("Failed to move blob into place: {}", e)))?;

        Ok(rel_path)
    }

    fn remove_blob(&self, rel_path: &str) {
        if let Err(e) = std::fs::remove_file(self.blobs_dir.join(rel_path)) {
            log::debug!("Failed to remove old blob {}: {}", rel_path, e);
        }
    }

    /// Nuke the cache (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| CacheError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }
}

/// Stored snapshot metadata
#[derive(Debug, Clone)]
pub struct SnapshotMeta {
    pub platform_id: String,
    pub family: String,
    pub entity_count: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
    pub size_bytes: usize,
}

/// Statistics about cache clear operation
#[derive(Debug)]
pub struct ClearStats {
    pub entries_removed: usize,
}

/// Statistics about cache state
#[derive(Debug)]
pub struct CacheStats {
    pub total_snapshots: usize,
    pub healthy_snapshots: usize,
    pub total_entities: usize,
    pub total_size_bytes: usize,
    pub oldest_refresh: Option<i64>,
    pub newest_refresh: Option<i64>,
}
