//! Snapshot display model

use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;

use super::common::{format_age, format_size};
use crate::cache::SnapshotMeta;

/// Cached snapshot summary for `cache status` and `status`.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct SnapshotDisplay {
    #[tabled(rename = "PLATFORM")]
    pub platform_id: String,

    #[tabled(rename = "FAMILY")]
    pub family: String,

    #[tabled(rename = "ENTITIES")]
    pub entity_count: usize,

    #[tabled(rename = "REFRESHED")]
    pub refreshed: String,

    #[tabled(rename = "STATUS")]
    pub status: String,

    #[tabled(rename = "SIZE")]
    pub size: String,
}

impl From<&SnapshotMeta> for SnapshotDisplay {
    fn from(meta: &SnapshotMeta) -> Self {
        Self {
            platform_id: meta.platform_id.clone(),
            family: meta.family.clone(),
            entity_count: meta.entity_count,
            refreshed: format_age(meta.refreshed_at, Utc::now()),
            status: if meta.succeeded { "ok" } else { "failed" }.to_string(),
            size: format_size(meta.size_bytes),
        }
    }
}
