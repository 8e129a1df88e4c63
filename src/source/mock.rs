//! In-memory entity source for testing
//!
//! Serves canned raw entities per (platform, type) and can be told to fail
//! whole categories, fail everything, or hang on the next call.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{PlatformEntitySource, RawEntity};
use crate::error::{Result, SourceError};
use crate::models::{EntityCategory, EntityType, PlatformFamily};

/// Mock entity source.
///
/// # Example
///
/// ```ignore
/// let source = MockEntitySource::new()
///     .with_entity("cti-1", EntityType::Malware, "m-1", "Emotet", &["Geodo"])
///     .with_failing_type(EntityType::Tool);
/// ```
#[derive(Default)]
pub struct MockEntitySource {
    entities: Mutex<HashMap<(String, EntityType), Vec<RawEntity>>>,
    failing_types: Mutex<HashSet<EntityType>>,
    categories: Option<HashMap<PlatformFamily, Vec<EntityCategory>>>,
    fail_all: AtomicBool,
    hang_next: AtomicBool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockEntitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one raw entity with the generic `id`/`name`/`aliases` fields
    pub fn with_entity(
        self,
        platform_id: &str,
        entity_type: EntityType,
        id: &str,
        name: &str,
        aliases: &[&str],
    ) -> Self {
        self.add_entity(platform_id, entity_type, id, name, aliases);
        self
    }

    pub fn with_failing_type(self, entity_type: EntityType) -> Self {
        self.set_failing(entity_type, true);
        self
    }

    /// Restrict the categories fetched for a family
    pub fn with_categories(mut self, family: PlatformFamily, entity_types: &[EntityType]) -> Self {
        let categories = entity_types
            .iter()
            .map(|t| EntityCategory::new(family, *t))
            .collect();
        self.categories
            .get_or_insert_with(HashMap::new)
            .insert(family, categories);
        self
    }

    /// Sleep this long inside every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn add_entity(
        &self,
        platform_id: &str,
        entity_type: EntityType,
        id: &str,
        name: &str,
        aliases: &[&str],
    ) {
        let raw = RawEntity::from_value(json!({ "id": id, "name": name, "aliases": aliases }))
            .unwrap_or_default();
        self.entities
            .lock()
            .unwrap()
            .entry((platform_id.to_string(), entity_type))
            .or_default()
            .push(raw);
    }

    pub fn set_failing(&self, entity_type: EntityType, failing: bool) {
        let mut failing_types = self.failing_types.lock().unwrap();
        if failing {
            failing_types.insert(entity_type);
        } else {
            failing_types.remove(&entity_type);
        }
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// The next fetch never completes
    pub fn hang_next(&self) {
        self.hang_next.store(true, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformEntitySource for MockEntitySource {
    fn categories(&self, family: PlatformFamily) -> Vec<EntityCategory> {
        self.categories
            .as_ref()
            .and_then(|c| c.get(&family).cloned())
            .unwrap_or_else(|| family.categories())
    }

    async fn fetch_category(
        &self,
        platform_id: &str,
        category: EntityCategory,
    ) -> Result<Vec<RawEntity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.hang_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_all.load(Ordering::SeqCst)
            || self
                .failing_types
                .lock()
                .unwrap()
                .contains(&category.entity_type)
        {
            return Err(SourceError::ServerError(format!("{} unavailable", category)).into());
        }

        Ok(self
            .entities
            .lock()
            .unwrap()
            .get(&(platform_id.to_string(), category.entity_type))
            .cloned()
            .unwrap_or_default())
    }
}
