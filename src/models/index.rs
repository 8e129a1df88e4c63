//! Lowercased name/alias index over cached entities
//!
//! The index is derived data: it is rebuilt from snapshots whenever they
//! change and is never mutated afterwards, so it can be shared freely
//! between concurrent scans.

use std::collections::HashMap;
use std::sync::Arc;

use super::entity::CachedEntity;
use super::snapshot::PlatformCacheSnapshot;

/// Lowercase a key or text one char at a time.
///
/// Scanning folds text with the same per-char mapping, so keys and text
/// always agree (`str::to_lowercase` treats a final sigma differently).
pub fn fold_case(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// All entities that share one lowercased name or alias.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: String,
    pub entities: Vec<Arc<CachedEntity>>,
}

/// Read-only mapping `lowercase(name-or-alias) -> [entity]`, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CachedEntityIndex {
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl CachedEntityIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from entities, keyed by their name then each alias.
    pub fn from_entities<'a, I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a CachedEntity>,
    {
        let mut index = Self::default();
        for entity in entities {
            index.insert(Arc::new(entity.clone()));
        }
        index
    }

    /// Build an index spanning several platform snapshots, in the order given.
    pub fn from_snapshots<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = &'a PlatformCacheSnapshot>,
    {
        Self::from_entities(snapshots.into_iter().flat_map(|s| s.entities()))
    }

    fn insert(&mut self, entity: Arc<CachedEntity>) {
        for text in entity.matchable_strings() {
            let key = fold_case(text.trim());
            if key.is_empty() {
                continue;
            }

            let slot = match self.positions.get(&key) {
                Some(&pos) => pos,
                None => {
                    self.entries.push(IndexEntry {
                        key: key.clone(),
                        entities: Vec::new(),
                    });
                    let pos = self.entries.len() - 1;
                    self.positions.insert(key, pos);
                    pos
                }
            };

            let entities = &mut self.entries[slot].entities;
            if !entities.iter().any(|e| Arc::ptr_eq(e, &entity)) {
                entities.push(Arc::clone(&entity));
            }
        }
    }

    /// Entities stored under `key` (matched case-insensitively).
    pub fn get(&self, key: &str) -> Option<&[Arc<CachedEntity>]> {
        self.positions
            .get(&fold_case(key.trim()))
            .map(|&pos| self.entries[pos].entities.as_slice())
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
