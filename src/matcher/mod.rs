//! Text scanning against the cached entity index
//!
//! Finds exact, boundary-respecting, non-overlapping occurrences of known
//! entity names and aliases in arbitrary text. Scanning is pure: no I/O, no
//! state carried between calls, and identical input always yields identical
//! output in the same order.
//!
//! Keys are processed longest first so that a long name claims its text
//! before any shorter name nested inside it. Each key reports only its first
//! valid occurrence, and every entity sharing that key is emitted once.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{CachedEntity, CachedEntityIndex, EntityType, IndexEntry};

/// Keys shorter than this many characters are never matched.
pub const MIN_KEY_CHARS: usize = 4;

/// Tunables for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Minimum key length in characters
    pub min_key_chars: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            min_key_chars: MIN_KEY_CHARS,
        }
    }
}

/// One reported occurrence of one entity.
///
/// `start_index`/`end_index` are byte offsets into the scanned text, so
/// `&text[start_index..end_index] == matched_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub matched_text: String,
    pub start_index: usize,
    pub end_index: usize,
    pub entity_id: String,
    pub platform_id: String,
    pub source_entity: CachedEntity,
}

/// Include/exclude filter over entity types, applied when records are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    /// When set, only these types are emitted
    pub include: Option<BTreeSet<EntityType>>,
    /// Types never emitted
    pub exclude: BTreeSet<EntityType>,
}

impl CategoryFilter {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn excluding<I: IntoIterator<Item = EntityType>>(types: I) -> Self {
        Self {
            include: None,
            exclude: types.into_iter().collect(),
        }
    }

    pub fn allows(&self, entity_type: EntityType) -> bool {
        if self.exclude.contains(&entity_type) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(&entity_type),
            None => true,
        }
    }
}

/// Scan `text` with default options.
pub fn scan<F>(text: &str, index: &CachedEntityIndex, include: F) -> Vec<MatchRecord>
where
    F: Fn(EntityType) -> bool,
{
    scan_with(text, index, &ScanOptions::default(), include)
}

/// Scan `text` for every known key in `index`.
///
/// `include` decides which entity types are emitted; it never influences
/// which text ranges are claimed.
pub fn scan_with<F>(
    text: &str,
    index: &CachedEntityIndex,
    options: &ScanOptions,
    include: F,
) -> Vec<MatchRecord>
where
    F: Fn(EntityType) -> bool,
{
    if text.is_empty() || index.is_empty() {
        return Vec::new();
    }

    let folded = FoldedText::new(text);

    let mut candidates: Vec<(usize, &IndexEntry)> = index
        .entries()
        .iter()
        .map(|entry| (entry.key.chars().count(), entry))
        .filter(|(len, _)| *len >= options.min_key_chars)
        .collect();
    // sort_by is stable: equal lengths keep index order
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let mut consumed: Vec<(usize, usize)> = Vec::new();
    let mut emitted: HashSet<(&str, &str)> = HashSet::new();
    let mut records = Vec::new();

    for (_, entry) in candidates {
        let Some((start, end)) = find_first_valid(text, &folded, &entry.key, &consumed) else {
            continue;
        };
        consumed.push((start, end));

        let (orig_start, orig_end) = folded.original_range(start, end);
        let matched_text = &text[orig_start..orig_end];
        log::trace!("Key '{}' matched at {}..{}", entry.key, orig_start, orig_end);

        for entity in &entry.entities {
            if !include(entity.entity_type) {
                continue;
            }
            if !emitted.insert((entity.platform_id.as_str(), entity.id.as_str())) {
                continue;
            }
            records.push(MatchRecord {
                entity_type: entity.entity_type,
                name: entity.name.clone(),
                matched_text: matched_text.to_string(),
                start_index: orig_start,
                end_index: orig_end,
                entity_id: entity.id.clone(),
                platform_id: entity.platform_id.clone(),
                source_entity: CachedEntity::clone(entity),
            });
        }
    }

    records
}

/// First occurrence of `key` that passes the boundary, sub-technique and overlap checks.
///
/// A rejected occurrence resumes the search one character after its start.
fn find_first_valid(
    original: &str,
    folded: &FoldedText,
    key: &str,
    consumed: &[(usize, usize)],
) -> Option<(usize, usize)> {
    let haystack = folded.text.as_str();
    let parent_technique = is_parent_technique_id(key);
    let mut from = 0;

    while from < haystack.len() {
        let start = from + haystack[from..].find(key)?;
        let end = start + key.len();

        let rejected = !folded.is_char_aligned(start, end)
            || !folded.has_original_boundaries(original, start, end)
            || (parent_technique && haystack[end..].starts_with('.'))
            || overlaps(consumed, start, end);

        if !rejected {
            return Some((start, end));
        }

        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }

    None
}

fn has_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    before.is_none_or(is_boundary_char) && after.is_none_or(is_boundary_char)
}

fn is_boundary_char(c: char) -> bool {
    !c.is_alphanumeric()
}

fn overlaps(consumed: &[(usize, usize)], start: usize, end: usize) -> bool {
    consumed.iter().any(|&(s, e)| start < e && s < end)
}

/// Letters followed by exactly four digits, e.g. `t1566`.
fn is_parent_technique_id(key: &str) -> bool {
    let digits = key.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    digits.len() == 4 && digits.len() < key.len() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Lowercased copy of the scanned text with a map back to original offsets.
struct FoldedText {
    text: String,
    /// Original byte offset for every folded byte, plus one trailing entry
    origin: Vec<usize>,
}

impl FoldedText {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);

        for (offset, ch) in original.char_indices() {
            for lower in ch.to_lowercase() {
                text.push(lower);
                origin.extend(std::iter::repeat_n(offset, lower.len_utf8()));
            }
        }
        origin.push(original.len());

        Self { text, origin }
    }

    /// Whether both ends fall between two original characters rather than
    /// inside the multi-char lowercase expansion of one.
    fn is_char_aligned(&self, start: usize, end: usize) -> bool {
        let aligned = |pos: usize| pos == 0 || self.origin[pos] != self.origin[pos - 1];
        aligned(start) && aligned(end)
    }

    fn original_range(&self, start: usize, end: usize) -> (usize, usize) {
        (self.origin[start], self.origin[end])
    }

    /// Boundary check against the original characters, since lowercasing
    /// can turn a letter into a letter plus a combining mark.
    fn has_original_boundaries(&self, original: &str, start: usize, end: usize) -> bool {
        let (start, end) = self.original_range(start, end);
        has_boundaries(original, start, end)
    }
}
