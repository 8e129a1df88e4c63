//! Platform entity sources
//!
//! A [`PlatformEntitySource`] fetches the raw entity list of one category on
//! one platform. The refresh scheduler fans out over every category of a
//! platform family and normalizes the results with [`normalize`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::{EntityCategory, PlatformFamily};

pub mod http;
#[cfg(test)]
pub mod mock;
pub mod normalize;
pub mod parallel;
pub mod rate_limit;

pub use http::HttpEntitySource;
#[cfg(test)]
#[allow(unused_imports)]
pub use mock::MockEntitySource;
pub use normalize::{normalize, normalize_all};
pub use parallel::fetch_isolated;

/// Fetches raw entity lists from configured platforms.
///
/// Implementations must tolerate concurrent calls for different categories
/// of the same platform.
#[async_trait]
pub trait PlatformEntitySource: Send + Sync {
    /// Categories fetched for a family during a refresh
    fn categories(&self, family: PlatformFamily) -> Vec<EntityCategory> {
        family.categories()
    }

    /// Fetch every entity of one category from one platform
    async fn fetch_category(
        &self,
        platform_id: &str,
        category: EntityCategory,
    ) -> Result<Vec<RawEntity>>;
}

/// One entity as returned by a platform, before normalization.
///
/// Field names differ per platform and category, so the raw object is kept
/// as-is and read through the lookup helpers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEntity(pub Map<String, Value>);

impl RawEntity {
    /// Wrap a JSON value, `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// First non-blank string (or number) found under any of `keys`
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Every non-blank string under any of `keys`, accepting a single
    /// string or an array of strings per key
    pub fn text_list(&self, keys: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for key in keys {
            match self.0.get(*key) {
                Some(Value::String(s)) => out.push(s.clone()),
                Some(Value::Array(items)) => {
                    out.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)))
                }
                _ => {}
            }
        }
        out.retain(|s| !s.trim().is_empty());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_entity_text_lookup_order() {
        let raw = RawEntity::from_value(json!({
            "endpoint_id": "e-1",
            "id": "fallback",
            "blank": "   ",
            "count": 42
        }))
        .unwrap();

        assert_eq!(raw.text(&["endpoint_id", "id"]), Some("e-1".to_string()));
        assert_eq!(raw.text(&["missing", "id"]), Some("fallback".to_string()));
        assert_eq!(raw.text(&["blank"]), None);
        assert_eq!(raw.text(&["count"]), Some("42".to_string()));
    }

    #[test]
    fn test_raw_entity_text_list() {
        let raw = RawEntity::from_value(json!({
            "ips": ["10.0.0.1", "", "10.0.0.2", 7],
            "hostname": "web-01"
        }))
        .unwrap();

        assert_eq!(
            raw.text_list(&["hostname", "ips"]),
            vec!["web-01", "10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn test_raw_entity_rejects_non_objects() {
        assert!(RawEntity::from_value(json!(["a"])).is_none());
        assert!(RawEntity::from_value(json!("a")).is_none());
    }
}
