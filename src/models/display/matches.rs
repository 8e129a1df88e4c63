//! Match display model

use serde::Serialize;
use tabled::Tabled;

use super::common::truncate_string;
use crate::matcher::MatchRecord;

/// One match as a table row.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct MatchDisplay {
    #[tabled(rename = "TYPE")]
    pub entity_type: String,

    #[tabled(rename = "NAME")]
    pub name: String,

    /// Literal text as found in the input
    #[tabled(rename = "MATCHED")]
    pub matched_text: String,

    /// Byte range `start..end` in the input
    #[tabled(rename = "SPAN")]
    pub span: String,

    #[tabled(rename = "PLATFORM")]
    pub platform_id: String,

    #[tabled(rename = "ENTITY ID")]
    pub entity_id: String,
}

impl From<&MatchRecord> for MatchDisplay {
    fn from(record: &MatchRecord) -> Self {
        Self {
            entity_type: record.entity_type.to_string(),
            name: truncate_string(&record.name, 40),
            matched_text: truncate_string(&record.matched_text, 40),
            span: format!("{}..{}", record.start_index, record.end_index),
            platform_id: record.platform_id.clone(),
            entity_id: truncate_string(&record.entity_id, 36),
        }
    }
}
