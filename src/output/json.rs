//! JSON output formatting

use chrono::Utc;
use serde::Serialize;

/// Envelope for JSON output: the payload plus run metadata
#[derive(Debug, Serialize)]
pub struct JsonOutput<T> {
    pub data: T,
    pub meta: Metadata,
}

/// Metadata included in JSON output
#[derive(Debug, Serialize)]
pub struct Metadata {
    /// RFC 3339 time the output was produced
    pub timestamp: String,

    /// CLI version
    pub version: String,
}

impl<T> JsonOutput<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            meta: Metadata {
                timestamp: Utc::now().to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Format data as pretty-printed JSON inside the `{data, meta}` envelope
pub fn format_json<T: Serialize + ?Sized>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonOutput::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::display::MatchDisplay;

    fn row(name: &str) -> MatchDisplay {
        MatchDisplay {
            entity_type: "Malware".to_string(),
            name: name.to_string(),
            matched_text: name.to_string(),
            span: "0..6".to_string(),
            platform_id: "cti-1".to_string(),
            entity_id: "m-1".to_string(),
        }
    }

    #[test]
    fn test_envelope_metadata() {
        let output = JsonOutput::new(vec!["a"]);
        assert_eq!(output.meta.version, env!("CARGO_PKG_VERSION"));
        assert!(!output.meta.timestamp.is_empty());
    }

    #[test]
    fn test_format_json_wraps_rows() {
        let result = format_json(&[row("Emotet"), row("TrickBot")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&result).unwrap();

        assert_eq!(value["data"][0]["name"], "Emotet");
        assert_eq!(value["data"][1]["span"], "0..6");
        assert!(value["meta"]["timestamp"].is_string());
    }

    #[test]
    fn test_format_json_empty() {
        let rows: Vec<MatchDisplay> = vec![];
        assert!(format_json(&rows).unwrap().contains("\"data\": []"));
    }
}
