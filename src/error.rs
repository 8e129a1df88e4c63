//! Error types for ctiscan

use std::time::Duration;
use thiserror::Error;

/// Result type alias for ctiscan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Errors raised while fetching entity lists from a platform
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Authentication failed. Check the API token configured for this platform.")]
    Unauthorized,

    #[error("Access denied. The API token cannot read this resource.")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Category {category} is not served by platform {platform}")]
    UnsupportedCategory { platform: String, category: String },
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            SourceError::Network("Failed to connect to platform".to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

/// Snapshot persistence errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Could not determine the user cache directory")]
    NoHome,

    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Run `ctiscan init` to set up.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("No platforms configured. Run `ctiscan init` to add one.")]
    NoPlatforms,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_unauthorized_message() {
        let err = SourceError::Unauthorized;
        assert!(err.to_string().contains("API token"));
    }

    #[test]
    fn test_source_error_rate_limit() {
        let err = SourceError::RateLimit(Duration::from_secs(30));
        let msg = err.to_string();
        assert!(msg.contains("Rate limit"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_source_error_unsupported_category() {
        let err = SourceError::UnsupportedCategory {
            platform: "opencti-1".to_string(),
            category: "Asset".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("opencti-1"));
        assert!(msg.contains("Asset"));
    }

    #[test]
    fn test_cache_error_io() {
        let err = CacheError::Io("disk full".to_string());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_config_error_not_found() {
        let err = ConfigError::NotFound;
        assert!(err.to_string().contains("ctiscan init"));
    }

    #[test]
    fn test_config_error_no_platforms() {
        let err = ConfigError::NoPlatforms;
        assert!(err.to_string().contains("ctiscan init"));
    }

    #[test]
    fn test_error_from_source_error() {
        let err: Error = SourceError::Forbidden.into();

        match err {
            Error::Source(SourceError::Forbidden) => (),
            _ => panic!("Expected Error::Source(SourceError::Forbidden)"),
        }
    }

    #[test]
    fn test_error_from_cache_error() {
        let err: Error = CacheError::NoHome.into();

        match err {
            Error::Cache(CacheError::NoHome) => (),
            _ => panic!("Expected Error::Cache(CacheError::NoHome)"),
        }
    }

    #[test]
    fn test_config_error_from_yaml_error() {
        let yaml_str = "invalid: [yaml: content";
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>(yaml_str).unwrap_err();
        let config_err: ConfigError = yaml_err.into();

        match config_err {
            ConfigError::ParseError(_) => (),
            _ => panic!("Expected ConfigError::ParseError"),
        }
    }
}
