//! HTTP entity source
//!
//! Simulation platforms expose one REST list endpoint per category. CTI
//! platforms are read through a cursor-paginated GraphQL connection per
//! category.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client as HttpClient, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::rate_limit::RateLimiterSet;
use super::{PlatformEntitySource, RawEntity};
use crate::config::PlatformConfig;
use crate::error::{Result, SourceError};
use crate::models::{EntityCategory, EntityType, PlatformFamily};

/// Page size requested from GraphQL connections
pub const GRAPHQL_PAGE_SIZE: u32 = 500;

/// Safety stop for runaway pagination
const MAX_PAGES: usize = 1_000;

/// Fetches entity lists from configured platforms over HTTP.
pub struct HttpEntitySource {
    http: HttpClient,
    platforms: HashMap<String, PlatformConfig>,
    rate_limiters: RateLimiterSet,
}

impl HttpEntitySource {
    /// Create a source for the given platforms
    pub fn new(platforms: &[PlatformConfig]) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let rate_limiters = RateLimiterSet::for_platforms(
            platforms
                .iter()
                .map(|p| (p.id.as_str(), p.requests_per_second)),
        );

        Ok(Self {
            http,
            platforms: platforms
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
            rate_limiters,
        })
    }

    fn platform(&self, platform_id: &str) -> Result<&PlatformConfig> {
        self.platforms
            .get(platform_id)
            .ok_or_else(|| SourceError::UnknownPlatform(platform_id.to_string()).into())
    }

    fn authorized(&self, platform: &PlatformConfig, request: RequestBuilder) -> RequestBuilder {
        match &platform.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and map non-success statuses to source errors
    async fn send(&self, platform: &PlatformConfig, request: RequestBuilder) -> Result<Response> {
        self.rate_limiters.wait_for(&platform.id).await;

        let response = self
            .authorized(platform, request)
            .send()
            .await
            .map_err(SourceError::from)?;

        let status = response.status();
        match status {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(SourceError::Unauthorized.into()),
            StatusCode::FORBIDDEN => Err(SourceError::Forbidden.into()),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(SourceError::NotFound(url).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("{} is throttling requests, slowing down", platform.id);
                self.rate_limiters.activate(&platform.id).await;
                Err(SourceError::RateLimit(Duration::from_secs(retry_after)).into())
            }
            status if status.is_server_error() => {
                let error_msg = response
                    .text()
                    .await
                    .unwrap_or_else(|_| format!("Server error: {}", status));
                Err(SourceError::ServerError(error_msg).into())
            }
            _ => Err(SourceError::InvalidResponse(format!(
                "Unexpected status code: {}",
                status
            ))
            .into()),
        }
    }

    async fn fetch_rest(
        &self,
        platform: &PlatformConfig,
        entity_type: EntityType,
    ) -> Result<Vec<RawEntity>> {
        let path = rest_path(entity_type).ok_or_else(|| unsupported(platform, entity_type))?;
        let url = format!("{}/api/{}", platform.base_url(), path);
        debug!("GET {}", url);

        let response = self.send(platform, self.http.get(&url)).await?;
        let body: Value = response.json().await.map_err(|e| {
            SourceError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;

        rest_items(body)
    }

    async fn fetch_graphql(
        &self,
        platform: &PlatformConfig,
        entity_type: EntityType,
    ) -> Result<Vec<RawEntity>> {
        let connection =
            graphql_connection(entity_type).ok_or_else(|| unsupported(platform, entity_type))?;
        let url = format!("{}/graphql", platform.base_url());
        let query = connection.query();

        let mut entities = Vec::new();
        let mut after: Option<String> = None;

        for page in 0..MAX_PAGES {
            debug!("POST {} {} page {}", url, connection.field, page + 1);

            let body = json!({
                "query": query,
                "variables": { "first": GRAPHQL_PAGE_SIZE, "after": after },
            });
            let response = self.send(platform, self.http.post(&url).json(&body)).await?;
            let envelope: GraphQlResponse = response.json().await.map_err(|e| {
                SourceError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

            let page = envelope.into_page(connection.field)?;
            entities.extend(page.nodes);

            match page.end_cursor {
                Some(cursor) if page.has_next_page && after.as_deref() != Some(cursor.as_str()) => {
                    after = Some(cursor);
                }
                _ => return Ok(entities),
            }
        }

        warn!(
            "{} on {} stopped after {} pages",
            connection.field, platform.id, MAX_PAGES
        );
        Ok(entities)
    }
}

#[async_trait]
impl PlatformEntitySource for HttpEntitySource {
    async fn fetch_category(
        &self,
        platform_id: &str,
        category: EntityCategory,
    ) -> Result<Vec<RawEntity>> {
        let platform = self.platform(platform_id)?;
        if platform.family != category.family {
            return Err(unsupported(platform, category.entity_type));
        }

        match category.family {
            PlatformFamily::Simulation => self.fetch_rest(platform, category.entity_type).await,
            PlatformFamily::Cti => self.fetch_graphql(platform, category.entity_type).await,
        }
    }
}

fn unsupported(platform: &PlatformConfig, entity_type: EntityType) -> crate::error::Error {
    SourceError::UnsupportedCategory {
        platform: platform.id.clone(),
        category: entity_type.to_string(),
    }
    .into()
}

fn rest_path(entity_type: EntityType) -> Option<&'static str> {
    match entity_type {
        EntityType::Asset => Some("endpoints"),
        EntityType::AssetGroup => Some("asset_groups"),
        EntityType::Player => Some("players"),
        EntityType::Team => Some("teams"),
        EntityType::AttackPattern => Some("attack_patterns"),
        EntityType::Finding => Some("findings"),
        _ => None,
    }
}

/// Accepts a bare JSON array or a Spring-style page object with `content`.
fn rest_items(body: Value) -> Result<Vec<RawEntity>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("content") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(SourceError::InvalidResponse(
                    "expected a JSON array of entities".to_string(),
                )
                .into());
            }
        },
        _ => {
            return Err(
                SourceError::InvalidResponse("expected a JSON array of entities".to_string())
                    .into(),
            );
        }
    };

    Ok(items.into_iter().filter_map(RawEntity::from_value).collect())
}

struct GraphQlConnection {
    field: &'static str,
    node_fields: &'static str,
}

impl GraphQlConnection {
    fn query(&self) -> String {
        format!(
            "query ($first: Int!, $after: ID) {{ {field}(first: $first, after: $after) {{ \
             edges {{ node {{ {nodes} }} }} pageInfo {{ hasNextPage endCursor }} }} }}",
            field = self.field,
            nodes = self.node_fields,
        )
    }
}

fn graphql_connection(entity_type: EntityType) -> Option<GraphQlConnection> {
    let (field, node_fields) = match entity_type {
        EntityType::ThreatActor => ("threatActors", "id name aliases"),
        EntityType::IntrusionSet => ("intrusionSets", "id name aliases"),
        EntityType::Malware => ("malwares", "id name aliases"),
        EntityType::Campaign => ("campaigns", "id name aliases"),
        EntityType::AttackPattern => ("attackPatterns", "id name aliases x_mitre_id"),
        EntityType::Vulnerability => ("vulnerabilities", "id name x_opencti_aliases"),
        EntityType::Tool => ("tools", "id name aliases"),
        EntityType::Sector => ("sectors", "id name x_opencti_aliases"),
        EntityType::Organization => ("organizations", "id name x_opencti_aliases"),
        EntityType::Country => ("countries", "id name x_opencti_aliases"),
        _ => return None,
    };

    Some(GraphQlConnection { field, node_fields })
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<HashMap<String, Option<Connection>>>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: Value,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

struct Page {
    nodes: Vec<RawEntity>,
    has_next_page: bool,
    end_cursor: Option<String>,
}

impl GraphQlResponse {
    fn into_page(self, field: &str) -> Result<Page> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(SourceError::InvalidResponse(messages.join("; ")).into());
        }

        let connection = self
            .data
            .and_then(|mut data| data.remove(field))
            .flatten()
            .ok_or_else(|| SourceError::InvalidResponse(format!("missing '{}' in response", field)))?;

        let (has_next_page, end_cursor) = connection
            .page_info
            .map(|info| (info.has_next_page, info.end_cursor))
            .unwrap_or((false, None));

        Ok(Page {
            nodes: connection
                .edges
                .into_iter()
                .filter_map(|edge| RawEntity::from_value(edge.node))
                .collect(),
            has_next_page,
            end_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn platform(id: &str, family: PlatformFamily, url: &str) -> PlatformConfig {
        PlatformConfig {
            id: id.to_string(),
            name: None,
            family,
            url: url.to_string(),
            token: Some("t0ken".to_string()),
            requests_per_second: 5,
        }
    }

    fn sim(entity_type: EntityType) -> EntityCategory {
        EntityCategory::new(PlatformFamily::Simulation, entity_type)
    }

    fn cti(entity_type: EntityType) -> EntityCategory {
        EntityCategory::new(PlatformFamily::Cti, entity_type)
    }

    #[test]
    fn test_every_category_has_an_endpoint() {
        for category in PlatformFamily::Simulation.categories() {
            assert!(rest_path(category.entity_type).is_some(), "{}", category);
        }
        for category in PlatformFamily::Cti.categories() {
            assert!(
                graphql_connection(category.entity_type).is_some(),
                "{}",
                category
            );
        }
    }

    #[test]
    fn test_graphql_query_shape() {
        let query = graphql_connection(EntityType::AttackPattern)
            .unwrap()
            .query();
        assert!(query.contains("attackPatterns(first: $first, after: $after)"));
        assert!(query.contains("x_mitre_id"));
        assert!(query.contains("pageInfo { hasNextPage endCursor }"));
    }

    #[test]
    fn test_rest_items_accepts_page_object() {
        let items = rest_items(json!({ "content": [{ "team_id": "t" }, 3] })).unwrap();
        assert_eq!(items.len(), 1);
        assert!(rest_items(json!("nope")).is_err());
    }

    #[tokio::test]
    async fn test_unknown_platform() {
        let source = HttpEntitySource::new(&[]).unwrap();
        let err = source
            .fetch_category("ghost", sim(EntityType::Team))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Source(SourceError::UnknownPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_family_is_unsupported() {
        let source = HttpEntitySource::new(&[platform(
            "sim-1",
            PlatformFamily::Simulation,
            "http://127.0.0.1:1",
        )])
        .unwrap();
        let err = source
            .fetch_category("sim-1", cti(EntityType::Malware))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Source(SourceError::UnsupportedCategory { .. })
        ));
    }

    #[tokio::test]
    async fn test_rest_fetch_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/endpoints")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"endpoint_id":"e-1","endpoint_name":"web01"}]"#)
            .create_async()
            .await;

        let source =
            HttpEntitySource::new(&[platform("sim-1", PlatformFamily::Simulation, &server.url())])
                .unwrap();
        let items = source
            .fetch_category("sim-1", sim(EntityType::Asset))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text(&["endpoint_name"]), Some("web01".to_string()));
    }

    #[tokio::test]
    async fn test_rest_status_mapping() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/teams")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/api/players")
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let source =
            HttpEntitySource::new(&[platform("sim-1", PlatformFamily::Simulation, &server.url())])
                .unwrap();

        let err = source
            .fetch_category("sim-1", sim(EntityType::Team))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Source(SourceError::Unauthorized)
        ));

        let err = source
            .fetch_category("sim-1", sim(EntityType::Player))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_rate_limit_activates_platform_limiter() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/findings")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let source =
            HttpEntitySource::new(&[platform("sim-1", PlatformFamily::Simulation, &server.url())])
                .unwrap();
        let err = source
            .fetch_category("sim-1", sim(EntityType::Finding))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::Error::Source(SourceError::RateLimit(d)) if d == Duration::from_secs(7)
        ));
        assert!(source.rate_limiters.is_active("sim-1").await);
    }

    #[tokio::test]
    async fn test_graphql_follows_cursor() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({ "variables": { "after": null } })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "data": { "malwares": {
                    "edges": [{ "node": { "id": "m-1", "name": "Emotet", "aliases": ["Geodo"] } }],
                    "pageInfo": { "hasNextPage": true, "endCursor": "c1" }
                }}})
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({ "variables": { "after": "c1" } })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "data": { "malwares": {
                    "edges": [{ "node": { "id": "m-2", "name": "TrickBot" } }],
                    "pageInfo": { "hasNextPage": false, "endCursor": "c2" }
                }}})
                .to_string(),
            )
            .create_async()
            .await;

        let source =
            HttpEntitySource::new(&[platform("cti-1", PlatformFamily::Cti, &server.url())])
                .unwrap();
        let items = source
            .fetch_category("cti-1", cti(EntityType::Malware))
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text(&["name"]), Some("TrickBot".to_string()));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_invalid_responses() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":null,"errors":[{"message":"ForbiddenAccess"}]}"#)
            .create_async()
            .await;

        let source =
            HttpEntitySource::new(&[platform("cti-1", PlatformFamily::Cti, &server.url())])
                .unwrap();
        let err = source
            .fetch_category("cti-1", cti(EntityType::Sector))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ForbiddenAccess"));
    }
}
