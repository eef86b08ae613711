use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{NetworkConfig, ServerConfig};
use crate::models::{VisitsList, VisitsQuery, VisitsScope};

const API_VERSION: u8 = 3;
const API_KEY_HEADER: &str = "X-Api-Key";

/// RFC 7807 error body returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    #[serde(default)]
    pub detail: String,
    pub status: u16,
}

/// Failure of a single visits request.
///
/// Kept cloneable so it can be stored in loading state as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{} ({}): {}", .0.title, .0.status, .0.detail)]
    Problem(ProblemDetails),
    #[error("API returned error status: {status}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to parse visits response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Fetches single pages of visits for one owning scope.
#[async_trait]
pub trait VisitsSource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &VisitsQuery,
        page: u32,
        items_per_page: u32,
    ) -> Result<VisitsList, ApiError>;
}

#[async_trait]
impl<S: VisitsSource + ?Sized> VisitsSource for &S {
    async fn fetch_page(
        &self,
        query: &VisitsQuery,
        page: u32,
        items_per_page: u32,
    ) -> Result<VisitsList, ApiError> {
        (**self).fetch_page(query, page, items_per_page).await
    }
}

pub(crate) fn validate_page(page: u32, items_per_page: u32) -> Result<(), ApiError> {
    if page < 1 {
        return Err(ApiError::InvalidRequest(format!("page must be >= 1, got {}", page)));
    }
    if items_per_page < 1 {
        return Err(ApiError::InvalidRequest(format!(
            "items per page must be >= 1, got {}",
            items_per_page
        )));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct VisitsEnvelope {
    visits: VisitsList,
}

/// REST client for the visits endpoints of a Shlink server.
#[derive(Clone, Debug)]
pub struct ShlinkApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ShlinkApiClient {
    /// Create a new API client with configurable timeouts.
    pub fn new(server: &ServerConfig, network_config: &NetworkConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: server.url.trim_end_matches('/').to_string(),
            api_key: server.api_key.clone(),
        })
    }

    /// Bind the client to one owning scope.
    pub fn scoped(&self, scope: VisitsScope) -> ScopedVisits {
        ScopedVisits {
            client: self.clone(),
            scope,
        }
    }

    fn visits_url(&self, scope: &VisitsScope) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{}/rest/v{}/", self.base_url, API_VERSION))
            .with_context(|| format!("Invalid server URL: {}", self.base_url))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Server URL cannot be a base: {}", self.base_url))?;
            segments.pop_if_empty();
            match scope {
                VisitsScope::ShortUrl { short_code, .. } => {
                    segments.extend(["short-urls", short_code.as_str(), "visits"]);
                }
                VisitsScope::Tag(tag) => {
                    segments.extend(["tags", tag.as_str(), "visits"]);
                }
                VisitsScope::Domain(domain) => {
                    segments.extend(["domains", domain.as_str(), "visits"]);
                }
                VisitsScope::Orphan => {
                    segments.extend(["visits", "orphan"]);
                }
                VisitsScope::NonOrphan => {
                    segments.extend(["visits", "non-orphan"]);
                }
            }
        }
        Ok(url)
    }

    /// Fetch one page of visits for `scope`.
    pub async fn list_visits(
        &self,
        scope: &VisitsScope,
        query: &VisitsQuery,
        page: u32,
        items_per_page: u32,
    ) -> Result<VisitsList, ApiError> {
        validate_page(page, items_per_page)?;

        let mut url = self
            .visits_url(scope)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(query_params(scope, query, page, items_per_page));

        tracing::debug!(%scope, page, items_per_page, "Requesting visits page");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ProblemDetails>(&body) {
                Ok(problem) => ApiError::Problem(problem),
                Err(_) => ApiError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let envelope = response.json::<VisitsEnvelope>().await?;
        Ok(envelope.visits)
    }
}

fn query_params(
    scope: &VisitsScope,
    query: &VisitsQuery,
    page: u32,
    items_per_page: u32,
) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", page.to_string()),
        ("itemsPerPage", items_per_page.to_string()),
    ];

    if let VisitsScope::ShortUrl {
        domain: Some(domain),
        ..
    } = scope
    {
        params.push(("domain", domain.clone()));
    }
    if let Some(start) = query.date_range.start_date {
        params.push(("startDate", start.to_rfc3339()));
    }
    if let Some(end) = query.date_range.end_date {
        params.push(("endDate", end.to_rfc3339()));
    }
    if query.exclude_bots {
        params.push(("excludeBots", "true".to_string()));
    }
    if let (VisitsScope::Orphan, Some(orphan_type)) = (scope, query.orphan_type) {
        params.push(("type", orphan_type.as_str().to_string()));
    }

    params
}

/// [`ShlinkApiClient`] bound to one scope, usable as a [`VisitsSource`].
#[derive(Clone, Debug)]
pub struct ScopedVisits {
    client: ShlinkApiClient,
    scope: VisitsScope,
}

impl ScopedVisits {
    pub fn scope(&self) -> &VisitsScope {
        &self.scope
    }
}

#[async_trait]
impl VisitsSource for ScopedVisits {
    async fn fetch_page(
        &self,
        query: &VisitsQuery,
        page: u32,
        items_per_page: u32,
    ) -> Result<VisitsList, ApiError> {
        self.client
            .list_visits(&self.scope, query, page, items_per_page)
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::{DateRange, OrphanVisitType};

    fn client(url: &str) -> ShlinkApiClient {
        let server = ServerConfig {
            url: url.to_string(),
            api_key: "secret".to_string(),
        };
        ShlinkApiClient::new(&server, &NetworkConfig::default()).unwrap()
    }

    // ==================== URL Building Tests ====================

    #[test]
    fn test_visits_url_per_scope() {
        let client = client("https://s.test/");
        let cases = [
            (VisitsScope::short_url("abc123", Some("s.test")), "https://s.test/rest/v3/short-urls/abc123/visits"),
            (VisitsScope::Tag("foo".to_string()), "https://s.test/rest/v3/tags/foo/visits"),
            (VisitsScope::Domain("DEFAULT".to_string()), "https://s.test/rest/v3/domains/DEFAULT/visits"),
            (VisitsScope::Orphan, "https://s.test/rest/v3/visits/orphan"),
            (VisitsScope::NonOrphan, "https://s.test/rest/v3/visits/non-orphan"),
        ];

        for (scope, expected) in cases {
            assert_eq!(client.visits_url(&scope).unwrap().as_str(), expected);
        }
    }

    #[test]
    fn test_visits_url_escapes_tag() {
        let client = client("https://s.test");
        let url = client.visits_url(&VisitsScope::Tag("foo bar/baz".to_string())).unwrap();
        assert_eq!(url.as_str(), "https://s.test/rest/v3/tags/foo%20bar%2Fbaz/visits");
    }

    // ==================== Query Parameter Tests ====================

    #[test]
    fn test_query_params_minimal() {
        let params = query_params(&VisitsScope::NonOrphan, &VisitsQuery::default(), 2, 5000);
        assert_eq!(
            params,
            vec![("page", "2".to_string()), ("itemsPerPage", "5000".to_string())]
        );
    }

    #[test]
    fn test_query_params_full() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let query = VisitsQuery {
            date_range: DateRange::new(Some(start), None),
            exclude_bots: true,
            orphan_type: Some(OrphanVisitType::BaseUrl),
        };

        let params = query_params(&VisitsScope::Orphan, &query, 1, 1);

        assert!(params.contains(&("startDate", "2024-01-01T00:00:00+00:00".to_string())));
        assert!(params.contains(&("excludeBots", "true".to_string())));
        assert!(params.contains(&("type", "base_url".to_string())));
        assert!(!params.iter().any(|(key, _)| *key == "endDate"));
    }

    #[test]
    fn test_query_params_orphan_type_ignored_for_other_scopes() {
        let query = VisitsQuery {
            orphan_type: Some(OrphanVisitType::Regular404),
            ..VisitsQuery::default()
        };
        let params = query_params(&VisitsScope::Tag("foo".to_string()), &query, 1, 10);
        assert!(!params.iter().any(|(key, _)| *key == "type"));
    }

    #[test]
    fn test_query_params_short_url_domain() {
        let params = query_params(
            &VisitsScope::short_url("abc123", Some("s.test")),
            &VisitsQuery::default(),
            1,
            10,
        );
        assert!(params.contains(&("domain", "s.test".to_string())));
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_page_bounds() {
        assert!(validate_page(1, 1).is_ok());
        assert!(matches!(validate_page(0, 10), Err(ApiError::InvalidRequest(_))));
        assert!(matches!(validate_page(1, 0), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_problem_details_display() {
        let err = ApiError::Problem(ProblemDetails {
            error_type: "https://shlink.io/api/error/tag-not-found".to_string(),
            title: "Tag not found".to_string(),
            detail: "Tag with name \"foo\" could not be found".to_string(),
            status: 404,
        });
        let message = err.to_string();
        assert!(message.contains("Tag not found"));
        assert!(message.contains("404"));
    }

    #[test]
    fn test_api_client_creation() {
        let server = ServerConfig {
            url: "https://s.test".to_string(),
            api_key: "key".to_string(),
        };
        let config = NetworkConfig {
            request_timeout_secs: 60,
            connect_timeout_secs: 20,
        };
        assert!(ShlinkApiClient::new(&server, &config).is_ok());
    }
}
