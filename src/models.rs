use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain name used by the server to address its default domain.
pub const DEFAULT_DOMAIN: &str = "DEFAULT";

/// Reason why an orphan visit could not be matched to a short URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanVisitType {
    BaseUrl,
    InvalidShortUrl,
    Regular404,
}

impl OrphanVisitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanVisitType::BaseUrl => "base_url",
            OrphanVisitType::InvalidShortUrl => "invalid_short_url",
            OrphanVisitType::Regular404 => "regular_404",
        }
    }
}

/// Geolocation resolved by the server for a visit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitLocation {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub region_name: Option<String>,
    pub city_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

/// A single recorded visit. Never mutated once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub visit_location: Option<VisitLocation>,
    #[serde(default)]
    pub potential_bot: bool,
    /// Only present for orphan visits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visited_url: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub orphan_type: Option<OrphanVisitType>,
}

impl Visit {
    /// Create a plain, non-orphan visit at the given date.
    pub fn at(date: DateTime<Utc>) -> Self {
        Self {
            date,
            referer: None,
            user_agent: None,
            visit_location: None,
            potential_bot: false,
            visited_url: None,
            orphan_type: None,
        }
    }

    /// Create an orphan visit for the given visited URL.
    pub fn orphan_at(date: DateTime<Utc>, visited_url: &str, orphan_type: OrphanVisitType) -> Self {
        Self {
            visited_url: Some(visited_url.to_string()),
            orphan_type: Some(orphan_type),
            ..Self::at(date)
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.visited_url.is_some()
    }
}

/// Pagination metadata returned alongside every page of visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub pages_count: u32,
    pub total_items: u64,
}

impl Pagination {
    pub fn is_last_page(&self) -> bool {
        self.current_page >= self.pages_count
    }
}

/// One page of visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitsList {
    pub data: Vec<Visit>,
    pub pagination: Pagination,
}

/// Inclusive date range. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start_date: Option<DateTime<Utc>>, end_date: Option<DateTime<Utc>>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none()
    }

    pub fn contains(&self, date: &DateTime<Utc>) -> bool {
        crate::dates::is_between(date, self.start_date.as_ref(), self.end_date.as_ref())
    }
}

/// Filter describing which visits a load operation should return.
///
/// Paging is not part of the query; the loader decides page numbers and sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitsQuery {
    pub date_range: DateRange,
    pub exclude_bots: bool,
    /// Only meaningful for orphan visits.
    pub orphan_type: Option<OrphanVisitType>,
}

impl VisitsQuery {
    pub fn with_date_range(date_range: DateRange) -> Self {
        Self {
            date_range,
            ..Self::default()
        }
    }

    /// No narrowing bound is set.
    pub fn is_empty(&self) -> bool {
        self.date_range.is_empty() && !self.exclude_bots && self.orphan_type.is_none()
    }

    /// At least a start date is set.
    pub fn is_strict(&self) -> bool {
        self.date_range.start_date.is_some()
    }
}

/// Short URL reference carried by live "visit created" events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlRef {
    pub short_code: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A visit pushed by the server right after it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedVisit {
    #[serde(default)]
    pub short_url: Option<ShortUrlRef>,
    pub visit: Visit,
}

/// Owning entity a set of visits belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VisitsScope {
    ShortUrl {
        short_code: String,
        domain: Option<String>,
    },
    Tag(String),
    Domain(String),
    Orphan,
    /// Every visit attached to a short URL.
    NonOrphan,
}

impl VisitsScope {
    pub fn short_url(short_code: impl Into<String>, domain: Option<&str>) -> Self {
        VisitsScope::ShortUrl {
            short_code: short_code.into(),
            domain: domain.map(str::to_string),
        }
    }

    /// Whether a live event belongs to this scope, ignoring dates.
    pub fn owns(&self, created: &CreatedVisit) -> bool {
        match self {
            VisitsScope::Orphan => created.visit.is_orphan(),
            VisitsScope::NonOrphan => !created.visit.is_orphan(),
            VisitsScope::ShortUrl { short_code, domain } => {
                created.short_url.as_ref().is_some_and(|short_url| {
                    &short_url.short_code == short_code && short_url.domain == *domain
                })
            }
            VisitsScope::Tag(tag) => created
                .short_url
                .as_ref()
                .is_some_and(|short_url| short_url.tags.iter().any(|t| t == tag)),
            VisitsScope::Domain(domain) => {
                created
                    .short_url
                    .as_ref()
                    .is_some_and(|short_url| match &short_url.domain {
                        Some(short_url_domain) => short_url_domain == domain,
                        None => domain == DEFAULT_DOMAIN,
                    })
            }
        }
    }
}

impl fmt::Display for VisitsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitsScope::ShortUrl {
                short_code,
                domain: Some(domain),
            } => write!(f, "short URL {}/{}", domain, short_code),
            VisitsScope::ShortUrl {
                short_code,
                domain: None,
            } => write!(f, "short URL {}", short_code),
            VisitsScope::Tag(tag) => write!(f, "tag {}", tag),
            VisitsScope::Domain(domain) => write!(f, "domain {}", domain),
            VisitsScope::Orphan => write!(f, "orphan visits"),
            VisitsScope::NonOrphan => write!(f, "non-orphan visits"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn created(short_url: Option<ShortUrlRef>) -> CreatedVisit {
        let date = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        CreatedVisit {
            short_url,
            visit: Visit::at(date),
        }
    }

    fn short_url(code: &str, domain: Option<&str>, tags: &[&str]) -> ShortUrlRef {
        ShortUrlRef {
            short_code: code.to_string(),
            domain: domain.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_visit_deserializes_server_payload() {
        let json = r#"{
            "referer": "https://google.com",
            "date": "2024-01-10T08:30:00+02:00",
            "userAgent": "Mozilla/5.0",
            "visitLocation": {
                "countryCode": "ES",
                "countryName": "Spain",
                "regionName": "Madrid",
                "cityName": "Madrid",
                "latitude": 40.4,
                "longitude": -3.7,
                "timezone": "Europe/Madrid",
                "isEmpty": false
            },
            "potentialBot": false
        }"#;

        let visit: Visit = serde_json::from_str(json).unwrap();
        assert_eq!(visit.date, Utc.with_ymd_and_hms(2024, 1, 10, 6, 30, 0).unwrap());
        assert_eq!(visit.referer.as_deref(), Some("https://google.com"));
        assert_eq!(
            visit.visit_location.as_ref().unwrap().city_name.as_deref(),
            Some("Madrid")
        );
        assert!(!visit.is_orphan());
    }

    #[test]
    fn test_orphan_visit_deserializes_type() {
        let json = r#"{
            "date": "2024-01-10T08:30:00Z",
            "potentialBot": true,
            "visitedUrl": "https://s.test/foo",
            "type": "regular_404",
            "visitLocation": null
        }"#;

        let visit: Visit = serde_json::from_str(json).unwrap();
        assert!(visit.is_orphan());
        assert!(visit.potential_bot);
        assert_eq!(visit.orphan_type, Some(OrphanVisitType::Regular404));
    }

    #[test]
    fn test_query_strictness() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(VisitsQuery::default().is_empty());
        assert!(!VisitsQuery::default().is_strict());

        let until = VisitsQuery::with_date_range(DateRange::new(None, Some(date)));
        assert!(!until.is_empty());
        assert!(!until.is_strict());

        let since = VisitsQuery::with_date_range(DateRange::new(Some(date), None));
        assert!(since.is_strict());
    }

    #[test]
    fn test_short_url_scope_requires_same_domain() {
        let scope = VisitsScope::short_url("abc123", Some("s.test"));

        assert!(scope.owns(&created(Some(short_url("abc123", Some("s.test"), &[])))));
        assert!(!scope.owns(&created(Some(short_url("abc123", None, &[])))));
        assert!(!scope.owns(&created(Some(short_url("def456", Some("s.test"), &[])))));
        assert!(!scope.owns(&created(None)));
    }

    #[test]
    fn test_tag_scope_matches_membership() {
        let scope = VisitsScope::Tag("foo".to_string());

        assert!(scope.owns(&created(Some(short_url("a", None, &["bar", "foo"])))));
        assert!(!scope.owns(&created(Some(short_url("a", None, &["bar"])))));
    }

    #[test]
    fn test_default_domain_scope_matches_short_urls_without_domain() {
        let default_scope = VisitsScope::Domain(DEFAULT_DOMAIN.to_string());
        let custom_scope = VisitsScope::Domain("s.test".to_string());
        let without_domain = created(Some(short_url("a", None, &[])));
        let with_domain = created(Some(short_url("a", Some("s.test"), &[])));

        assert!(default_scope.owns(&without_domain));
        assert!(!default_scope.owns(&with_domain));
        assert!(custom_scope.owns(&with_domain));
        assert!(!custom_scope.owns(&without_domain));
    }

    #[test]
    fn test_orphan_scopes_split_by_kind() {
        let date = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let orphan = CreatedVisit {
            short_url: None,
            visit: Visit::orphan_at(date, "https://s.test", OrphanVisitType::BaseUrl),
        };
        let regular = created(Some(short_url("a", None, &[])));

        assert!(VisitsScope::Orphan.owns(&orphan));
        assert!(!VisitsScope::Orphan.owns(&regular));
        assert!(VisitsScope::NonOrphan.owns(&regular));
        assert!(!VisitsScope::NonOrphan.owns(&orphan));
    }
}
