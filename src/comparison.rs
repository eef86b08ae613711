//! Side-by-side loading of several scopes with the same query.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::try_join_all;

use crate::api::{ApiError, VisitsSource};
use crate::loader::BatchLoader;
use crate::models::{CreatedVisit, Visit, VisitsQuery, VisitsScope};

/// Key a scope's visits are grouped under: the tag or domain name itself,
/// otherwise the scope description.
pub fn group_key(scope: &VisitsScope) -> String {
    match scope {
        VisitsScope::Tag(tag) => tag.clone(),
        VisitsScope::Domain(domain) => domain.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonEvent {
    Started,
    ProgressChanged(f64),
    Cancelled,
    Rejected(ApiError),
    Fulfilled {
        visits_groups: BTreeMap<String, Vec<Visit>>,
        query: VisitsQuery,
    },
    VisitsCreated(Vec<CreatedVisit>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisitsComparisonInfo {
    pub scopes: Vec<VisitsScope>,
    pub visits_groups: BTreeMap<String, Vec<Visit>>,
    pub loading: bool,
    pub progress: Option<f64>,
    pub cancel_load: bool,
    pub error_data: Option<ApiError>,
    pub query: VisitsQuery,
}

impl VisitsComparisonInfo {
    pub fn new(scopes: Vec<VisitsScope>) -> Self {
        Self {
            scopes,
            visits_groups: BTreeMap::new(),
            loading: false,
            progress: None,
            cancel_load: false,
            error_data: None,
            query: VisitsQuery::default(),
        }
    }
}

pub fn reduce_comparison(state: VisitsComparisonInfo, event: ComparisonEvent) -> VisitsComparisonInfo {
    match event {
        ComparisonEvent::Started => VisitsComparisonInfo {
            loading: true,
            cancel_load: false,
            error_data: None,
            ..state
        },
        ComparisonEvent::ProgressChanged(progress) => VisitsComparisonInfo {
            progress: Some(progress),
            ..state
        },
        ComparisonEvent::Cancelled => VisitsComparisonInfo {
            cancel_load: true,
            ..state
        },
        ComparisonEvent::Rejected(err) => VisitsComparisonInfo {
            loading: false,
            error_data: Some(err),
            ..state
        },
        ComparisonEvent::Fulfilled {
            visits_groups,
            query,
        } => VisitsComparisonInfo {
            loading: false,
            error_data: None,
            visits_groups,
            query,
            ..state
        },
        ComparisonEvent::VisitsCreated(created) => {
            let mut state = state;
            let keys: BTreeSet<String> = state.scopes.iter().map(group_key).collect();
            for key in keys {
                // Scopes sharing a key feed the same group, so each visit counts once
                let owners: Vec<&VisitsScope> = state
                    .scopes
                    .iter()
                    .filter(|scope| group_key(scope) == key)
                    .collect();
                let mut new_visits: Vec<Visit> = created
                    .iter()
                    .filter(|c| {
                        owners.iter().any(|scope| scope.owns(c))
                            && state.query.date_range.contains(&c.visit.date)
                    })
                    .map(|c| c.visit.clone())
                    .collect();
                if new_visits.is_empty() {
                    continue;
                }
                if let Some(group) = state.visits_groups.get_mut(&key) {
                    new_visits.append(group);
                    *group = new_visits;
                }
            }
            state
        }
    }
}

/// Shared holder of a [`VisitsComparisonInfo`].
#[derive(Debug, Clone)]
pub struct ComparisonStore {
    state: Arc<Mutex<VisitsComparisonInfo>>,
}

impl ComparisonStore {
    pub fn new(scopes: Vec<VisitsScope>) -> Self {
        Self {
            state: Arc::new(Mutex::new(VisitsComparisonInfo::new(scopes))),
        }
    }

    pub fn snapshot(&self) -> VisitsComparisonInfo {
        self.lock().clone()
    }

    pub fn cancel(&self) {
        self.dispatch(ComparisonEvent::Cancelled);
    }

    pub fn dispatch(&self, event: ComparisonEvent) {
        let mut state = self.lock();
        let placeholder = VisitsComparisonInfo::new(Vec::new());
        let current = std::mem::replace(&mut *state, placeholder);
        *state = reduce_comparison(current, event);
    }

    pub fn should_cancel(&self) -> bool {
        self.lock().cancel_load
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VisitsComparisonInfo> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Loads one group per source, all with the same query.
pub struct ComparisonLoader {
    batch_loader: BatchLoader,
}

impl ComparisonLoader {
    pub fn new(batch_loader: BatchLoader) -> Self {
        Self { batch_loader }
    }

    /// Groups load concurrently; progress reports finished groups.
    pub async fn load<S: VisitsSource>(
        &self,
        sources: &[(VisitsScope, S)],
        query: VisitsQuery,
        store: &ComparisonStore,
    ) {
        store.dispatch(ComparisonEvent::Started);

        let total = sources.len().max(1);
        let finished = AtomicUsize::new(0);

        let loads = sources.iter().map(|(scope, source)| {
            let finished = &finished;
            let query = &query;
            async move {
                let visits = self
                    .batch_loader
                    .load_all(source, query, |_| {}, || store.should_cancel())
                    .await?;
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                store.dispatch(ComparisonEvent::ProgressChanged(
                    (done as f64 * 100.0) / total as f64,
                ));
                Ok::<_, ApiError>((group_key(scope), visits))
            }
        });

        let result = try_join_all(loads).await;
        match result {
            Ok(groups) => {
                tracing::info!(groups = groups.len(), "Visits comparison loaded");
                store.dispatch(ComparisonEvent::Fulfilled {
                    visits_groups: groups.into_iter().collect(),
                    query,
                });
            }
            Err(err) => {
                tracing::error!("Failed to load visits comparison: {}", err);
                store.dispatch(ComparisonEvent::Rejected(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::models::{DateRange, ShortUrlRef};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn loaded_state(date_range: DateRange) -> VisitsComparisonInfo {
        let visits = vec![Visit::at(now() - Duration::days(20)); 2];
        VisitsComparisonInfo {
            visits_groups: BTreeMap::from([
                ("foo".to_string(), visits.clone()),
                ("bar".to_string(), visits),
            ]),
            query: VisitsQuery::with_date_range(date_range),
            ..VisitsComparisonInfo::new(vec![
                VisitsScope::Tag("foo".to_string()),
                VisitsScope::Tag("bar".to_string()),
            ])
        }
    }

    fn created_with_tag(tag: &str) -> CreatedVisit {
        CreatedVisit {
            short_url: Some(ShortUrlRef {
                short_code: "abc123".to_string(),
                domain: None,
                tags: vec![tag.to_string()],
            }),
            visit: Visit::at(now()),
        }
    }

    #[test]
    fn test_group_keys() {
        assert_eq!(group_key(&VisitsScope::Tag("foo".to_string())), "foo");
        assert_eq!(group_key(&VisitsScope::Domain("s.test".to_string())), "s.test");
        assert_eq!(group_key(&VisitsScope::Orphan), "orphan visits");
    }

    #[test]
    fn test_created_visits_prepended_to_matching_group() {
        let now = now();
        let cases = [
            (DateRange::default(), "foo", 3, 2),
            (DateRange::default(), "bar", 2, 3),
            (DateRange::default(), "baz", 2, 2),
            (DateRange::new(None, Some(now - Duration::days(1))), "foo", 2, 2),
            (DateRange::new(Some(now + Duration::days(1)), None), "foo", 2, 2),
            (
                DateRange::new(Some(now - Duration::days(5)), Some(now + Duration::days(3))),
                "bar",
                2,
                3,
            ),
        ];

        for (date_range, tag, expected_foo, expected_bar) in cases {
            let state = reduce_comparison(
                loaded_state(date_range),
                ComparisonEvent::VisitsCreated(vec![created_with_tag(tag)]),
            );

            assert_eq!(state.visits_groups["foo"].len(), expected_foo, "tag {}", tag);
            assert_eq!(state.visits_groups["bar"].len(), expected_bar, "tag {}", tag);
            if expected_foo == 3 {
                assert_eq!(state.visits_groups["foo"][0].date, now);
            }
        }
    }

    #[test]
    fn test_scopes_sharing_a_group_merge_once() {
        let state = VisitsComparisonInfo {
            visits_groups: BTreeMap::from([("foo".to_string(), Vec::new())]),
            ..VisitsComparisonInfo::new(vec![
                VisitsScope::Tag("foo".to_string()),
                VisitsScope::Tag("foo".to_string()),
            ])
        };

        let state = reduce_comparison(
            state,
            ComparisonEvent::VisitsCreated(vec![created_with_tag("foo")]),
        );

        assert_eq!(state.visits_groups["foo"].len(), 1);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let state = VisitsComparisonInfo::new(vec![VisitsScope::Tag("foo".to_string())]);

        let state = reduce_comparison(state, ComparisonEvent::Started);
        assert!(state.loading);

        let state = reduce_comparison(state, ComparisonEvent::ProgressChanged(50.0));
        assert_eq!(state.progress, Some(50.0));

        let state = reduce_comparison(
            state,
            ComparisonEvent::Rejected(ApiError::Transport("connection reset".to_string())),
        );
        assert!(!state.loading);
        assert!(state.error_data.is_some());

        let state = reduce_comparison(state, ComparisonEvent::Started);
        assert!(state.error_data.is_none());
    }
}
