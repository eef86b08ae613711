//! Loading state for one visits view and the pure transitions applied to it.

use std::sync::{Arc, Mutex};

use crate::api::ApiError;
use crate::dates::DateInterval;
use crate::models::{CreatedVisit, Visit, VisitsQuery, VisitsScope};
use crate::traits::VisitsSink;

/// Payload of a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitsLoaded {
    pub visits: Vec<Visit>,
    pub query: VisitsQuery,
    /// Visits of the preceding period, when it was requested and possible.
    pub prev_visits: Option<Vec<Visit>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisitsEvent {
    Started,
    MarkLarge,
    ProgressChanged(f64),
    Cancelled,
    Rejected(ApiError),
    Fulfilled(VisitsLoaded),
    FallbackToInterval(DateInterval),
    /// Visits pushed by the server, in arrival order.
    VisitsCreated(Vec<CreatedVisit>),
    /// Visits of a scope were deleted server-side.
    VisitsDeleted(VisitsScope),
}

/// State of the visits held by one view.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitsInfo {
    pub scope: VisitsScope,
    pub visits: Vec<Visit>,
    pub prev_visits: Option<Vec<Visit>>,
    pub loading: bool,
    pub loading_large: bool,
    /// `None` until a multi-batch load starts.
    pub progress: Option<f64>,
    pub cancel_load: bool,
    pub error: bool,
    pub error_data: Option<ApiError>,
    pub query: VisitsQuery,
    pub fallback_interval: Option<DateInterval>,
}

impl VisitsInfo {
    pub fn new(scope: VisitsScope) -> Self {
        Self {
            scope,
            visits: Vec::new(),
            prev_visits: None,
            loading: false,
            loading_large: false,
            progress: None,
            cancel_load: false,
            error: false,
            error_data: None,
            query: VisitsQuery::default(),
            fallback_interval: None,
        }
    }

    /// Whether a live event should be merged into this state.
    pub fn accepts(&self, created: &CreatedVisit) -> bool {
        if !self.scope.owns(created) {
            return false;
        }
        if let (VisitsScope::Orphan, Some(orphan_type)) = (&self.scope, self.query.orphan_type) {
            if created.visit.orphan_type != Some(orphan_type) {
                return false;
            }
        }
        self.query.date_range.contains(&created.visit.date)
    }
}

/// Apply one event to `state`, returning the new state.
pub fn reduce(state: VisitsInfo, event: VisitsEvent) -> VisitsInfo {
    match event {
        VisitsEvent::Started => VisitsInfo {
            loading: true,
            error: false,
            error_data: None,
            cancel_load: false,
            progress: None,
            fallback_interval: None,
            ..state
        },
        VisitsEvent::MarkLarge => VisitsInfo {
            loading_large: true,
            progress: Some(0.0),
            ..state
        },
        VisitsEvent::ProgressChanged(progress) => VisitsInfo {
            progress: Some(progress),
            ..state
        },
        VisitsEvent::Cancelled => VisitsInfo {
            cancel_load: true,
            ..state
        },
        VisitsEvent::Rejected(err) => VisitsInfo {
            loading: false,
            loading_large: false,
            error: true,
            error_data: Some(err),
            ..state
        },
        VisitsEvent::Fulfilled(loaded) => VisitsInfo {
            loading: false,
            loading_large: false,
            error: false,
            error_data: None,
            visits: loaded.visits,
            query: loaded.query,
            prev_visits: loaded.prev_visits,
            ..state
        },
        VisitsEvent::FallbackToInterval(interval) => VisitsInfo {
            fallback_interval: Some(interval),
            ..state
        },
        VisitsEvent::VisitsCreated(created) => {
            let mut new_visits: Vec<Visit> = created
                .into_iter()
                .filter(|created| state.accepts(created))
                .map(|created| created.visit)
                .collect();
            if new_visits.is_empty() {
                return state;
            }
            new_visits.extend(state.visits);
            VisitsInfo {
                visits: new_visits,
                ..state
            }
        }
        VisitsEvent::VisitsDeleted(scope) if scope == state.scope => VisitsInfo {
            visits: Vec::new(),
            ..state
        },
        VisitsEvent::VisitsDeleted(_) => state,
    }
}

/// Shared, mutable holder of a [`VisitsInfo`] that applies events in arrival
/// order.
#[derive(Debug, Clone)]
pub struct VisitsStore {
    state: Arc<Mutex<VisitsInfo>>,
}

impl VisitsStore {
    pub fn new(scope: VisitsScope) -> Self {
        Self {
            state: Arc::new(Mutex::new(VisitsInfo::new(scope))),
        }
    }

    pub fn snapshot(&self) -> VisitsInfo {
        self.lock().clone()
    }

    /// Request cancellation of the running load.
    pub fn cancel(&self) {
        self.dispatch(VisitsEvent::Cancelled);
    }

    /// Drop everything but the scope, e.g. when the query changes.
    pub fn reset(&self) {
        let mut state = self.lock();
        let scope = state.scope.clone();
        *state = VisitsInfo::new(scope);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VisitsInfo> {
        // A panic while reducing leaves the previous state in place
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl VisitsSink for VisitsStore {
    fn dispatch(&self, event: VisitsEvent) {
        let mut state = self.lock();
        let placeholder = VisitsInfo::new(state.scope.clone());
        let current = std::mem::replace(&mut *state, placeholder);
        *state = reduce(current, event);
    }

    fn should_cancel(&self) -> bool {
        self.lock().cancel_load
    }
}
