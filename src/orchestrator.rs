//! Entry point for loading the visits of one scope into a [`VisitsSink`].

use std::sync::Arc;

use futures::future::try_join;

use crate::api::{ApiError, VisitsSource};
use crate::dates::calc_prev_date_range;
use crate::fallback::{fallback_interval, resolve_last_visit};
use crate::loader::{BatchLoader, Progress};
use crate::models::{Visit, VisitsQuery};
use crate::reducer::{VisitsEvent, VisitsLoaded};
use crate::traits::{Clock, VisitsSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// When the load comes back empty, look up the most recent visit and
    /// suggest the narrowest interval that contains it.
    pub do_interval_fallback: bool,
    /// Also load the period right before the query's date range.
    pub load_prev_interval: bool,
}

/// Loads every page of a query and reports the lifecycle as events.
pub struct VisitsLoader<S> {
    source: S,
    batch_loader: BatchLoader,
    clock: Arc<dyn Clock>,
}

impl<S: VisitsSource> VisitsLoader<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            batch_loader: BatchLoader::default(),
            clock,
        }
    }

    pub fn with_batch_loader(mut self, batch_loader: BatchLoader) -> Self {
        self.batch_loader = batch_loader;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load `query`, dispatching `Started` followed by either `Fulfilled` or
    /// `Rejected`. Progress, large-load and fallback events come in between.
    pub async fn load(&self, query: VisitsQuery, options: LoadOptions, sink: &dyn VisitsSink) {
        sink.dispatch(VisitsEvent::Started);

        match self.try_load(&query, options, sink).await {
            Ok(loaded) => {
                tracing::info!(
                    visits = loaded.visits.len(),
                    prev_visits = loaded.prev_visits.as_ref().map(Vec::len),
                    "Visits loaded"
                );
                sink.dispatch(VisitsEvent::Fulfilled(loaded));
            }
            Err(err) => {
                tracing::error!("Failed to load visits: {}", err);
                sink.dispatch(VisitsEvent::Rejected(err));
            }
        }
    }

    async fn try_load(
        &self,
        query: &VisitsQuery,
        options: LoadOptions,
        sink: &dyn VisitsSink,
    ) -> Result<VisitsLoaded, ApiError> {
        let now = self.clock.now_local();

        let visits = self.batch_loader.load_all(
            &self.source,
            query,
            |progress| match progress {
                Progress::LargeLoad => sink.dispatch(VisitsEvent::MarkLarge),
                Progress::Changed(value) => sink.dispatch(VisitsEvent::ProgressChanged(value)),
            },
            || sink.should_cancel(),
        );

        let prev_range = options
            .load_prev_interval
            .then(|| calc_prev_date_range(&query.date_range, &now))
            .flatten();
        let prev_visits = async {
            let Some(date_range) = prev_range else {
                return Ok(None);
            };
            tracing::debug!(?date_range, "Loading previous period");
            let prev_query = VisitsQuery {
                date_range,
                ..query.clone()
            };
            self.batch_loader
                .load_all(&self.source, &prev_query, |_| {}, || sink.should_cancel())
                .await
                .map(Some)
        };

        let (visits, prev_visits): (Vec<Visit>, Option<Vec<Visit>>) =
            try_join(visits, prev_visits).await?;

        if options.do_interval_fallback && visits.is_empty() {
            let last_visit = resolve_last_visit(&self.source, true, query.exclude_bots).await?;
            if let Some(interval) = fallback_interval(last_visit.as_ref(), &now) {
                tracing::debug!(%interval, "No visits in range, suggesting wider interval");
                sink.dispatch(VisitsEvent::FallbackToInterval(interval));
            }
        }

        Ok(VisitsLoaded {
            visits,
            query: query.clone(),
            prev_visits,
        })
    }
}
