//! Suggests a wider date interval when a filtered load came back empty.

use chrono::{DateTime, TimeZone};

use crate::api::{ApiError, VisitsSource};
use crate::dates::{DateInterval, date_to_matching_interval};
use crate::models::{Visit, VisitsQuery};

/// Fetch the most recent visit, ignoring any date filter.
///
/// Resolves to `None` without touching the source when `enabled` is false.
pub async fn resolve_last_visit<S>(
    source: &S,
    enabled: bool,
    exclude_bots: bool,
) -> Result<Option<Visit>, ApiError>
where
    S: VisitsSource + ?Sized,
{
    if !enabled {
        return Ok(None);
    }

    let query = VisitsQuery {
        exclude_bots,
        ..VisitsQuery::default()
    };
    let list = source.fetch_page(&query, 1, 1).await?;
    Ok(list.data.into_iter().next())
}

/// Narrowest named interval containing the last visit, if there is one.
pub fn fallback_interval<Tz: TimeZone>(
    last_visit: Option<&Visit>,
    now: &DateTime<Tz>,
) -> Option<DateInterval> {
    last_visit.map(|visit| date_to_matching_interval(&visit.date, now))
}
