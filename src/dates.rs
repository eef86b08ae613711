//! Named date intervals and date range helpers.
//!
//! Day boundaries are computed in the timezone of the `now` value passed in,
//! so callers decide whether "today" means local or UTC time (usually via
//! [`Clock::now_local`](crate::traits::Clock::now_local)).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::DateRange;

/// Canonical lookback windows, ordered narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateInterval {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    Last90Days,
    Last180Days,
    Last365Days,
    All,
}

impl DateInterval {
    pub const ALL_INTERVALS: [DateInterval; 8] = [
        DateInterval::Today,
        DateInterval::Yesterday,
        DateInterval::Last7Days,
        DateInterval::Last30Days,
        DateInterval::Last90Days,
        DateInterval::Last180Days,
        DateInterval::Last365Days,
        DateInterval::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateInterval::Today => "today",
            DateInterval::Yesterday => "yesterday",
            DateInterval::Last7Days => "last7Days",
            DateInterval::Last30Days => "last30Days",
            DateInterval::Last90Days => "last90Days",
            DateInterval::Last180Days => "last180Days",
            DateInterval::Last365Days => "last365Days",
            DateInterval::All => "all",
        }
    }

    /// Human-readable label. `All` has none since it applies no filter.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            DateInterval::Today => Some("Today"),
            DateInterval::Yesterday => Some("Yesterday"),
            DateInterval::Last7Days => Some("Last 7 days"),
            DateInterval::Last30Days => Some("Last 30 days"),
            DateInterval::Last90Days => Some("Last 90 days"),
            DateInterval::Last180Days => Some("Last 180 days"),
            DateInterval::Last365Days => Some("Last 365 days"),
            DateInterval::All => None,
        }
    }

    /// Number of days the interval reaches back from today, if bounded.
    fn days_back(&self) -> Option<u64> {
        match self {
            DateInterval::Today => Some(0),
            DateInterval::Yesterday => Some(1),
            DateInterval::Last7Days => Some(7),
            DateInterval::Last30Days => Some(30),
            DateInterval::Last90Days => Some(90),
            DateInterval::Last180Days => Some(180),
            DateInterval::Last365Days => Some(365),
            DateInterval::All => None,
        }
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown date interval: {0}")]
pub struct UnknownInterval(String);

impl FromStr for DateInterval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_INTERVALS
            .into_iter()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| UnknownInterval(s.to_string()))
    }
}

/// Inclusive containment check where a missing bound is unbounded.
pub fn is_between(
    date: &DateTime<Utc>,
    start: Option<&DateTime<Utc>>,
    end: Option<&DateTime<Utc>>,
) -> bool {
    start.is_none_or(|start| start <= date) && end.is_none_or(|end| date <= end)
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn end_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN) + Duration::days(1) - Duration::milliseconds(1);
    tz.from_local_datetime(&naive)
        .latest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

fn days_before(day: NaiveDate, days: u64) -> NaiveDate {
    day.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

fn start_of_days_ago<Tz: TimeZone>(now: &DateTime<Tz>, days: u64) -> DateTime<Utc> {
    start_of_day(&now.timezone(), days_before(now.date_naive(), days))
}

/// Converts a named interval into concrete bounds relative to `now`.
///
/// `All` yields an empty range.
pub fn interval_to_date_range<Tz: TimeZone>(interval: DateInterval, now: &DateTime<Tz>) -> DateRange {
    let today = now.date_naive();
    let tz = now.timezone();

    match interval {
        DateInterval::All => DateRange::default(),
        DateInterval::Yesterday => {
            let yesterday = days_before(today, 1);
            DateRange::new(
                Some(start_of_day(&tz, yesterday)),
                Some(end_of_day(&tz, yesterday)),
            )
        }
        bounded => {
            let days = bounded.days_back().unwrap_or_default();
            DateRange::new(
                Some(start_of_days_ago(now, days)),
                Some(end_of_day(&tz, today)),
            )
        }
    }
}

/// Range covering whole calendar days, from the start of `start` to the end
/// of `end` in `tz`.
pub fn days_to_date_range<Tz: TimeZone>(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    tz: &Tz,
) -> DateRange {
    DateRange::new(
        start.map(|day| start_of_day(tz, day)),
        end.map(|day| end_of_day(tz, day)),
    )
}

/// Narrowest named interval whose start is at or before `date`.
pub fn date_to_matching_interval<Tz: TimeZone>(
    date: &DateTime<Utc>,
    now: &DateTime<Tz>,
) -> DateInterval {
    DateInterval::ALL_INTERVALS
        .into_iter()
        .find(|interval| match interval.days_back() {
            Some(days) => start_of_days_ago(now, days) <= *date,
            None => true,
        })
        .unwrap_or(DateInterval::All)
}

/// Range of equal length in days immediately preceding `range`.
///
/// Requires a start date; a missing end date falls back to `now`.
/// e.g. 2024-01-10..2024-01-18 gives 2024-01-01T00:00:00..2024-01-09T23:59:59.999
pub fn calc_prev_date_range<Tz: TimeZone>(range: &DateRange, now: &DateTime<Tz>) -> Option<DateRange> {
    let tz = now.timezone();
    let start_day = range.start_date?.with_timezone(&tz).date_naive();
    let end_day = range
        .end_date
        .map(|end| end.with_timezone(&tz).date_naive())
        .unwrap_or_else(|| now.date_naive());

    let days_diff = u64::try_from((end_day - start_day).num_days() + 1).unwrap_or(1);

    Some(DateRange::new(
        Some(start_of_day(&tz, days_before(start_day, days_diff))),
        Some(end_of_day(&tz, days_before(start_day, 1))),
    ))
}
