//! Seams between the loading pipeline and its surroundings.
//!
//! - `Clock`: where "now" comes from, so interval maths is deterministic in tests
//! - `VisitsSink`: where lifecycle events go, and where cancellation is read from

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};

use crate::reducer::VisitsEvent;

// ==================== Clock Trait ====================

/// Source of the current time.
///
/// Named intervals and previous periods are computed from calendar days, so
/// the clock reports local time.
pub trait Clock: Send + Sync {
    fn now_local(&self) -> DateTime<Local>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at a given instant until moved explicitly.
///
/// Cloned handles share the same instant.
#[derive(Debug, Clone)]
pub struct MockClock {
    utc_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            utc_time: Arc::new(Mutex::new(time)),
        }
    }

    /// Jump to `time`.
    pub fn set_time(&self, time: DateTime<Utc>) {
        *self.utc_time.lock().unwrap() = time;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.utc_time.lock().unwrap();
        *time += duration;
    }
}

impl Clock for MockClock {
    fn now_local(&self) -> DateTime<Local> {
        self.utc_time.lock().unwrap().with_timezone(&Local)
    }
}

// ==================== Sink Trait ====================

/// Receiver of the events produced while loading visits.
///
/// Implementations apply them to whatever state the caller owns. The loader
/// never reads that state except through `should_cancel`.
pub trait VisitsSink: Send + Sync {
    fn dispatch(&self, event: VisitsEvent);

    /// Polled between batches of pages.
    fn should_cancel(&self) -> bool {
        false
    }
}

/// Sink that only records what it was given. Cancellation can be armed to
/// trigger after a number of `should_cancel` polls.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<VisitsEvent>>>,
    cancel_after_polls: Arc<Mutex<Option<usize>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation once `polls` checks have returned `false`.
    pub fn cancel_after(polls: usize) -> Self {
        let sink = Self::default();
        *sink.cancel_after_polls.lock().unwrap() = Some(polls);
        sink
    }

    pub fn events(&self) -> Vec<VisitsEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                VisitsEvent::ProgressChanged(progress) => Some(*progress),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl VisitsSink for RecordingSink {
    fn dispatch(&self, event: VisitsEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn should_cancel(&self) -> bool {
        let mut remaining = self.cancel_after_polls.lock().unwrap();
        match remaining.as_mut() {
            Some(0) => true,
            Some(polls) => {
                *polls -= 1;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_system_clock_returns_current_time() {
        let clock = SystemClock;
        let before = Local::now();
        let clock_time = clock.now_local();
        let after = Local::now();

        assert!(clock_time >= before);
        assert!(clock_time <= after);
    }

    #[test]
    fn test_mock_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let clock = MockClock::new(start);
        assert_eq!(clock.now_local().with_timezone(&Utc), start);

        let shared = clock.clone();
        shared.advance(chrono::Duration::days(3));
        assert_eq!(
            clock.now_local().with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 6, 18, 10, 0, 0).unwrap()
        );

        clock.set_time(start);
        assert_eq!(shared.now_local().with_timezone(&Utc), start);
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();

        sink.dispatch(VisitsEvent::Started);
        sink.dispatch(VisitsEvent::ProgressChanged(50.0));
        sink.dispatch(VisitsEvent::ProgressChanged(100.0));

        assert_eq!(sink.event_count(), 3);
        assert_eq!(sink.events()[0], VisitsEvent::Started);
        assert_eq!(sink.progress_values(), vec![50.0, 100.0]);

        sink.clear();
        assert_eq!(sink.event_count(), 0);
    }

    #[test]
    fn test_recording_sink_cancels_after_polls() {
        let never = RecordingSink::new();
        assert!(!never.should_cancel());
        assert!(!never.should_cancel());

        let sink = RecordingSink::cancel_after(2);
        assert!(!sink.should_cancel());
        assert!(!sink.should_cancel());
        assert!(sink.should_cancel());
        assert!(sink.should_cancel());
    }
}
