//! Shlink Visits Library
//!
//! Batched loading of URL-shortener visit statistics, with progress
//! reporting, cooperative cancellation, interval fallback and live merging
//! of newly created visits into already loaded state.

pub mod api;
pub mod comparison;
pub mod config;
pub mod dates;
pub mod fallback;
pub mod live;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod reducer;
pub mod traits;

// Re-export commonly used types
pub use api::{ApiError, ProblemDetails, ShlinkApiClient, VisitsSource};
pub use comparison::{ComparisonLoader, ComparisonStore, VisitsComparisonInfo};
pub use config::AppConfig;
pub use dates::DateInterval;
pub use loader::{BatchLoader, DEFAULT_BATCH_SIZE, ITEMS_PER_PAGE, Progress};
pub use models::{
    CreatedVisit, DateRange, Pagination, ShortUrlRef, Visit, VisitsList, VisitsQuery, VisitsScope,
};
pub use orchestrator::{LoadOptions, VisitsLoader};
pub use reducer::{VisitsEvent, VisitsInfo, VisitsLoaded, VisitsStore, reduce};
pub use traits::{Clock, MockClock, RecordingSink, SystemClock, VisitsSink};
