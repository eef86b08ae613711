//! Batched pagination over a [`VisitsSource`].
//!
//! The first page tells how many pages exist. Remaining pages are fetched in
//! sequential batches of `batch_size` concurrent requests, and the result is
//! always concatenated in page order regardless of completion order.

use futures::future::try_join_all;

use crate::api::{ApiError, VisitsSource};
use crate::models::{Visit, VisitsQuery};

/// Large pages keep the number of requests low.
pub const ITEMS_PER_PAGE: u32 = 5000;
pub const DEFAULT_BATCH_SIZE: usize = 4;

const PARALLEL_STARTING_PAGE: u32 = 2;

/// Progress notifications produced while loading remaining pages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// More than one batch is needed. Sent once, before the first batch.
    LargeLoad,
    /// Percentage of batches completed, 0-100.
    Changed(f64),
}

/// Whether loading `pages_count` pages needs more than one batch after page 1.
pub fn needs_multiple_batches(pages_count: u32, batch_size: usize) -> bool {
    pages_count.saturating_sub(1) as usize > batch_size
}

/// Splits pages `2..=pages_count` into consecutive chunks.
pub fn page_batches(pages_count: u32, batch_size: usize) -> Vec<Vec<u32>> {
    let pages: Vec<u32> = (PARALLEL_STARTING_PAGE..=pages_count).collect();
    pages
        .chunks(batch_size.max(1))
        .map(<[u32]>::to_vec)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
    items_per_page: u32,
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, ITEMS_PER_PAGE)
    }
}

impl BatchLoader {
    /// A `batch_size` of 0 is treated as 1.
    pub fn new(batch_size: usize, items_per_page: u32) -> Self {
        Self {
            batch_size: batch_size.max(1),
            items_per_page: items_per_page.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    /// Load every page of `query`, starting with page 1.
    pub async fn load_all<S, P, C>(
        &self,
        source: &S,
        query: &VisitsQuery,
        on_progress: P,
        should_cancel: C,
    ) -> Result<Vec<Visit>, ApiError>
    where
        S: VisitsSource + ?Sized,
        P: FnMut(Progress),
        C: Fn() -> bool,
    {
        let first = source.fetch_page(query, 1, self.items_per_page).await?;
        if first.pagination.is_last_page() {
            return Ok(first.data);
        }

        let mut visits = first.data;
        let remaining = self
            .load_remaining(source, query, first.pagination.pages_count, on_progress, should_cancel)
            .await?;
        visits.extend(remaining);
        Ok(visits)
    }

    /// Load pages `2..=pages_count`, assuming page 1 is already known.
    ///
    /// `should_cancel` is polled before each batch. Once it returns `true`
    /// no further batch is scheduled; batches already loaded are kept.
    pub async fn load_remaining<S, P, C>(
        &self,
        source: &S,
        query: &VisitsQuery,
        pages_count: u32,
        mut on_progress: P,
        should_cancel: C,
    ) -> Result<Vec<Visit>, ApiError>
    where
        S: VisitsSource + ?Sized,
        P: FnMut(Progress),
        C: Fn() -> bool,
    {
        let batches = page_batches(pages_count, self.batch_size);
        let total = batches.len();
        let mut visits = Vec::new();

        if needs_multiple_batches(pages_count, self.batch_size) {
            on_progress(Progress::LargeLoad);
        }

        for (index, pages) in batches.iter().enumerate() {
            if should_cancel() {
                tracing::warn!(
                    loaded_batches = index,
                    total_batches = total,
                    "Visits loading cancelled"
                );
                break;
            }

            tracing::debug!(batch = index + 1, total_batches = total, ?pages, "Loading batch");

            let pages_data = try_join_all(
                pages
                    .iter()
                    .map(|&page| source.fetch_page(query, page, self.items_per_page)),
            )
            .await?;

            visits.extend(pages_data.into_iter().flat_map(|list| list.data));
            on_progress(Progress::Changed(calc_progress(total, index + 1)));
        }

        Ok(visits)
    }
}

fn calc_progress(total: usize, current: usize) -> f64 {
    (current as f64 * 100.0) / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_batches_split() {
        assert_eq!(page_batches(1, 4), Vec::<Vec<u32>>::new());
        assert_eq!(page_batches(3, 4), vec![vec![2, 3]]);
        assert_eq!(page_batches(5, 4), vec![vec![2, 3, 4, 5]]);
        assert_eq!(page_batches(6, 4), vec![vec![2, 3, 4, 5], vec![6]]);
        assert_eq!(
            page_batches(10, 3),
            vec![vec![2, 3, 4], vec![5, 6, 7], vec![8, 9, 10]]
        );
    }

    #[test]
    fn test_page_batches_zero_size_is_one() {
        assert_eq!(page_batches(3, 0), vec![vec![2], vec![3]]);
    }

    #[test]
    fn test_needs_multiple_batches() {
        assert!(!needs_multiple_batches(0, 4));
        assert!(!needs_multiple_batches(1, 4));
        assert!(!needs_multiple_batches(5, 4));
        assert!(needs_multiple_batches(6, 4));
    }

    #[test]
    fn test_calc_progress() {
        assert_eq!(calc_progress(4, 1), 25.0);
        assert_eq!(calc_progress(3, 3), 100.0);
        assert!((calc_progress(3, 1) - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_batch_loader_clamps_settings() {
        let loader = BatchLoader::new(0, 0);
        assert_eq!(loader.batch_size(), 1);
        assert_eq!(loader.items_per_page(), 1);

        let loader = BatchLoader::default();
        assert_eq!(loader.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(loader.items_per_page(), ITEMS_PER_PAGE);
    }
}
