//! Page Sequencer Module
//!
//! Tracks paging progress of one result stream and sequences page loads.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// == Page Progress ==
/// Snapshot of a sequencer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageProgress {
    /// Last page successfully loaded, 0 before the first load
    pub current_page: u32,
    /// Set once a page came back shorter than a full page
    pub has_reached_end: bool,
}

// == Page Load ==
/// Outcome of [`PageSequencer::load_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoad<T> {
    /// The page was fetched and the sequencer advanced to it
    Loaded(Vec<T>),
    /// End reached or page ceiling hit; nothing was fetched
    Exhausted,
    /// Cancelled before or during the fetch
    Cancelled,
    /// A reset or another load moved the sequencer on while fetching
    Stale,
}

impl<T> PageLoad<T> {
    /// Items applied by this load, empty unless `Loaded`.
    pub fn into_items(self) -> Vec<T> {
        match self {
            PageLoad::Loaded(items) => items,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SequencerState {
    current_page: u32,
    has_reached_end: bool,
    /// Bumped on every reset so loads started earlier can tell they are stale
    epoch: u64,
}

// == Page Sequencer ==
/// Sequences paged fetches for exactly one logical stream.
///
/// State transitions happen synchronously under a mutex that is never held
/// across an await. Two overlapping loads may both fetch the same page, but
/// only the first to finish advances the counter; the other's result is
/// discarded as stale.
#[derive(Debug)]
pub struct PageSequencer {
    items_per_page: u32,
    max_page_limit: u32,
    state: Mutex<SequencerState>,
}

impl PageSequencer {
    // == Constructor ==
    /// Creates a sequencer at page 0.
    ///
    /// `items_per_page` is clamped to at least 1.
    pub fn new(items_per_page: u32, max_page_limit: u32) -> Self {
        Self {
            items_per_page: items_per_page.max(1),
            max_page_limit,
            state: Mutex::new(SequencerState {
                current_page: 0,
                has_reached_end: false,
                epoch: 0,
            }),
        }
    }

    pub fn items_per_page(&self) -> u32 {
        self.items_per_page
    }

    pub fn max_page_limit(&self) -> u32 {
        self.max_page_limit
    }

    pub fn current_page(&self) -> u32 {
        self.lock().current_page
    }

    pub fn has_reached_end(&self) -> bool {
        self.lock().has_reached_end
    }

    pub fn progress(&self) -> PageProgress {
        let state = self.lock();
        PageProgress {
            current_page: state.current_page,
            has_reached_end: state.has_reached_end,
        }
    }

    /// True when no further page will be fetched: either a short page was
    /// seen or the page ceiling was reached.
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.has_reached_end || state.current_page >= self.max_page_limit
    }

    // == Load Next Page ==
    /// Fetches the page after `current_page` and advances on success.
    ///
    /// Returns an empty vec without touching state when `cancel` fires
    /// before or during the fetch, when the stream is exhausted (in which
    /// case `fetch` is never called), or when another load or a reset moved
    /// the state on while this fetch was in flight. A fetch error is returned
    /// as-is and leaves the state unchanged, so the same page can be retried.
    ///
    /// See [`load_page`](Self::load_page) to tell those cases apart.
    pub async fn load_next_page<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        fetch: F,
    ) -> Result<Vec<T>, E>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        self.load_page(cancel, fetch).await.map(PageLoad::into_items)
    }

    /// Same as [`load_next_page`](Self::load_next_page), reporting why no
    /// items were applied.
    ///
    /// A fetch error from a load that has since gone stale is reported as
    /// [`PageLoad::Stale`], not as the error.
    pub async fn load_page<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        fetch: F,
    ) -> Result<PageLoad<T>, E>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
    {
        if cancel.is_cancelled() {
            return Ok(PageLoad::Cancelled);
        }

        let (requested_page, epoch) = {
            let state = self.lock();
            if state.has_reached_end || state.current_page >= self.max_page_limit {
                debug!(
                    current_page = state.current_page,
                    has_reached_end = state.has_reached_end,
                    "no more pages to load"
                );
                return Ok(PageLoad::Exhausted);
            }
            (state.current_page + 1, state.epoch)
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(page = requested_page, "page load cancelled");
                return Ok(PageLoad::Cancelled);
            }
            result = fetch(requested_page) => result,
        };

        if cancel.is_cancelled() {
            return Ok(PageLoad::Cancelled);
        }

        let mut state = self.lock();
        if state.epoch != epoch || state.current_page + 1 != requested_page {
            debug!(
                page = requested_page,
                current_page = state.current_page,
                "discarding stale page"
            );
            return Ok(PageLoad::Stale);
        }
        let items = result?;

        state.current_page = requested_page;
        state.has_reached_end = items.len() < self.items_per_page as usize;
        debug!(
            page = requested_page,
            items = items.len(),
            has_reached_end = state.has_reached_end,
            "page loaded"
        );
        Ok(PageLoad::Loaded(items))
    }

    // == Reset ==
    /// Returns to page 0 with the end flag cleared.
    ///
    /// Loads still in flight from before the reset will be discarded.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.current_page = 0;
        state.has_reached_end = false;
        state.epoch = state.epoch.wrapping_add(1);
    }

    // == Resume ==
    /// Restores progress for a result set of `item_count` items that was
    /// obtained elsewhere, such as from the cache.
    ///
    /// The page count is rounded up and capped at the page ceiling. A
    /// partial last page marks the end; so does an empty set.
    pub fn resume_from(&self, item_count: usize) {
        let per_page = self.items_per_page as usize;
        let pages = item_count.div_ceil(per_page);
        let pages = u32::try_from(pages)
            .unwrap_or(u32::MAX)
            .min(self.max_page_limit);

        let mut state = self.lock();
        state.current_page = pages;
        state.has_reached_end = item_count % per_page != 0 || item_count == 0;
        state.epoch = state.epoch.wrapping_add(1);
    }

    fn lock(&self) -> MutexGuard<'_, SequencerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
