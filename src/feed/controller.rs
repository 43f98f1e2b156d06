//! Feed Controller Module
//!
//! Refresh, initial fetch and next-page fetch for one feed stream, on top of
//! the expiring cache and the page sequencer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::ExpiringCache;
use crate::feed::{FetchState, PageSource, QuerySignature};
use crate::paging::{PageLoad, PageProgress, PageSequencer};

// == Feed Controller ==
/// Drives one list-backed stream: serves cached result sets, loads pages,
/// merges them and keeps the observable [`FetchState`] current.
///
/// Every operation takes a [`CancellationToken`]. A cancelled or superseded
/// operation (the query was refreshed or replaced while it was suspended)
/// abandons without touching the exposed state, apart from rolling back the
/// loading marker it set itself.
pub struct FeedController<T> {
    name: String,
    source: Arc<dyn PageSource<T>>,
    cache: ExpiringCache,
    sequencer: PageSequencer,
    query: Arc<Mutex<QuerySignature>>,
    state: watch::Sender<FetchState<T>>,
}

impl<T> FeedController<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(
        name: impl Into<String>,
        query: QuerySignature,
        source: Arc<dyn PageSource<T>>,
        cache: ExpiringCache,
        sequencer: PageSequencer,
    ) -> Self {
        let (state, _) = watch::channel(FetchState::Empty);
        Self {
            name: name.into(),
            source,
            cache,
            sequencer,
            query: Arc::new(Mutex::new(query)),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current query, nonce included.
    pub fn query(&self) -> QuerySignature {
        self.lock_query().clone()
    }

    /// Snapshot of the exposed state.
    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> PageProgress {
        self.sequencer.progress()
    }

    /// True when no further page will be requested until a refresh.
    pub fn has_reached_end(&self) -> bool {
        self.sequencer.is_exhausted()
    }

    pub fn is_fetching_next_page(&self) -> bool {
        self.state.borrow().is_fetching_next_page()
    }

    // == Refresh ==
    /// Forgets paging progress and the cached result set, and stamps a new
    /// nonce so fetches still in flight are recognised as superseded.
    pub async fn refresh(&self) {
        self.sequencer.reset();
        let key = {
            let mut query = self.lock_query();
            query.restamp();
            query.cache_key()
        };
        self.cache.remove_value(&key).await;
        self.state.send_replace(FetchState::Empty);
        info!(stream = %self.name, key = %key, "feed refreshed");
    }

    // == Set Query ==
    /// Switches to `query`. Returns whether the category or filters changed.
    ///
    /// A change resets paging and the exposed state; the cached set of the
    /// new query, if any, is kept and will be served by the next
    /// [`fetch_initial`](Self::fetch_initial).
    pub fn set_query(&self, mut query: QuerySignature) -> bool {
        {
            let mut current = self.lock_query();
            if current.same_query(&query) {
                return false;
            }
            query.restamp();
            *current = query;
        }
        self.sequencer.reset();
        self.state.send_replace(FetchState::Empty);
        info!(stream = %self.name, "feed query changed");
        true
    }

    // == Fetch Initial ==
    /// Populates the feed for the current query.
    ///
    /// A fresh cached set is adopted without calling the upstream. Otherwise
    /// page 1 is loaded; a non-empty result is cached, an error becomes
    /// [`FetchState::Failure`] and leaves the cache alone.
    pub async fn fetch_initial(&self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        let token = self.query();
        let key = token.cache_key();

        if let Some(items) = self.cache.value::<Vec<T>>(&key).await {
            if self.is_abandoned(cancel, &token) {
                return;
            }
            info!(stream = %self.name, key = %key, items = items.len(), "serving feed from cache");
            self.sequencer.resume_from(items.len());
            self.state.send_replace(FetchState::Success { items });
            return;
        }
        if self.is_abandoned(cancel, &token) {
            return;
        }

        let previous = self.state.send_replace(FetchState::Loading);
        self.sequencer.reset();
        let page_size = self.sequencer.items_per_page();
        let result = self
            .sequencer
            .load_page(cancel, |page| self.source.fetch_page(&token, page, page_size))
            .await;

        if self.is_abandoned(cancel, &token) {
            debug!(stream = %self.name, "initial fetch abandoned");
            self.replace_if(FetchState::is_loading, previous);
            return;
        }

        match result {
            Ok(PageLoad::Loaded(items)) => {
                let published = self.replace_if(
                    FetchState::is_loading,
                    FetchState::Success {
                        items: items.clone(),
                    },
                );
                if !published {
                    debug!(stream = %self.name, "initial page overtaken, discarded");
                    return;
                }
                info!(stream = %self.name, items = items.len(), "initial page loaded");
                if !items.is_empty() {
                    self.cache_items(&key, &items, cancel, token).await;
                }
            }
            Ok(_) => {
                debug!(stream = %self.name, "initial page stale or cancelled, discarded");
                self.replace_if(FetchState::is_loading, previous);
            }
            Err(error) => {
                warn!(stream = %self.name, error = %error, "initial fetch failed");
                self.replace_if(
                    FetchState::is_loading,
                    FetchState::Failure {
                        error,
                        items: Vec::new(),
                    },
                );
            }
        }
    }

    // == Fetch Next Page ==
    /// Loads the next page and appends it to the items on screen.
    ///
    /// Does nothing when the stream is exhausted or a load is already
    /// running. On failure the items loaded so far are kept alongside the
    /// error, and the same page is requested again on the next call. A page
    /// that went stale while in flight is dropped and the state it replaced
    /// is put back, unless another load has published since.
    pub async fn fetch_next_page(&self, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        if self.sequencer.is_exhausted() {
            debug!(stream = %self.name, "no more pages");
            return;
        }

        let token = self.query();
        let mut claimed = None;
        self.state.send_if_modified(|state| {
            if state.is_in_progress() {
                return false;
            }
            let items = state.items().to_vec();
            claimed = Some(std::mem::replace(
                state,
                FetchState::FetchingNextPage { items },
            ));
            true
        });
        let Some(previous) = claimed else {
            debug!(stream = %self.name, "load already in progress");
            return;
        };

        let page_size = self.sequencer.items_per_page();
        let result = self
            .sequencer
            .load_page(cancel, |page| self.source.fetch_page(&token, page, page_size))
            .await;

        if self.is_abandoned(cancel, &token) {
            debug!(stream = %self.name, "next page fetch abandoned");
            self.replace_if(FetchState::is_fetching_next_page, previous);
            return;
        }

        let mut items = previous.items().to_vec();
        match result {
            Ok(PageLoad::Loaded(page)) => {
                items.extend(page);
                let published = self.replace_if(
                    FetchState::is_fetching_next_page,
                    FetchState::Success {
                        items: items.clone(),
                    },
                );
                if !published {
                    debug!(stream = %self.name, "next page overtaken, discarded");
                    return;
                }
                debug!(stream = %self.name, total = items.len(), "next page merged");
                if !items.is_empty() {
                    self.cache_items(&token.cache_key(), &items, cancel, token).await;
                }
            }
            Ok(_) => {
                debug!(stream = %self.name, "next page stale or cancelled, discarded");
                self.replace_if(FetchState::is_fetching_next_page, previous);
            }
            Err(error) => {
                warn!(stream = %self.name, error = %error, "next page fetch failed");
                self.replace_if(
                    FetchState::is_fetching_next_page,
                    FetchState::Failure { error, items },
                );
            }
        }
    }

    // == Helpers ==
    fn is_abandoned(&self, cancel: &CancellationToken, token: &QuerySignature) -> bool {
        cancel.is_cancelled() || *self.lock_query() != *token
    }

    /// Caches `items` unless the fetch was cancelled or superseded by the
    /// time the key is locked for writing.
    async fn cache_items(
        &self,
        key: &str,
        items: &[T],
        cancel: &CancellationToken,
        token: QuerySignature,
    ) {
        let query = Arc::clone(&self.query);
        let cancel = cancel.clone();
        let written = self
            .cache
            .set_value_if(key, items, move || {
                !cancel.is_cancelled()
                    && *query.lock().unwrap_or_else(PoisonError::into_inner) == token
            })
            .await;
        if !written {
            debug!(stream = %self.name, key, "result set not cached");
        }
    }

    /// Swaps in `next` if the state is still the marker this call set.
    /// Returns whether it did.
    fn replace_if(&self, pending: fn(&FetchState<T>) -> bool, next: FetchState<T>) -> bool {
        self.state.send_if_modified(|state| {
            if pending(state) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    fn lock_query(&self) -> MutexGuard<'_, QuerySignature> {
        self.query.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Upstream stub that replays scripted page results.
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Vec<u32>, FetchError>>>,
        requested: Mutex<Vec<u32>>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        /// Per-call gates, consumed in call order before `gate` applies
        call_gates: Mutex<VecDeque<Option<Arc<Notify>>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<u32>, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn gated(responses: Vec<Result<Vec<u32>, FetchError>>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(responses)
            }
        }

        fn with_call_gates(
            responses: Vec<Result<Vec<u32>, FetchError>>,
            gates: Vec<Option<Arc<Notify>>>,
        ) -> Self {
            Self {
                call_gates: Mutex::new(gates.into()),
                ..Self::new(responses)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn requested(&self) -> Vec<u32> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource<u32> for ScriptedSource {
        async fn fetch_page(
            &self,
            _query: &QuerySignature,
            page: u32,
            _page_size: u32,
        ) -> Result<Vec<u32>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().unwrap().push(page);
            let response = self.responses.lock().unwrap().pop_front();
            let call_gate = self.call_gates.lock().unwrap().pop_front();
            match call_gate {
                Some(Some(gate)) => gate.notified().await,
                Some(None) => {}
                None => {
                    if let Some(gate) = &self.gate {
                        gate.notified().await;
                    }
                }
            }
            response.unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct Harness {
        controller: Arc<FeedController<u32>>,
        source: Arc<ScriptedSource>,
        cache: ExpiringCache,
        _dir: TempDir,
    }

    fn harness(source: ScriptedSource, per_page: u32, max_pages: u32) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = ExpiringCache::new(dir.path(), Duration::seconds(600));
        let source = Arc::new(source);
        let controller = Arc::new(FeedController::new(
            "popular",
            QuerySignature::new("popular"),
            Arc::clone(&source) as Arc<dyn PageSource<u32>>,
            cache.clone(),
            PageSequencer::new(per_page, max_pages),
        ));
        Harness {
            controller,
            source,
            cache,
            _dir: dir,
        }
    }

    fn key(h: &Harness) -> String {
        h.controller.query().cache_key()
    }

    #[tokio::test]
    async fn test_fetch_initial_miss_loads_first_page_and_caches() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1, 2])]), 2, 5);
        let cancel = CancellationToken::new();

        h.controller.fetch_initial(&cancel).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1, 2] });
        assert_eq!(h.source.requested(), vec![1]);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_fetch_initial_hit_skips_upstream() {
        let h = harness(ScriptedSource::new(vec![]), 2, 5);
        h.cache.set_value(&key(&h), &vec![7u32, 8, 9]).await;

        h.controller.fetch_initial(&CancellationToken::new()).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![7, 8, 9] });
        assert_eq!(h.source.calls(), 0);
        assert_eq!(
            h.controller.progress(),
            PageProgress {
                current_page: 2,
                has_reached_end: true
            }
        );
    }

    #[tokio::test]
    async fn test_cache_hit_then_next_page_continues() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![3, 4])]), 2, 5);
        h.cache.set_value(&key(&h), &vec![1u32, 2]).await;
        let cancel = CancellationToken::new();

        h.controller.fetch_initial(&cancel).await;
        h.controller.fetch_next_page(&cancel).await;

        assert_eq!(h.source.requested(), vec![2]);
        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1, 2, 3, 4] });
    }

    #[tokio::test]
    async fn test_empty_first_page_is_not_cached() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![])]), 2, 5);

        h.controller.fetch_initial(&CancellationToken::new()).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![] });
        assert!(h.controller.has_reached_end());
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, None);
    }

    #[tokio::test]
    async fn test_fetch_initial_failure_leaves_cache_untouched() {
        let h = harness(ScriptedSource::new(vec![Err(FetchError::Timeout)]), 2, 5);

        h.controller.fetch_initial(&CancellationToken::new()).await;

        assert_eq!(
            h.controller.state(),
            FetchState::Failure {
                error: FetchError::Timeout,
                items: vec![]
            }
        );
        assert_eq!(h.controller.progress().current_page, 0);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, None);
    }

    #[tokio::test]
    async fn test_next_pages_concatenate_in_order_and_refresh_cache() {
        let h = harness(
            ScriptedSource::new(vec![Ok(vec![1, 2]), Ok(vec![3, 4]), Ok(vec![5])]),
            2,
            5,
        );
        let cancel = CancellationToken::new();

        h.controller.fetch_initial(&cancel).await;
        h.controller.fetch_next_page(&cancel).await;
        h.controller.fetch_next_page(&cancel).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1, 2, 3, 4, 5] });
        assert!(h.controller.has_reached_end());
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![1, 2, 3, 4, 5]));
    }

    #[tokio::test]
    async fn test_next_page_at_end_makes_no_call() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1])]), 2, 5);
        let cancel = CancellationToken::new();
        h.controller.fetch_initial(&cancel).await;
        assert!(h.controller.has_reached_end());

        h.controller.fetch_next_page(&cancel).await;

        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1] });
    }

    #[tokio::test]
    async fn test_next_page_failure_preserves_items() {
        let h = harness(
            ScriptedSource::new(vec![Ok(vec![1, 2]), Err(FetchError::Status(500)), Ok(vec![3])]),
            2,
            5,
        );
        let cancel = CancellationToken::new();
        h.controller.fetch_initial(&cancel).await;

        h.controller.fetch_next_page(&cancel).await;
        assert_eq!(
            h.controller.state(),
            FetchState::Failure {
                error: FetchError::Status(500),
                items: vec![1, 2]
            }
        );
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![1, 2]));

        // Retry asks for page 2 again and continues from the kept items
        h.controller.fetch_next_page(&cancel).await;
        assert_eq!(h.source.requested(), vec![1, 2, 2]);
        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1, 2, 3] });
    }

    #[tokio::test]
    async fn test_refresh_clears_cache_and_state() {
        let h = harness(
            ScriptedSource::new(vec![Ok(vec![1, 2]), Ok(vec![9, 9])]),
            2,
            5,
        );
        let cancel = CancellationToken::new();
        h.controller.fetch_initial(&cancel).await;
        let nonce = h.controller.query().nonce();

        h.controller.refresh().await;

        assert_eq!(h.controller.state(), FetchState::Empty);
        assert_eq!(h.controller.progress().current_page, 0);
        assert!(h.controller.query().nonce() > nonce);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, None);

        h.controller.fetch_initial(&cancel).await;
        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.controller.state(), FetchState::Success { items: vec![9, 9] });
    }

    #[tokio::test]
    async fn test_refresh_supersedes_in_flight_fetch() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedSource::gated(vec![Ok(vec![1, 2])], Arc::clone(&gate)),
            2,
            5,
        );

        let task = {
            let controller = Arc::clone(&h.controller);
            tokio::spawn(async move { controller.fetch_initial(&CancellationToken::new()).await })
        };
        while h.source.calls() == 0 {
            tokio::task::yield_now().await;
        }

        h.controller.refresh().await;
        gate.notify_one();
        task.await.unwrap();

        assert_eq!(h.controller.state(), FetchState::Empty);
        assert_eq!(h.controller.progress().current_page, 0);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, None);
    }

    #[tokio::test]
    async fn test_refresh_while_caching_leaves_no_stale_entry() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1, 2])]), 2, 5);
        let mut rx = h.controller.subscribe();

        let task = {
            let controller = Arc::clone(&h.controller);
            tokio::spawn(async move { controller.fetch_initial(&CancellationToken::new()).await })
        };
        rx.wait_for(|state| matches!(state, FetchState::Success { .. }))
            .await
            .unwrap();

        h.controller.refresh().await;
        task.await.unwrap();

        assert_eq!(h.controller.state(), FetchState::Empty);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, None);
    }

    /// Page 1 is loaded, then a next page is held in flight while a fresh
    /// initial fetch for the same query completes.
    async fn next_page_overtaken_by_initial(
        next_page: Result<Vec<u32>, FetchError>,
    ) -> Harness {
        let next_gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedSource::with_call_gates(
                vec![Ok(vec![1, 2]), next_page, Ok(vec![50, 60])],
                vec![None, Some(Arc::clone(&next_gate)), None],
            ),
            2,
            5,
        );
        let cancel = CancellationToken::new();
        h.controller.fetch_initial(&cancel).await;
        h.cache.remove_value(&key(&h)).await;

        let next = {
            let controller = Arc::clone(&h.controller);
            tokio::spawn(async move { controller.fetch_next_page(&CancellationToken::new()).await })
        };
        while h.source.calls() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(h.controller.is_fetching_next_page());

        h.controller.fetch_initial(&cancel).await;
        assert_eq!(h.controller.state(), FetchState::Success { items: vec![50, 60] });

        next_gate.notify_one();
        next.await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_stale_next_page_is_discarded() {
        let h = next_page_overtaken_by_initial(Ok(vec![3, 4])).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![50, 60] });
        assert_eq!(
            h.controller.progress(),
            PageProgress {
                current_page: 1,
                has_reached_end: false
            }
        );
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![50, 60]));
        assert_eq!(h.source.requested(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn test_stale_next_page_failure_is_discarded() {
        let h = next_page_overtaken_by_initial(Err(FetchError::Timeout)).await;

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![50, 60] });
        assert_eq!(h.controller.progress().current_page, 1);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![50, 60]));
    }

    #[tokio::test]
    async fn test_cancelled_next_page_restores_previous_state() {
        let gate = Arc::new(Notify::new());
        let h = harness(
            ScriptedSource::gated(vec![Ok(vec![1, 2]), Ok(vec![3, 4])], Arc::clone(&gate)),
            2,
            5,
        );
        gate.notify_one();
        h.controller.fetch_initial(&CancellationToken::new()).await;

        let cancel = CancellationToken::new();
        let task = {
            let controller = Arc::clone(&h.controller);
            let cancel = cancel.clone();
            tokio::spawn(async move { controller.fetch_next_page(&cancel).await })
        };
        while h.source.calls() < 2 {
            tokio::task::yield_now().await;
        }
        assert!(h.controller.is_fetching_next_page());

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(h.controller.state(), FetchState::Success { items: vec![1, 2] });
        assert_eq!(h.controller.progress().current_page, 1);
        assert_eq!(h.cache.value::<Vec<u32>>(&key(&h)).await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1, 2])]), 2, 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        h.controller.fetch_initial(&cancel).await;
        h.controller.fetch_next_page(&cancel).await;

        assert_eq!(h.controller.state(), FetchState::Empty);
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_set_query_resets_only_on_change() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1, 2])]), 2, 5);
        h.controller.fetch_initial(&CancellationToken::new()).await;

        assert!(!h.controller.set_query(QuerySignature::new("popular")));
        assert_eq!(h.controller.progress().current_page, 1);

        assert!(h.controller.set_query(QuerySignature::new("popular").with_genres(["rpg"])));
        assert_eq!(h.controller.state(), FetchState::Empty);
        assert_eq!(h.controller.progress().current_page, 0);
        assert_eq!(h.controller.query().cache_key(), "popular|g:rpg|p:|s:");
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let h = harness(ScriptedSource::new(vec![Ok(vec![1, 2])]), 2, 5);
        let mut rx = h.controller.subscribe();

        h.controller.fetch_initial(&CancellationToken::new()).await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), FetchState::Success { items: vec![1, 2] });
    }
}
