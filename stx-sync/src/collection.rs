//! Infinite collection sync.
//!
//! A collection only grows by appending pages until it is refreshed. At most one page load is in flight per
//! collection: callers requesting the next page while a load is running join it.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicBool, Ordering},
};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{
    client::PageSource,
    cursor::{compute_next_offset, is_last_page, merge_all, paginate},
    error::SyncError,
    ledger::{CollectionKey, Page},
};

/// Handle to a page load. Clones resolve to the same outcome and share a single fetch.
pub type LoadMore = Shared<BoxFuture<'static, LoadOutcome>>;

/// Result of a page load or refresh.
///
/// Reaching the end is not an error: it is reported as [`LoadOutcome::ReachedEnd`] without a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was appended.
    Loaded {
        /// Index of the appended page
        page_index: usize,
        /// Number of items in the appended page
        len: usize,
    },
    /// All pages were replaced.
    Refreshed {
        /// Number of pages after the refresh
        page_count: usize,
    },
    /// The last page was already fetched.
    ReachedEnd,
    /// The response arrived after the collection was unsubscribed or refreshed and was dropped.
    Discarded,
    /// The fetch failed. Previously fetched pages are kept.
    Failed(SyncError),
}

#[derive(Debug)]
struct CollectionState<T> {
    pages: Vec<Page<T>>,
    last_error: Option<SyncError>,
    loading_more: bool,
    refreshes: usize,
    // bumped by every refresh so page loads started earlier are dropped
    generation: u64,
}

impl<T> CollectionState<T> {
    fn is_empty(&self) -> bool {
        self.pages.first().is_some_and(Page::is_empty)
    }

    fn is_reaching_end(&self) -> bool {
        self.is_empty() || self.pages.last().is_some_and(is_last_page)
    }
}

struct CollectionInner<T> {
    key: CollectionKey,
    limit: u64,
    source: Arc<dyn PageSource<T>>,
    state: RwLock<CollectionState<T>>,
    // the page load in flight and the generation it was started under
    in_flight: Mutex<Option<(u64, LoadMore)>>,
    subscribed: AtomicBool,
}

impl<T> CollectionInner<T> {
    fn read_state(&self) -> RwLockReadGuard<'_, CollectionState<T>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState<T>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<(u64, LoadMore)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }
}

impl<T> CollectionInner<T>
where
    T: Send + Sync + 'static,
{
    async fn load_page(self: Arc<Self>, page_index: usize, generation: u64) -> LoadOutcome {
        let offset = compute_next_offset(page_index as u64, self.limit);
        tracing::debug!(
            "Loading page {page_index} of {} at offset {offset}.",
            self.key
        );
        let result = self.source.fetch_page(offset, self.limit).await;

        let mut in_flight = self.lock_in_flight();
        let mut state = self.write_state();
        // a load started after a refresh may have replaced this one
        if in_flight
            .as_ref()
            .is_some_and(|(load_generation, _)| *load_generation == generation)
        {
            in_flight.take();
        }
        state.loading_more = in_flight.is_some();

        if !self.is_subscribed() {
            tracing::debug!("Dropped page {page_index} of {}, unsubscribed.", self.key);
            return LoadOutcome::Discarded;
        }
        if state.generation != generation || state.pages.len() != page_index {
            tracing::debug!(
                "Dropped page {page_index} of {}, superseded by a refresh.",
                self.key
            );
            return LoadOutcome::Discarded;
        }

        match result {
            Ok(page) => {
                let len = page.len();
                state.pages.push(page);
                state.last_error = None;
                LoadOutcome::Loaded { page_index, len }
            }
            Err(error) => {
                tracing::warn!("Failed to load page {page_index} of {}. {error}", self.key);
                state.last_error = Some(error.clone());
                LoadOutcome::Failed(error)
            }
        }
    }
}

// decrements the refresh count even if the refresh future is dropped mid-flight
struct RefreshGuard<'a, T> {
    inner: &'a CollectionInner<T>,
}

impl<T> Drop for RefreshGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.inner.write_state();
        state.refreshes = state.refreshes.saturating_sub(1);
    }
}

/// Keeps the pages of one paginated collection in sync with the server.
///
/// Created by [`InfiniteCollectionSync::subscribe`]. Dropping the collection unsubscribes it, any response still in
/// flight is then discarded.
pub struct InfiniteCollectionSync<T> {
    inner: Arc<CollectionInner<T>>,
}

impl<T> std::fmt::Debug for InfiniteCollectionSync<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read_state();
        f.debug_struct("InfiniteCollectionSync")
            .field("key", &self.inner.key)
            .field("limit", &self.inner.limit)
            .field("page_count", &state.pages.len())
            .field("last_error", &state.last_error)
            .finish_non_exhaustive()
    }
}

impl<T> InfiniteCollectionSync<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Subscribes to the collection identified by `key` and starts loading page 0.
    ///
    /// The initial load is spawned on the current tokio runtime. Outside a runtime it runs once the first
    /// [`LoadMore`] or [`Self::settled`] is awaited. A `limit` of zero is raised to one.
    pub fn subscribe(key: CollectionKey, source: Arc<dyn PageSource<T>>, limit: u64) -> Self {
        tracing::info!("Subscribed to {key}.");
        let collection = Self {
            inner: Arc::new(CollectionInner {
                key,
                limit: limit.max(1),
                source,
                state: RwLock::new(CollectionState {
                    pages: Vec::new(),
                    last_error: None,
                    loading_more: false,
                    refreshes: 0,
                    generation: 0,
                }),
                in_flight: Mutex::new(None),
                subscribed: AtomicBool::new(true),
            }),
        };

        let initial_load = collection.load_more();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(initial_load);
        }

        collection
    }

    /// Requests the next page.
    ///
    /// Returns immediately with a handle to the load. If a load is already in flight the returned handle joins it,
    /// so calling this twice without awaiting in between fetches once. A load started before the latest refresh is
    /// not joined, a new load is started instead. Once the last fetched page is short the handle resolves to
    /// [`LoadOutcome::ReachedEnd`] without fetching.
    pub fn load_more(&self) -> LoadMore {
        let mut in_flight = self.inner.lock_in_flight();
        if !self.inner.is_subscribed() {
            return match in_flight.as_ref() {
                Some((_, load)) => load.clone(),
                None => resolved(LoadOutcome::Failed(SyncError::Unsubscribed)),
            };
        }

        let (page_index, generation) = {
            let mut state = self.inner.write_state();
            if let Some((load_generation, load)) = in_flight.as_ref()
                && *load_generation == state.generation
            {
                return load.clone();
            }
            if state.is_reaching_end() {
                return resolved(LoadOutcome::ReachedEnd);
            }
            state.loading_more = true;
            (state.pages.len(), state.generation)
        };
        let load = self
            .inner
            .clone()
            .load_page(page_index, generation)
            .boxed()
            .shared();
        *in_flight = Some((generation, load.clone()));

        load
    }

    /// Fetches the whole visible window again in one request and replaces all pages atomically.
    ///
    /// The window is `limit * max(1, page_count)` items from offset 0. Any page load started before the refresh is
    /// discarded when it completes. On failure the previous pages are kept and the error is stored.
    pub async fn refresh(&self) -> LoadOutcome {
        if !self.inner.is_subscribed() {
            return LoadOutcome::Failed(SyncError::Unsubscribed);
        }

        let (generation, window) = {
            let mut state = self.inner.write_state();
            state.generation += 1;
            state.refreshes += 1;
            (
                state.generation,
                self.inner
                    .limit
                    .saturating_mul(state.pages.len().max(1) as u64),
            )
        };
        let guard = RefreshGuard { inner: &self.inner };
        tracing::debug!("Refreshing {} with a window of {window}.", self.inner.key);
        let result = self.inner.source.fetch_page(0, window).await;
        drop(guard);

        let mut state = self.inner.write_state();
        if !self.inner.is_subscribed() || state.generation != generation {
            return LoadOutcome::Discarded;
        }
        match result {
            Ok(page) => {
                state.pages = paginate(page.items, self.inner.limit, page.total);
                state.last_error = None;
                LoadOutcome::Refreshed {
                    page_count: state.pages.len(),
                }
            }
            Err(error) => {
                tracing::warn!("Failed to refresh {}. {error}", self.inner.key);
                state.last_error = Some(error.clone());
                LoadOutcome::Failed(error)
            }
        }
    }

    /// Waits for the page load currently in flight, if any.
    pub async fn settled(&self) -> Option<LoadOutcome> {
        let load = self.inner.lock_in_flight().clone();
        match load {
            Some((_, load)) => Some(load.await),
            None => None,
        }
    }

    /// Stops accepting responses. Pages already fetched stay readable.
    pub fn unsubscribe(&self) {
        if self.inner.subscribed.swap(false, Ordering::AcqRel) {
            tracing::info!("Unsubscribed from {}.", self.inner.key);
        }
    }
}

impl<T: Clone> InfiniteCollectionSync<T> {
    /// Collection key
    pub fn key(&self) -> &CollectionKey {
        &self.inner.key
    }

    /// Page limit
    pub fn limit(&self) -> u64 {
        self.inner.limit
    }

    /// Returns a snapshot of the fetched pages.
    pub fn pages(&self) -> Vec<Page<T>> {
        self.inner.read_state().pages.clone()
    }

    /// Returns the items of all fetched pages in page order.
    pub fn items(&self) -> Vec<T> {
        merge_all(&self.inner.read_state().pages)
    }

    /// Number of fetched pages.
    pub fn page_count(&self) -> usize {
        self.inner.read_state().pages.len()
    }

    /// Error of the most recent failed fetch. Cleared by the next successful fetch.
    pub fn last_error(&self) -> Option<SyncError> {
        self.inner.read_state().last_error.clone()
    }

    /// True if the first page was fetched and holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.read_state().is_empty()
    }

    /// True if no further page can be loaded.
    pub fn is_reaching_end(&self) -> bool {
        self.inner.read_state().is_reaching_end()
    }

    /// True until the first page is fetched or the first fetch fails.
    pub fn is_loading_initial_data(&self) -> bool {
        let state = self.inner.read_state();
        state.pages.is_empty() && state.last_error.is_none()
    }

    /// True while a page load is in flight.
    pub fn is_loading_more(&self) -> bool {
        self.inner.read_state().loading_more
    }

    /// True while any fetch is in flight.
    pub fn is_validating(&self) -> bool {
        let state = self.inner.read_state();
        state.loading_more || state.refreshes > 0
    }

    /// True while a refresh is in flight. The page count does not change until it completes.
    pub fn is_refreshing(&self) -> bool {
        self.inner.read_state().refreshes > 0
    }

    /// True until [`InfiniteCollectionSync::unsubscribe`] is called.
    pub fn is_subscribed(&self) -> bool {
        self.inner.is_subscribed()
    }
}

impl<T> Drop for InfiniteCollectionSync<T> {
    fn drop(&mut self) {
        self.inner.subscribed.store(false, Ordering::Release);
        // the in-flight load holds the inner state, release it so an unpolled load does not keep it alive
        self.inner.lock_in_flight().take();
    }
}

fn resolved(outcome: LoadOutcome) -> LoadMore {
    futures::future::ready(outcome).boxed().shared()
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        error::TransportError,
        ledger::{CollectionKey, ResourceKind},
    };

    struct VecSource {
        items: Vec<u32>,
        requests: Mutex<Vec<(u64, u64)>>,
        failing: AtomicBool,
        // pages after the first wait for a permit
        gate: Option<Arc<Notify>>,
    }

    impl VecSource {
        fn new(len: u32) -> Arc<Self> {
            Arc::new(Self {
                items: (0..len).collect(),
                requests: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
                gate: None,
            })
        }

        fn gated(len: u32, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                items: (0..len).collect(),
                requests: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
                gate: Some(gate),
            })
        }

        fn requests(&self) -> Vec<(u64, u64)> {
            self.requests.lock().unwrap().clone()
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl PageSource<u32> for VecSource {
        async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Page<u32>, SyncError> {
            self.requests.lock().unwrap().push((offset, limit));
            if offset > 0
                && let Some(gate) = &self.gate
            {
                gate.notified().await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(SyncError::Transport(TransportError::Network(
                    "connection refused".to_string(),
                )));
            }
            let start = (offset as usize).min(self.items.len());
            let end = (offset + limit).min(self.items.len() as u64) as usize;

            Ok(Page {
                items: self.items[start..end].to_vec(),
                offset,
                limit,
                total: Some(self.items.len() as u64),
            })
        }
    }

    fn subscribe(source: Arc<VecSource>, limit: u64) -> InfiniteCollectionSync<u32> {
        InfiniteCollectionSync::subscribe(
            CollectionKey::new(ResourceKind::Transaction),
            source,
            limit,
        )
    }

    #[tokio::test]
    async fn subscribe_loads_first_page() {
        let source = VecSource::new(100);
        let collection = subscribe(source.clone(), 30);
        assert!(collection.is_loading_initial_data());
        assert!(collection.is_loading_more());

        assert_eq!(
            collection.settled().await,
            Some(LoadOutcome::Loaded {
                page_index: 0,
                len: 30
            })
        );
        assert!(!collection.is_loading_initial_data());
        assert!(!collection.is_validating());
        assert_eq!(collection.items(), (0..30).collect::<Vec<_>>());
        assert_eq!(source.requests(), vec![(0, 30)]);
    }

    #[tokio::test]
    async fn concurrent_load_more_fetches_once() {
        let source = VecSource::new(100);
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        let first = collection.load_more();
        let second = collection.load_more();
        let (first, second) = futures::join!(first, second);

        assert_eq!(first, second);
        assert_eq!(source.requests(), vec![(0, 30), (31, 30)]);
        assert_eq!(collection.page_count(), 2);
    }

    #[tokio::test]
    async fn load_more_stops_at_short_page() {
        let source = VecSource::new(40);
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        assert_eq!(
            collection.load_more().await,
            LoadOutcome::Loaded {
                page_index: 1,
                len: 9
            }
        );
        assert!(collection.is_reaching_end());
        assert_eq!(collection.load_more().await, LoadOutcome::ReachedEnd);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn empty_collection_reaches_end() {
        let collection = subscribe(VecSource::new(0), 30);
        collection.settled().await;

        assert!(collection.is_empty());
        assert!(collection.is_reaching_end());
        assert_eq!(collection.load_more().await, LoadOutcome::ReachedEnd);
    }

    #[tokio::test]
    async fn failed_load_keeps_pages() {
        let source = VecSource::new(100);
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        source.set_failing(true);
        assert!(matches!(
            collection.load_more().await,
            LoadOutcome::Failed(SyncError::Transport(_))
        ));
        assert_eq!(collection.page_count(), 1);
        assert!(collection.last_error().is_some());

        source.set_failing(false);
        assert_eq!(
            collection.load_more().await,
            LoadOutcome::Loaded {
                page_index: 1,
                len: 30
            }
        );
        assert!(collection.last_error().is_none());
    }

    #[tokio::test]
    async fn failed_initial_load_is_not_loading() {
        let source = VecSource::new(100);
        source.set_failing(true);
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        assert!(!collection.is_loading_initial_data());
        assert!(!collection.is_empty());
        assert!(collection.last_error().is_some());
    }

    #[tokio::test]
    async fn refresh_replaces_visible_window() {
        let source = VecSource::new(100);
        let collection = subscribe(source.clone(), 10);
        collection.settled().await;
        collection.load_more().await;
        let before = collection.items();

        assert_eq!(
            collection.refresh().await,
            LoadOutcome::Refreshed { page_count: 2 }
        );
        assert_eq!(source.requests().last(), Some(&(0, 20)));
        assert_eq!(collection.page_count(), 2);
        assert_eq!(collection.items(), before);
        assert!(!collection.is_refreshing());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_pages() {
        let source = VecSource::new(100);
        let collection = subscribe(source.clone(), 10);
        collection.settled().await;

        source.set_failing(true);
        assert!(matches!(collection.refresh().await, LoadOutcome::Failed(_)));
        assert_eq!(collection.page_count(), 1);
        assert!(collection.last_error().is_some());
    }

    #[tokio::test]
    async fn response_after_unsubscribe_is_discarded() {
        let gate = Arc::new(Notify::new());
        let collection = subscribe(VecSource::gated(100, gate.clone()), 30);
        collection.settled().await;

        let load = tokio::spawn(collection.load_more());
        tokio::task::yield_now().await;
        collection.unsubscribe();
        gate.notify_one();

        assert_eq!(load.await.unwrap(), LoadOutcome::Discarded);
        assert_eq!(collection.page_count(), 1);
        assert_eq!(
            collection.load_more().await,
            LoadOutcome::Failed(SyncError::Unsubscribed)
        );
    }

    #[tokio::test]
    async fn refresh_supersedes_load_in_flight() {
        let gate = Arc::new(Notify::new());
        let source = VecSource::gated(100, gate.clone());
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        let load = tokio::spawn(collection.load_more());
        tokio::task::yield_now().await;
        assert_eq!(
            collection.refresh().await,
            LoadOutcome::Refreshed { page_count: 1 }
        );
        gate.notify_one();

        assert_eq!(load.await.unwrap(), LoadOutcome::Discarded);
        assert_eq!(collection.page_count(), 1);
        assert_eq!(collection.items(), (0..30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn load_more_after_refresh_starts_a_new_load() {
        let gate = Arc::new(Notify::new());
        let source = VecSource::gated(100, gate.clone());
        let collection = subscribe(source.clone(), 30);
        collection.settled().await;

        let stale = tokio::spawn(collection.load_more());
        tokio::task::yield_now().await;
        assert_eq!(
            collection.refresh().await,
            LoadOutcome::Refreshed { page_count: 1 }
        );

        let after = tokio::spawn(collection.load_more());
        tokio::task::yield_now().await;
        assert!(collection.is_loading_more());
        gate.notify_waiters();

        assert_eq!(stale.await.unwrap(), LoadOutcome::Discarded);
        assert_eq!(
            after.await.unwrap(),
            LoadOutcome::Loaded {
                page_index: 1,
                len: 30
            }
        );
        assert_eq!(
            source.requests(),
            vec![(0, 30), (31, 30), (0, 30), (31, 30)]
        );
        assert_eq!(collection.page_count(), 2);
        assert!(!collection.is_loading_more());
    }
}
