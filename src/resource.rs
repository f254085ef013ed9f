use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex as FetchLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::types::ResourceKey;

/// Per-query tuning: how long a fetched value stays fresh, and whether the
/// resource should be refreshed on a cadence while subscribed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceOptions {
    pub stale_time: Option<Duration>,
    pub refetch_interval: Option<Duration>,
}

impl ResourceOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Within this window after a successful fetch, reads return the cached
    /// value without a network call.
    #[must_use]
    pub fn stale_time(mut self, window: Duration) -> Self {
        self.stale_time = Some(window);
        self
    }

    /// Refresh the resource at this cadence while a [`PollHandle`] from
    /// [`ResourceCache::subscribe`] is alive.
    #[must_use]
    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }
}

/// Observed state of one resource.
///
/// A failed refresh never discards the last known-good `data`: callers see
/// the stale value plus the `error`, and decide how to render the
/// combination. Loading (`data` and `error` both absent) only occurs before
/// the first fetch completes.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub data: Option<JsonValue>,
    pub error: Option<FetchError>,
    /// When `data` was last successfully fetched, on the tokio clock.
    pub updated_at: Option<Instant>,
}

impl Resource {
    /// True before the first fetch for this key has completed.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }
}

#[derive(Default)]
struct EntryState {
    resource: Resource,
    /// Bumped on every completed fetch (success or failure). A caller that
    /// waited on the fetch lock compares generations to tell "someone
    /// fetched while I waited" from "still stale".
    generation: u64,
}

#[derive(Default)]
struct Entry {
    state: Mutex<EntryState>,
    fetch_lock: FetchLock<()>,
}

impl Entry {
    fn fresh(&self, stale_time: Option<Duration>) -> Option<Resource> {
        let state = self.state.lock().expect("resource state poisoned");
        let window = stale_time?;
        let updated_at = state.resource.updated_at?;
        (updated_at.elapsed() < window).then(|| state.resource.clone())
    }

    fn snapshot(&self) -> (Resource, u64) {
        let state = self.state.lock().expect("resource state poisoned");
        (state.resource.clone(), state.generation)
    }

    fn record(&self, result: Result<JsonValue, FetchError>) -> Resource {
        let mut state = self.state.lock().expect("resource state poisoned");
        match result {
            Ok(value) => {
                state.resource.data = Some(value);
                state.resource.error = None;
                state.resource.updated_at = Some(Instant::now());
            }
            Err(e) => {
                // Stale-while-revalidate: keep the last good data.
                state.resource.error = Some(e);
            }
        }
        state.generation += 1;
        state.resource.clone()
    }
}

/// Process-wide cache of backing-API resources.
///
/// One logical resource per [`ResourceKey`]; per key, at most one fetch is
/// in flight at a time — concurrent readers coalesce onto it instead of
/// issuing duplicates. Cheap to clone, clones share the same cache.
#[derive(Clone, Default)]
pub struct ResourceCache {
    entries: Arc<Mutex<HashMap<ResourceKey, Arc<Entry>>>>,
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &ResourceKey) -> Arc<Entry> {
        let mut entries = self.entries.lock().expect("resource cache poisoned");
        entries.entry(key.clone()).or_default().clone()
    }

    /// Read the resource, fetching if it is absent or stale.
    ///
    /// Within `options.stale_time` of the last successful fetch the cached
    /// value is returned and `fetcher` is not invoked. When a fetch is
    /// needed, concurrent callers for the same key share the single
    /// in-flight result (including its failure). `refetch_interval` is the
    /// concern of [`subscribe`](Self::subscribe); this method performs at
    /// most one fetch.
    pub async fn get_with<F, Fut>(
        &self,
        key: ResourceKey,
        options: ResourceOptions,
        fetcher: F,
    ) -> Resource
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<JsonValue, FetchError>>,
    {
        let entry = self.entry(&key);

        if let Some(resource) = entry.fresh(options.stale_time) {
            return resource;
        }
        let (_, start_generation) = entry.snapshot();

        let _guard = entry.fetch_lock.lock().await;

        // Someone may have completed a fetch while we waited on the lock;
        // their result is our result.
        let (resource, generation) = entry.snapshot();
        if generation != start_generation {
            return resource;
        }
        if let Some(resource) = entry.fresh(options.stale_time) {
            return resource;
        }

        entry.record(fetcher().await)
    }

    /// Subscribe to a resource: read it now and, if the options ask for a
    /// refetch cadence, keep it refreshed in the background for as long as
    /// the returned [`PollHandle`] is alive.
    pub async fn subscribe<F, Fut>(
        &self,
        key: ResourceKey,
        options: ResourceOptions,
        fetcher: F,
    ) -> (Resource, Option<PollHandle>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, FetchError>> + Send,
    {
        let resource = self
            .get_with(key.clone(), options, &fetcher)
            .await;

        // The read above already fetched (or found a fresh value), so the
        // poll task must not fire again until a full interval has elapsed.
        let handle = options
            .refetch_interval
            .map(|interval| self.spawn_poll(key, interval, fetcher, true));

        (resource, handle)
    }

    /// Refresh the resource at `interval` for as long as the returned
    /// handle is alive. The first refresh happens immediately.
    ///
    /// Failures update the resource's `error` and leave `data` intact.
    #[must_use]
    pub fn poll<F, Fut>(&self, key: ResourceKey, interval: Duration, fetcher: F) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, FetchError>> + Send,
    {
        self.spawn_poll(key, interval, fetcher, false)
    }

    fn spawn_poll<F, Fut>(
        &self,
        key: ResourceKey,
        interval: Duration,
        fetcher: F,
        skip_immediate: bool,
    ) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JsonValue, FetchError>> + Send,
    {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            if skip_immediate {
                // interval's first tick completes at once; consume it when
                // the caller has just fetched this resource itself.
                ticker.tick().await;
            }
            loop {
                ticker.tick().await;
                let entry = cache.entry(&key);
                let _guard = entry.fetch_lock.lock().await;
                entry.record(fetcher().await);
            }
        });
        PollHandle { task }
    }

    /// Current state of the resource, without fetching.
    #[must_use]
    pub fn snapshot(&self, key: &ResourceKey) -> Option<Resource> {
        let entries = self.entries.lock().expect("resource cache poisoned");
        entries.get(key).map(|entry| entry.snapshot().0)
    }
}

/// Guard for a background refresh task; dropping it stops the refreshes.
///
/// "Active use" of a polled resource is exactly the lifetime of this
/// handle.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop refreshing. Equivalent to dropping the handle.
    pub fn stop(self) {}
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    type BoxedFetch =
        std::pin::Pin<Box<dyn Future<Output = Result<JsonValue, FetchError>> + Send>>;

    fn counting_fetcher(
        count: Arc<AtomicUsize>,
        value: JsonValue,
    ) -> impl Fn() -> BoxedFetch + Send + Sync + 'static {
        move || {
            let count = count.clone();
            let value = value.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(value)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_served_without_fetch() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("health");
        let options = ResourceOptions::new().stale_time(Duration::from_secs(30));

        let first = cache
            .get_with(key.clone(), options, counting_fetcher(count.clone(), json!({"ok": true})))
            .await;
        assert_eq!(first.data, Some(json!({"ok": true})));
        assert!(first.error.is_none());

        let second = cache
            .get_with(key, options, counting_fetcher(count.clone(), json!({"ok": false})))
            .await;
        assert_eq!(second.data, Some(json!({"ok": true})), "stale window must reuse cache");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_refetched_after_window() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("health");
        let options = ResourceOptions::new().stale_time(Duration::from_secs(30));

        cache
            .get_with(key.clone(), options, counting_fetcher(count.clone(), json!(1)))
            .await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        let refreshed = cache
            .get_with(key, options, counting_fetcher(count.clone(), json!(2)))
            .await;

        assert_eq!(refreshed.data, Some(json!(2)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_readers_share_one_fetch() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("dashboard");
        let options = ResourceOptions::new().stale_time(Duration::from_secs(30));

        let (a, b) = tokio::join!(
            cache.get_with(key.clone(), options, counting_fetcher(count.clone(), json!("x"))),
            cache.get_with(key.clone(), options, counting_fetcher(count.clone(), json!("x"))),
        );

        assert_eq!(a.data, Some(json!("x")));
        assert_eq!(b.data, Some(json!("x")));
        assert_eq!(count.load(Ordering::SeqCst), 1, "duplicate fetch for one key");
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_shares_in_flight_result_even_without_stale_time() {
        // No staleness window configured: sequential calls each fetch, but
        // *concurrent* calls still coalesce.
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("no-stale");

        let (_, _) = tokio::join!(
            cache.get_with(key.clone(), ResourceOptions::new(), counting_fetcher(count.clone(), json!(1))),
            cache.get_with(key.clone(), ResourceOptions::new(), counting_fetcher(count.clone(), json!(1))),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);

        cache
            .get_with(key, ResourceOptions::new(), counting_fetcher(count.clone(), json!(2)))
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_last_good_data() {
        let cache = ResourceCache::new();
        let key = ResourceKey::shared("flaky");

        let ok = cache
            .get_with(key.clone(), ResourceOptions::new(), || async {
                Ok(json!({"v": 1}))
            })
            .await;
        assert_eq!(ok.data, Some(json!({"v": 1})));

        let failed = cache
            .get_with(key.clone(), ResourceOptions::new(), || async {
                Err(FetchError::Status {
                    status: 503,
                    body: "unavailable".into(),
                })
            })
            .await;

        assert_eq!(failed.data, Some(json!({"v": 1})), "stale data discarded on error");
        assert!(matches!(failed.error, Some(FetchError::Status { status: 503, .. })));
        assert!(!failed.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_before_first_success_leaves_data_unset() {
        let cache = ResourceCache::new();
        let key = ResourceKey::shared("dead");

        let failed = cache
            .get_with(key, ResourceOptions::new(), || async {
                Err(FetchError::Transport("refused".into()))
            })
            .await;

        assert!(failed.data.is_none());
        assert!(matches!(failed.error, Some(FetchError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fetches_immediately_then_on_cadence() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("health");

        let handle = cache.poll(
            key.clone(),
            Duration::from_secs(30),
            counting_fetcher(count.clone(), json!({"status": "up"})),
        );

        // Immediate first fetch.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.snapshot(&key).unwrap().data,
            Some(json!({"status": "up"}))
        );

        // Repeated reads inside the window reuse the cache.
        let read = cache
            .get_with(
                key.clone(),
                ResourceOptions::new().stale_time(Duration::from_secs(30)),
                counting_fetcher(count.clone(), json!("never")),
            )
            .await;
        assert_eq!(read.data, Some(json!({"status": "up"})));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Not yet: 29s in.
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Past the cadence: second fetch happened.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_polling() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::shared("health");

        let handle = cache.poll(
            key,
            Duration::from_secs(10),
            counting_fetcher(count.clone(), json!(null)),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "poll task outlived its handle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_returns_data_and_polls() {
        let cache = ResourceCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let key = ResourceKey::user("alice", "notifications");
        let options = ResourceOptions::new()
            .stale_time(Duration::from_secs(5))
            .refetch_interval(Duration::from_secs(30));

        let (resource, handle) = cache
            .subscribe(key, options, counting_fetcher(count.clone(), json!([])))
            .await;

        assert_eq!(resource.data, Some(json!([])));
        let handle = handle.expect("refetch_interval set, handle expected");

        // The subscribe read fetched once; the poll task must not add a
        // second fetch at startup.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "poll duplicated the initial fetch");

        tokio::time::sleep(Duration::from_secs(28)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Only after a full interval does the refresh fire.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_scoped_keys_do_not_share_slots() {
        let cache = ResourceCache::new();
        let options = ResourceOptions::new().stale_time(Duration::from_secs(60));

        let alice = cache
            .get_with(
                ResourceKey::user("alice", "prefs"),
                options,
                || async { Ok(json!({"theme": "dark"})) },
            )
            .await;
        let bob = cache
            .get_with(
                ResourceKey::user("bob", "prefs"),
                options,
                || async { Ok(json!({"theme": "light"})) },
            )
            .await;

        assert_eq!(alice.data, Some(json!({"theme": "dark"})));
        assert_eq!(bob.data, Some(json!({"theme": "light"})), "cross-user cache leak");
    }
}
