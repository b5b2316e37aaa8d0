use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

use crate::{
    error::{AppError, AppResult},
    models::{AnalyticsKey, CacheEntry},
    services::{
        clock::Clock,
        deadline::{self, DEFAULT_CALL_TIMEOUT},
    },
};

/// Backing storage for derived analytics values
#[async_trait::async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn get(&self, key: &AnalyticsKey) -> AppResult<Option<CacheEntry>>;

    async fn put(&self, key: &AnalyticsKey, entry: &CacheEntry) -> AppResult<()>;

    /// Removes every entry owned by `owner`, returning how many were dropped
    async fn clear_owner(&self, owner: &str) -> AppResult<usize>;
}

/// Per-call cache behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Overrides the category TTL
    pub ttl: Option<Duration>,
    pub force_refresh: bool,
}

impl CacheOptions {
    pub fn refresh(force_refresh: bool) -> Self {
        Self {
            ttl: None,
            force_refresh,
        }
    }
}

/// A value together with whether it came from the cache
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub cached: bool,
}

/// What callers that joined an in-flight generation receive
type Outcome = Result<serde_json::Value, Arc<AppError>>;

type Flight = watch::Receiver<Option<Outcome>>;

enum Role {
    Leader(watch::Sender<Option<Outcome>>, Flight),
    Follower(Flight),
}

/// Generate-or-fetch cache with per-category TTL and single-flight generation
///
/// The first caller to miss a key runs the generator on its own task; callers arriving
/// while it runs join that generation and receive its value or its error. At most one
/// generation per key is in flight, and it completes even if every caller goes away.
/// Every store call is bounded by the store timeout; an outage reads as a miss.
#[derive(Clone)]
pub struct AnalyticsCache {
    store: Arc<dyn AnalyticsStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    inflight: Arc<Mutex<HashMap<String, Flight>>>,
}

impl AnalyticsCache {
    pub fn new(store: Arc<dyn AnalyticsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            store_timeout: DEFAULT_CALL_TIMEOUT,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub async fn get_or_generate<T, F, Fut>(
        &self,
        key: AnalyticsKey,
        options: CacheOptions,
        generate: F,
    ) -> AppResult<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        self.get_or_generate_if(key, options, generate, |_: &T| true)
            .await
    }

    /// Like [`get_or_generate`](Self::get_or_generate), but a generated value is only
    /// stored when `keep` accepts it; rejected values are returned to this generation's
    /// callers and the next miss generates again.
    pub async fn get_or_generate_if<T, F, Fut, P>(
        &self,
        key: AnalyticsKey,
        options: CacheOptions,
        generate: F,
        keep: P,
    ) -> AppResult<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        P: FnOnce(&T) -> bool + Send + 'static,
    {
        if !options.force_refresh {
            let fresh =
                read_fresh(self.store.as_ref(), self.clock.as_ref(), self.store_timeout, &key)
                    .await
                    .and_then(|json| decode::<T>(&key, json));
            if let Some(value) = fresh {
                tracing::debug!(key = %key, "Analytics cache hit");
                return Ok(Cached {
                    value,
                    cached: true,
                });
            }
        }

        let storage_key = key.to_string();
        let role = {
            let mut inflight = self.inflight.lock().await;
            match inflight.get(&storage_key) {
                // A closed flight lost its leader to a panic and is taken over
                Some(flight) if flight.has_changed().is_ok() => Role::Follower(flight.clone()),
                _ => {
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(storage_key.clone(), rx.clone());
                    Role::Leader(tx, rx)
                }
            }
        };

        let (tx, own_flight) = match role {
            Role::Follower(flight) => {
                tracing::debug!(key = %key, "Joining in-flight analytics generation");
                return join(&key, flight).await;
            }
            Role::Leader(tx, flight) => (tx, flight),
        };

        tracing::debug!(
            key = %key,
            force_refresh = options.force_refresh,
            "Analytics cache miss, generating"
        );

        let flight = FlightContext {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            store_timeout: self.store_timeout,
            ttl: options.ttl.unwrap_or_else(|| key.category.ttl()),
            recheck: !options.force_refresh,
            key,
        };
        let inflight = Arc::clone(&self.inflight);

        let task = tokio::spawn(async move {
            let result = flight.run(generate, keep).await;

            let outcome: Outcome = match &result {
                Ok((_, Some(json))) => Ok(json.clone()),
                Ok((_, None)) => Err(Arc::new(AppError::Internal(
                    "generated value could not be shared".to_string(),
                ))),
                Err(e) => Err(Arc::new(replay(e))),
            };

            {
                let mut inflight = inflight.lock().await;
                if inflight
                    .get(&storage_key)
                    .is_some_and(|current| current.same_channel(&own_flight))
                {
                    inflight.remove(&storage_key);
                }
                let _ = tx.send(Some(outcome));
            }

            result.map(|(cached, _)| cached)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(AppError::Internal(format!(
                "Analytics generation task failed: {}",
                e
            ))),
        }
    }

    /// Drops every cached value owned by `owner`
    pub async fn clear_owner(&self, owner: &str) -> AppResult<usize> {
        let removed = deadline::bounded(
            self.store_timeout,
            "analytics cache clear",
            self.store.clear_owner(owner),
            AppError::CacheUnavailable,
        )
        .await
        .map_err(|e| match e {
            AppError::CacheUnavailable(_) => e,
            other => AppError::CacheUnavailable(other.to_string()),
        })?;
        tracing::info!(owner = %owner, removed = removed, "Cleared analytics cache");
        Ok(removed)
    }

    /// Whether a generation is currently running for `key`
    pub async fn is_in_flight(&self, key: &AnalyticsKey) -> bool {
        self.inflight.lock().await.contains_key(&key.to_string())
    }
}

/// Everything the generation task needs once the caller has handed it off
struct FlightContext {
    store: Arc<dyn AnalyticsStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    ttl: Duration,
    recheck: bool,
    key: AnalyticsKey,
}

impl FlightContext {
    /// The value for this flight and its JSON form for joined callers
    async fn run<T, F, Fut, P>(
        &self,
        generate: F,
        keep: P,
    ) -> AppResult<(Cached<T>, Option<serde_json::Value>)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
        P: FnOnce(&T) -> bool,
    {
        let key = &self.key;

        // A generation that finished just before this one registered may have stored it
        if self.recheck {
            let fresh =
                read_fresh(self.store.as_ref(), self.clock.as_ref(), self.store_timeout, key)
                    .await;
            if let Some(json) = fresh {
                if let Some(value) = decode::<T>(key, json.clone()) {
                    tracing::debug!(key = %key, "Analytics cache hit after registering");
                    return Ok((
                        Cached {
                            value,
                            cached: true,
                        },
                        Some(json),
                    ));
                }
            }
        }

        let value = generate().await?;

        let json = match serde_json::to_value(&value) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache serialization error");
                None
            }
        };

        let kept = json.is_some() && keep(&value);

        match &json {
            Some(json) if kept => {
                let entry = CacheEntry {
                    key: key.to_string(),
                    value: json.clone(),
                    generated_at: self.clock.now(),
                    ttl_secs: self.ttl.as_secs(),
                };
                let stored = deadline::bounded(
                    self.store_timeout,
                    "analytics cache write",
                    self.store.put(key, &entry),
                    AppError::CacheUnavailable,
                )
                .await;
                if let Err(e) = stored {
                    tracing::warn!(key = %key, error = %e, "Failed to store analytics value");
                }
            }
            Some(_) => {
                tracing::debug!(key = %key, "Analytics value not kept, skipping store");
            }
            None => {}
        }

        Ok((
            Cached {
                value,
                cached: false,
            },
            json,
        ))
    }
}

/// Waits for the leader of a flight and adopts its outcome
async fn join<T: DeserializeOwned>(
    key: &AnalyticsKey,
    mut flight: Flight,
) -> AppResult<Cached<T>> {
    let outcome = match flight.wait_for(Option::is_some).await {
        Ok(slot) => slot.clone(),
        Err(_) => None,
    };

    match outcome {
        Some(Ok(json)) => serde_json::from_value(json)
            .map(|value| Cached {
                value,
                cached: true,
            })
            .map_err(|e| {
                AppError::Internal(format!(
                    "shared analytics value for {} undecodable: {}",
                    key, e
                ))
            }),
        Some(Err(e)) => Err(replay(&e)),
        None => Err(AppError::Internal(format!(
            "analytics generation for {} ended without a result",
            key
        ))),
    }
}

/// Fresh entry JSON for `key`; store outages, timeouts and stale entries count as misses
async fn read_fresh(
    store: &dyn AnalyticsStore,
    clock: &dyn Clock,
    store_timeout: Duration,
    key: &AnalyticsKey,
) -> Option<serde_json::Value> {
    let read = deadline::bounded(
        store_timeout,
        "analytics cache read",
        store.get(key),
        AppError::CacheUnavailable,
    )
    .await;

    let entry = match read {
        Ok(entry) => entry?,
        Err(e) => {
            tracing::warn!(
                key = %key,
                error = %e,
                "Analytics cache unavailable, treating as miss"
            );
            return None;
        }
    };

    entry.is_fresh(clock.now()).then_some(entry.value)
}

fn decode<T: DeserializeOwned>(key: &AnalyticsKey, json: serde_json::Value) -> Option<T> {
    match serde_json::from_value(json) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

/// Copy of an error for callers that joined someone else's generation
fn replay(error: &AppError) -> AppError {
    match error {
        AppError::Validation(e) => AppError::Validation(e.clone()),
        AppError::SessionStorage(m) => AppError::SessionStorage(m.clone()),
        AppError::ProviderDegraded(m) => AppError::ProviderDegraded(m.clone()),
        AppError::Generation(m) => AppError::Generation(m.clone()),
        AppError::CacheUnavailable(m) => AppError::CacheUnavailable(m.clone()),
        AppError::NotFound(m) => AppError::NotFound(m.clone()),
        AppError::Internal(m) => AppError::Internal(m.clone()),
        other => AppError::Internal(other.to_string()),
    }
}

/// Process-local store, used when no Redis is configured and in tests
#[derive(Default)]
pub struct InMemoryAnalyticsStore {
    entries: RwLock<HashMap<String, (String, CacheEntry)>>,
}

impl InMemoryAnalyticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl AnalyticsStore for InMemoryAnalyticsStore {
    async fn get(&self, key: &AnalyticsKey) -> AppResult<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&key.to_string()).map(|(_, entry)| entry.clone()))
    }

    async fn put(&self, key: &AnalyticsKey, entry: &CacheEntry) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (key.owner.clone(), entry.clone()));
        Ok(())
    }

    async fn clear_owner(&self, owner: &str) -> AppResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (entry_owner, _)| entry_owner != owner);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalyticsCategory;
    use crate::services::clock::ManualClock;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (AnalyticsCache, Arc<ManualClock>, Arc<InMemoryAnalyticsStore>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryAnalyticsStore::new());
        let cache = AnalyticsCache::new(store.clone(), clock.clone());
        (cache, clock, store)
    }

    fn key(owner: &str, name: &str) -> AnalyticsKey {
        AnalyticsKey::new(Some(owner), AnalyticsCategory::Engagement, name)
    }

    fn counting_generator(
        calls: Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = AppResult<u32>> + Send>> {
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    const FRESH: CacheOptions = CacheOptions {
        ttl: None,
        force_refresh: false,
    };
    const REFRESH: CacheOptions = CacheOptions {
        ttl: None,
        force_refresh: true,
    };

    async fn fetch(
        cache: &AnalyticsCache,
        key: AnalyticsKey,
        options: CacheOptions,
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> Cached<u32> {
        cache
            .get_or_generate(key, options, counting_generator(calls.clone(), value))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_is_cached() {
        let (cache, _clock, _store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = fetch(&cache, key("u1", "score"), FRESH, &calls, 7).await;
        let second = fetch(&cache, key("u1", "score"), FRESH, &calls, 8).await;

        assert_eq!(first, Cached { value: 7, cached: false });
        assert_eq!(second, Cached { value: 7, cached: true });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_regenerates() {
        let (cache, _clock, _store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        fetch(&cache, key("u1", "score"), FRESH, &calls, 1).await;
        let refreshed = fetch(&cache, key("u1", "score"), REFRESH, &calls, 2).await;

        assert_eq!(refreshed, Cached { value: 2, cached: false });
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let after = fetch(&cache, key("u1", "score"), FRESH, &calls, 3).await;
        assert_eq!(after, Cached { value: 2, cached: true });
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let (cache, clock, _store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        fetch(&cache, key("u1", "score"), FRESH, &calls, 1).await;

        clock.advance(chrono::Duration::seconds(
            AnalyticsCategory::Engagement.ttl().as_secs() as i64,
        ));

        let result = fetch(&cache, key("u1", "score"), FRESH, &calls, 2).await;
        assert_eq!(result, Cached { value: 2, cached: false });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_override() {
        let (cache, clock, _store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = CacheOptions {
            ttl: Some(Duration::from_secs(10)),
            force_refresh: false,
        };

        fetch(&cache, key("u1", "short"), options, &calls, 1).await;
        clock.advance(chrono::Duration::seconds(11));
        let result = fetch(&cache, key("u1", "short"), options, &calls, 2).await;
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_concurrent_calls_generate_once() {
        let (cache, _clock, _store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_generate(
                        key("u1", "slow"),
                        CacheOptions::default(),
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, AppError>(99u32)
                        },
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut generated = 0;
        for handle in handles {
            let result = handle.await.unwrap();
            assert_eq!(result.value, 99);
            if !result.cached {
                generated += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(generated, 1);
        assert!(!cache.is_in_flight(&key("u1", "slow")).await);
    }

    #[tokio::test]
    async fn test_generation_survives_caller_cancellation() {
        let (cache, _clock, store) = setup();

        let call = cache.get_or_generate(
            key("u1", "abandoned"),
            CacheOptions::default(),
            || async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, AppError>(5u32)
            },
        );
        let _ = tokio::time::timeout(Duration::from_millis(5), call).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.len().await, 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let result = fetch(&cache, key("u1", "abandoned"), FRESH, &calls, 6).await;
        assert_eq!(result, Cached { value: 5, cached: true });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generator_error_is_not_cached() {
        let (cache, _clock, store) = setup();

        let result = cache
            .get_or_generate(key("u1", "broken"), CacheOptions::default(), || async {
                Err::<u32, _>(AppError::Generation("catalog unreachable".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Generation(_))));
        assert!(store.is_empty().await);
    }

    struct UnavailableStore;

    #[async_trait::async_trait]
    impl AnalyticsStore for UnavailableStore {
        async fn get(&self, _key: &AnalyticsKey) -> AppResult<Option<CacheEntry>> {
            Err(AppError::CacheUnavailable("connection refused".into()))
        }

        async fn put(&self, _key: &AnalyticsKey, _entry: &CacheEntry) -> AppResult<()> {
            Err(AppError::CacheUnavailable("connection refused".into()))
        }

        async fn clear_owner(&self, _owner: &str) -> AppResult<usize> {
            Err(AppError::CacheUnavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_falls_back_to_generation() {
        let cache = AnalyticsCache::new(
            Arc::new(UnavailableStore),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let result = fetch(&cache, key("u1", "score"), FRESH, &calls, 3).await;
        assert_eq!(result, Cached { value: 3, cached: false });

        let cleared = cache.clear_owner("u1").await;
        assert!(matches!(cleared, Err(AppError::CacheUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failed_generation_is_shared_and_never_overlaps() {
        let (cache, _clock, store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let spawn_call = |delay_ms: u64| {
            let cache = cache.clone();
            let calls = calls.clone();
            let active = active.clone();
            let max_active = max_active.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                cache
                    .get_or_generate(key("u1", "flaky"), FRESH, move || async move {
                        let attempt = calls.fetch_add(1, Ordering::SeqCst);
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        if attempt == 0 {
                            Err(AppError::Generation("catalog unreachable".into()))
                        } else {
                            Ok(11u32)
                        }
                    })
                    .await
            })
        };

        let first = spawn_call(0);
        let joined = spawn_call(20);
        let later = spawn_call(140);

        assert!(matches!(first.await.unwrap(), Err(AppError::Generation(_))));
        assert!(matches!(joined.await.unwrap(), Err(AppError::Generation(_))));
        assert_eq!(
            later.await.unwrap().unwrap(),
            Cached {
                value: 11,
                cached: false
            }
        );

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
        assert!(!cache.is_in_flight(&key("u1", "flaky")).await);
    }

    #[tokio::test]
    async fn test_joined_caller_shares_leader_value() {
        let (cache, _clock, _store) = setup();

        let leader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_generate(key("u1", "slow"), FRESH, || async {
                        tokio::time::sleep(Duration::from_millis(60)).await;
                        Ok::<_, AppError>(42u32)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_in_flight(&key("u1", "slow")).await);

        let calls = Arc::new(AtomicUsize::new(0));
        let joined = fetch(&cache, key("u1", "slow"), FRESH, &calls, 1).await;

        assert_eq!(joined, Cached { value: 42, cached: true });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(leader.await.unwrap().unwrap().value, 42);
    }

    #[tokio::test]
    async fn test_rejected_value_is_returned_but_not_stored() {
        let (cache, _clock, store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let result = cache
                .get_or_generate_if(
                    key("u1", "partial"),
                    FRESH,
                    counting_generator(calls.clone(), 3),
                    |value: &u32| *value > 10,
                )
                .await
                .unwrap();
            assert_eq!(result, Cached { value: 3, cached: false });
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty().await);

        let kept = cache
            .get_or_generate_if(
                key("u1", "partial"),
                FRESH,
                counting_generator(calls.clone(), 12),
                |value: &u32| *value > 10,
            )
            .await
            .unwrap();
        assert_eq!(kept.value, 12);
        assert_eq!(store.len().await, 1);
    }

    struct HangingStore;

    #[async_trait::async_trait]
    impl AnalyticsStore for HangingStore {
        async fn get(&self, _key: &AnalyticsKey) -> AppResult<Option<CacheEntry>> {
            std::future::pending().await
        }

        async fn put(&self, _key: &AnalyticsKey, _entry: &CacheEntry) -> AppResult<()> {
            std::future::pending().await
        }

        async fn clear_owner(&self, _owner: &str) -> AppResult<usize> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hung_store_reads_as_miss_within_timeout() {
        let cache = AnalyticsCache::new(
            Arc::new(HangingStore),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .with_store_timeout(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            fetch(&cache, key("u1", "score"), FRESH, &calls, 4),
        )
        .await
        .expect("hung store must not block generation");
        assert_eq!(result, Cached { value: 4, cached: false });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let cleared = tokio::time::timeout(Duration::from_secs(1), cache.clear_owner("u1"))
            .await
            .expect("hung store must not block clearing");
        assert!(matches!(cleared, Err(AppError::CacheUnavailable(_))));
    }

    #[tokio::test]
    async fn test_clear_owner_only_removes_that_owner() {
        let (cache, _clock, store) = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        for (owner, name) in [("u1", "a"), ("u1", "b"), ("u2", "a")] {
            fetch(&cache, key(owner, name), FRESH, &calls, 1).await;
        }

        assert_eq!(cache.clear_owner("u1").await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
    }
}
