//! Cache gate: serve a fresh cached payload, otherwise fetch, parse, and
//! persist. At most one fetch per cache key is in flight; concurrent loads
//! of the same key await that fetch instead of starting their own.
//!
//! The fetch runs on its own task, so a caller that gives up waiting does
//! not cancel it and the next reader still finds the populated cache.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use kusuri_core::CachedPayload;
use kusuri_store::CacheStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::feed::Feed;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::FeedError;

/// Where the records of a [`Loaded`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// A stored payload still inside the feed's freshness window.
    Cache,
    /// A fetch made by this load, or one it joined while in flight.
    Network,
}

/// Data returned by one load, with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loaded<T> {
    /// The feed's records, or a value mapped from them.
    pub data: T,
    pub provenance: Provenance,
    /// Epoch milliseconds at which the data was fetched.
    pub fetched_at: i64,
}

impl<T> Loaded<T> {
    /// Transform the data, keeping provenance and fetch time.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loaded<U> {
        Loaded {
            data: f(self.data),
            provenance: self.provenance,
            fetched_at: self.fetched_at,
        }
    }
}

type FetchResult<R> = Result<Arc<CachedPayload<R>>, FeedError>;
type SharedFetch<R> = Shared<BoxFuture<'static, FetchResult<R>>>;
type InFlight<R> = Arc<Mutex<HashMap<String, SharedFetch<R>>>>;

fn lock<R>(inflight: &InFlight<R>) -> MutexGuard<'_, HashMap<String, SharedFetch<R>>> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the in-flight entry when the fetch task ends, including on panic.
struct InFlightGuard<R> {
    inflight: InFlight<R>,
    key: String,
}

impl<R> Drop for InFlightGuard<R> {
    fn drop(&mut self) {
        lock(&self.inflight).remove(&self.key);
    }
}

/// Cache gate for feeds producing records of type `R`.
///
/// One gate serves every feed with that record type; in-flight fetches are
/// keyed by [`Feed::cache_key`], so distinct queries never share a fetch.
/// All methods take `&self`, so one gate can sit behind an `Arc`.
pub struct CacheGate<R> {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    inflight: InFlight<R>,
    _records: PhantomData<fn() -> R>,
}

impl<R> CacheGate<R>
where
    R: Serialize + serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Gate reading and writing `store`, fetching through `fetcher`.
    pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            _records: PhantomData,
        }
    }

    /// Fresh cached records, or the result of a (possibly shared) fetch.
    ///
    /// Store read failures and undecodable entries count as misses. A fetch
    /// or parse failure is returned to every caller waiting on that key and
    /// leaves the cache untouched.
    pub async fn load<F>(&self, feed: &F) -> Result<Loaded<Vec<R>>, FeedError>
    where
        F: Feed<Record = R>,
    {
        let key = feed.cache_key();

        let joined = lock(&self.inflight).get(&key).cloned();
        if let Some(pending) = joined {
            debug!(feed = feed.name(), key = %key, "joining in-flight fetch");
            return Self::network(pending.await?);
        }

        if let Some(payload) = self.read_fresh(feed, &key).await {
            info!(feed = feed.name(), key = %key, count = payload.data.len(), "cache hit");
            return Ok(Loaded {
                fetched_at: payload.timestamp,
                data: payload.data,
                provenance: Provenance::Cache,
            });
        }

        let pending = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let shared = self.spawn_fetch(feed.clone(), key.clone());
                    inflight.insert(key.clone(), shared.clone());
                    shared
                }
            }
        };
        Self::network(pending.await?)
    }

    /// Drop every cached payload under `feed`'s key prefix, so a cleared
    /// search feed loses all of its queries. Returns how many were removed.
    pub async fn invalidate<F>(&self, feed: &F) -> Result<usize, FeedError>
    where
        F: Feed<Record = R>,
    {
        let prefix = feed.key_prefix();
        let removed = self.store.remove_prefix(&prefix, None).await?;
        info!(feed = feed.name(), prefix = %prefix, removed, "cache cleared");
        Ok(removed)
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    fn network(payload: Arc<CachedPayload<R>>) -> Result<Loaded<Vec<R>>, FeedError> {
        Ok(Loaded {
            data: payload.data.clone(),
            provenance: Provenance::Network,
            fetched_at: payload.timestamp,
        })
    }

    /// A cached payload younger than the feed's window. Read or decode
    /// failures count as a miss.
    async fn read_fresh<F>(&self, feed: &F, key: &str) -> Option<CachedPayload<R>>
    where
        F: Feed<Record = R>,
    {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(feed = feed.name(), key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(feed = feed.name(), key, error = %e, "cache read failed; fetching");
                return None;
            }
        };
        let payload: CachedPayload<R> = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(feed = feed.name(), key, error = %e, "cached payload unreadable; fetching");
                return None;
            }
        };
        let now = now_ms();
        if payload.is_fresh(now, feed.freshness_ms()) {
            Some(payload)
        } else {
            debug!(feed = feed.name(), key, age_ms = payload.age_ms(now), "cache stale");
            None
        }
    }

    fn spawn_fetch<F>(&self, feed: F, key: String) -> SharedFetch<R>
    where
        F: Feed<Record = R>,
    {
        let guard = InFlightGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
        };
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let handle = tokio::spawn(async move {
            let result = fetch_and_store(&feed, &key, fetcher.as_ref(), store.as_ref()).await;
            drop(guard);
            result
        });
        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(FeedError::Task(e.to_string())))
        }
        .boxed()
        .shared()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn fetch_and_store<F: Feed>(
    feed: &F,
    key: &str,
    fetcher: &dyn Fetcher,
    store: &dyn CacheStore,
) -> Result<Arc<CachedPayload<F::Record>>, FeedError> {
    if !feed.source().is_configured() {
        return Err(FeedError::NotConfigured(feed.name()));
    }
    let request = feed.request();
    let records = match fetcher.fetch(&request).await? {
        FetchOutcome::NoData => {
            info!(feed = feed.name(), "no data published yet");
            Vec::new()
        }
        FetchOutcome::Body(body) => feed.parse(&body)?,
    };
    let payload = CachedPayload::new(records, now_ms());
    info!(feed = feed.name(), count = payload.data.len(), "fetched from network");

    if payload.data.is_empty() {
        debug!(feed = feed.name(), key, "empty result not cached");
        return Ok(Arc::new(payload));
    }
    match serde_json::to_string(&payload) {
        Ok(json) => {
            if let Err(e) = store.put(key, json).await {
                warn!(feed = feed.name(), key, error = %e, "cache write failed");
            } else if feed.supersedes_prefix() {
                prune_superseded(feed, key, store).await;
            }
        }
        Err(e) => warn!(feed = feed.name(), key, error = %e, "cache encode failed"),
    }
    Ok(Arc::new(payload))
}

/// Drop the entries a fresh write under `key` replaces. Failure only costs
/// disk space, so it is logged and ignored.
async fn prune_superseded<F: Feed>(feed: &F, key: &str, store: &dyn CacheStore) {
    let prefix = feed.key_prefix();
    match store.remove_prefix(&prefix, Some(key)).await {
        Ok(0) => {}
        Ok(pruned) => debug!(feed = feed.name(), key, pruned, "older cache entries pruned"),
        Err(e) => warn!(feed = feed.name(), key, error = %e, "cache prune failed"),
    }
}
