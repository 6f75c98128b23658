//! Record store contract and bundled implementations.
//!
//! The decision engine keeps no per-key state of its own. Everything it knows about a caller
//! lives behind [`RecordStore`]: plain records with a time-to-live (usage and retry counters)
//! and one ordered, score-indexed collection per key (pattern history). Any key-value store
//! with sorted-set-like structures satisfies the contract; Redis maps onto it one to one
//! (`GET`, `SETEX`, `DEL`, `ZADD`, `ZRANGE 0 -1`, `ZREMRANGEBYSCORE`).
//!
//! - [`InMemoryRecordStore`]: process-local store for tests, demos, and single-node setups.
//! - [`TimeoutStore`]: wraps any store and bounds every call with a deadline.

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::pattern::PATTERN_WINDOW_SECS;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Abstract storage interface for limiter state.
///
/// Ordered collections follow sorted-set semantics: members are unique, so appending a value
/// that is byte-identical to an existing member only moves it to the new score.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a record, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Write a record that expires `ttl_secs` seconds from now.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl_secs: u64)
        -> Result<(), Self::Error>;

    /// Remove a record. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Self::Error>;

    /// Add `value` to the ordered collection at `key` with the given score.
    async fn append(&self, key: &str, score: u64, value: Vec<u8>) -> Result<(), Self::Error>;

    /// All members of the ordered collection, lowest score first.
    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, Self::Error>;

    /// Remove members whose score lies in `[min, max]`.
    async fn remove_score_range(&self, key: &str, min: u64, max: u64) -> Result<(), Self::Error>;
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore,
{
    type Error = S::Error;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        (**self).get(key).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(), Self::Error> {
        (**self).set_with_ttl(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        (**self).delete(key).await
    }

    async fn append(&self, key: &str, score: u64, value: Vec<u8>) -> Result<(), Self::Error> {
        (**self).append(key, score, value).await
    }

    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, Self::Error> {
        (**self).range_all(key).await
    }

    async fn remove_score_range(&self, key: &str, min: u64, max: u64) -> Result<(), Self::Error> {
        (**self).remove_score_range(key, min, max).await
    }
}

/// Minimum clock advance, in seconds, between two sweeps of the in-memory store.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Default)]
struct MemoryState {
    // key -> (bytes, expires_at_secs)
    records: HashMap<String, (Vec<u8>, u64)>,
    // key -> members ordered by (score, bytes)
    series: HashMap<String, Vec<(u64, Vec<u8>)>>,
    next_sweep: u64,
}

impl MemoryState {
    // Drops expired records and every series whose newest score is at least `retention`
    // seconds old. Runs at most once per SWEEP_INTERVAL_SECS of store time.
    fn sweep(&mut self, now: u64, retention: u64) {
        if now < self.next_sweep {
            return;
        }
        self.next_sweep = now.saturating_add(SWEEP_INTERVAL_SECS);
        self.records.retain(|_, (_, expires)| *expires > now);
        self.series.retain(|_, members| {
            members.last().is_some_and(|(newest, _)| newest.saturating_add(retention) > now)
        });
    }
}

/// Simple in-memory record store.
///
/// Expiry is evaluated lazily against the store's clock on read, so tests driving a
/// [`ManualClock`](crate::ManualClock) can expire usage windows without sleeping. Record
/// writes also sweep the whole store once the clock has moved [`SWEEP_INTERVAL_SECS`] past
/// the previous sweep: expired records go, and so do ordered collections that received
/// nothing within the pattern window. Memory therefore tracks the live key set rather than
/// every key ever written.
#[derive(Clone, Debug)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
    series_retention: u64,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` to decide when records expire.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
            series_retention: PATTERN_WINDOW_SECS,
        }
    }

    /// Keep idle ordered collections for `secs` after their newest member instead of the
    /// pattern window.
    pub fn with_series_retention(mut self, secs: u64) -> Self {
        self.series_retention = secs;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Whether a live (unexpired) record exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_secs();
        self.lock()
            .map(|guard| guard.records.get(key).is_some_and(|(_, exp)| *exp > now))
            .unwrap_or(false)
    }

    /// Number of members in the ordered collection at `key`.
    pub fn series_len(&self, key: &str) -> usize {
        self.lock().map(|guard| guard.series.get(key).map_or(0, Vec::len)).unwrap_or(0)
    }

    /// Records held, including expired ones not yet swept.
    pub fn record_count(&self) -> usize {
        self.lock().map(|guard| guard.records.len()).unwrap_or(0)
    }

    /// Ordered collections held, including idle ones not yet swept.
    pub fn series_count(&self) -> usize {
        self.lock().map(|guard| guard.series.len()).unwrap_or(0)
    }

    /// Overwrite a record with arbitrary bytes; used to simulate foreign or corrupt data.
    pub fn put_raw(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError> {
        let now = self.clock.now_secs();
        let mut guard = self.lock()?;
        guard.sweep(now, self.series_retention);
        guard.records.insert(key.to_string(), (value, now.saturating_add(ttl_secs)));
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    type Error = StoreError;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let now = self.clock.now_secs();
        let mut guard = self.lock()?;
        let expired = match guard.records.get(key) {
            Some((_, expires)) => *expires <= now,
            None => return Ok(None),
        };
        if expired {
            guard.records.remove(key);
            return Ok(None);
        }
        Ok(guard.records.get(key).map(|(value, _)| value.clone()))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(), Self::Error> {
        self.put_raw(key, value, ttl_secs)
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.lock()?.records.remove(key);
        Ok(())
    }

    async fn append(&self, key: &str, score: u64, value: Vec<u8>) -> Result<(), Self::Error> {
        let mut guard = self.lock()?;
        let members = guard.series.entry(key.to_string()).or_default();
        members.retain(|(_, existing)| *existing != value);
        let entry = (score, value);
        let at = members.partition_point(|member| *member < entry);
        members.insert(at, entry);
        Ok(())
    }

    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, Self::Error> {
        let guard = self.lock()?;
        Ok(guard
            .series
            .get(key)
            .map(|members| members.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default())
    }

    async fn remove_score_range(&self, key: &str, min: u64, max: u64) -> Result<(), Self::Error> {
        let mut guard = self.lock()?;
        if let Some(members) = guard.series.get_mut(key) {
            members.retain(|(score, _)| *score < min || *score > max);
            if members.is_empty() {
                guard.series.remove(key);
            }
        }
        Ok(())
    }
}

/// Bounds every call to the wrapped store with `timeout`.
///
/// An elapsed deadline surfaces as [`StoreError::Timeout`]; inner failures as
/// [`StoreError::Backend`].
#[derive(Debug, Clone)]
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStore<S> {
    /// Wrap `inner`. Panics if `timeout` is zero.
    pub fn new(inner: S, timeout: Duration) -> Self {
        assert!(timeout > Duration::ZERO, "store timeout must be non-zero");
        Self { inner, timeout }
    }

    /// Inspect the configured deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Borrow the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: RecordStore> TimeoutStore<S> {
    async fn bounded<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, S::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| StoreError::Backend(Box::new(e))),
            Err(_) => Err(StoreError::Timeout { op, timeout: self.timeout }),
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TimeoutStore<S> {
    type Error = StoreError;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl_secs: u64,
    ) -> Result<(), Self::Error> {
        self.bounded("set_with_ttl", self.inner.set_with_ttl(key, value, ttl_secs)).await
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn append(&self, key: &str, score: u64, value: Vec<u8>) -> Result<(), Self::Error> {
        self.bounded("append", self.inner.append(key, score, value)).await
    }

    async fn range_all(&self, key: &str) -> Result<Vec<Vec<u8>>, Self::Error> {
        self.bounded("range_all", self.inner.range_all(key)).await
    }

    async fn remove_score_range(&self, key: &str, min: u64, max: u64) -> Result<(), Self::Error> {
        self.bounded("remove_score_range", self.inner.remove_score_range(key, min, max)).await
    }
}
