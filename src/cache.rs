//! Shared, time-boxed cache in front of the upstream feed fetches.
//!
//! One slot per feed key. A slot's async lock is held across the upstream
//! fetch, so concurrent callers racing past an expired entry wait for the
//! in-flight fetch and then reuse its result instead of fetching again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::fetch::FetchError;

/// Default lifetime of a cached feed.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);
/// Default time past the TTL during which an old feed may stand in for a failed fetch.
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(30);

/// Source of "now" for cache ageing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// One fetched feed body. Never mutated; replaced whole on refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedBuffer {
    pub bytes: Bytes,
    pub fetched_at: DateTime<Utc>,
}

impl FeedBuffer {
    /// True if the buffer is younger than `window` at `now`.
    fn is_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .is_ok_and(|age| age < window)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Reused within the TTL.
    Cached,
    /// Fetched upstream by this call.
    Fetched,
    /// Upstream failed; an expired buffer still inside the grace window.
    Stale,
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub feed: FeedBuffer,
    pub freshness: Freshness,
}

type Slot = Arc<tokio::sync::Mutex<Option<FeedBuffer>>>;

pub struct FeedCache<C = SystemClock> {
    clock: C,
    stale_grace: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl FeedCache<SystemClock> {
    pub fn new(stale_grace: Duration) -> Self {
        Self::with_clock(SystemClock, stale_grace)
    }
}

impl<C: Clock> FeedCache<C> {
    pub fn with_clock(clock: C, stale_grace: Duration) -> Self {
        Self {
            clock,
            stale_grace,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Returns the cached buffer for `key` if younger than `ttl`, otherwise
    /// runs `fetch` and stores its result.
    ///
    /// A failed fetch never touches the stored entry. The previous buffer is
    /// returned as [`Freshness::Stale`] while it is younger than
    /// `ttl + stale_grace`; after that the fetch error is returned.
    pub async fn fetch_or_reuse<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<CacheLookup, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, FetchError>>,
    {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;
        let now = self.clock.now();

        if let Some(feed) = entry.as_ref().filter(|feed| feed.is_within(now, ttl)) {
            debug!(feed = key, fetched_at = %feed.fetched_at, "Feed served from cache");
            return Ok(CacheLookup {
                feed: feed.clone(),
                freshness: Freshness::Cached,
            });
        }

        match fetch().await {
            Ok(bytes) => {
                let feed = FeedBuffer {
                    bytes,
                    fetched_at: self.clock.now(),
                };
                info!(feed = key, bytes = feed.bytes.len(), "Feed fetched upstream");
                *entry = Some(feed.clone());
                Ok(CacheLookup {
                    feed,
                    freshness: Freshness::Fetched,
                })
            }
            Err(e) => match entry
                .as_ref()
                .filter(|feed| feed.is_within(now, ttl + self.stale_grace))
            {
                Some(feed) => {
                    warn!(feed = key, error = %e, fetched_at = %feed.fetched_at, "Upstream fetch failed, serving stale feed");
                    Ok(CacheLookup {
                        feed: feed.clone(),
                        freshness: Freshness::Stale,
                    })
                }
                None => {
                    warn!(feed = key, error = %e, "Upstream fetch failed, no usable cached feed");
                    Err(e)
                }
            },
        }
    }

    /// Current entry for `key`, without fetching.
    pub async fn peek(&self, key: &str) -> Option<FeedBuffer> {
        self.slot(key).lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestClock(Mutex<DateTime<Utc>>);

    impl TestClock {
        fn at(epoch: i64) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                DateTime::from_timestamp(epoch, 0).unwrap(),
            )))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += chrono::TimeDelta::seconds(secs);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    const TTL: Duration = Duration::from_secs(5);
    const GRACE: Duration = Duration::from_secs(30);

    async fn upstream(calls: &AtomicUsize, body: &'static [u8]) -> Result<Bytes, FetchError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(Bytes::from_static(body))
    }

    async fn failing(calls: &AtomicUsize) -> Result<Bytes, FetchError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Status(503))
    }

    #[tokio::test]
    async fn test_second_request_within_ttl_reuses_cache() {
        let clock = TestClock::at(1_700_000_000);
        let cache = FeedCache::with_clock(clock.clone(), GRACE);
        let calls = AtomicUsize::new(0);

        let first = cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"a")).await.unwrap();
        clock.advance(4);
        let second = cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"b")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.freshness, Freshness::Fetched);
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(second.feed.bytes, Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn test_request_after_ttl_refetches_and_updates_timestamp() {
        let clock = TestClock::at(1_700_000_000);
        let cache = FeedCache::with_clock(clock.clone(), GRACE);
        let calls = AtomicUsize::new(0);

        cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"a")).await.unwrap();
        let before = cache.peek("vp").await.unwrap().fetched_at;

        clock.advance(5);
        let lookup = cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"b")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(lookup.freshness, Freshness::Fetched);
        let after = cache.peek("vp").await.unwrap();
        assert_eq!(after.fetched_at - before, chrono::TimeDelta::seconds(5));
        assert_eq!(after.bytes, Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_fetch() {
        let clock = TestClock::at(1_700_000_000);
        let cache = FeedCache::with_clock(clock, GRACE);
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            cache.fetch_or_reuse("tu", TTL, || upstream(&calls, b"x")),
            cache.fetch_or_reuse("tu", TTL, || upstream(&calls, b"y")),
            cache.fetch_or_reuse("tu", TTL, || upstream(&calls, b"z")),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for lookup in [a, b, c] {
            assert_eq!(lookup.unwrap().feed.bytes, Bytes::from_static(b"x"));
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = FeedCache::with_clock(TestClock::at(1_700_000_000), GRACE);
        let calls = AtomicUsize::new(0);

        cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"v")).await.unwrap();
        let tu = cache.fetch_or_reuse("tu", TTL, || upstream(&calls, b"t")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tu.feed.bytes, Bytes::from_static(b"t"));
    }

    #[tokio::test]
    async fn test_failure_on_empty_cache_is_error() {
        let cache = FeedCache::with_clock(TestClock::at(1_700_000_000), GRACE);
        let calls = AtomicUsize::new(0);

        let err = cache.fetch_or_reuse("vp", TTL, || failing(&calls)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(503)));
        assert!(cache.peek("vp").await.is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_entry_and_serves_stale_within_grace() {
        let clock = TestClock::at(1_700_000_000);
        let cache = FeedCache::with_clock(clock.clone(), GRACE);
        let calls = AtomicUsize::new(0);

        cache.fetch_or_reuse("vp", TTL, || upstream(&calls, b"old")).await.unwrap();
        let original = cache.peek("vp").await.unwrap();

        clock.advance(10);
        let lookup = cache.fetch_or_reuse("vp", TTL, || failing(&calls)).await.unwrap();
        assert_eq!(lookup.freshness, Freshness::Stale);
        assert_eq!(lookup.feed, original);
        assert_eq!(cache.peek("vp").await.unwrap(), original);

        clock.advance(30);
        let err = cache.fetch_or_reuse("vp", TTL, || failing(&calls)).await;
        assert!(err.is_err());
        assert_eq!(cache.peek("vp").await.unwrap(), original);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
