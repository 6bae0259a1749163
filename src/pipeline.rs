//! Request orchestration: both feeds through the shared cache, then
//! TripUpdates → stop names → VehiclePositions → response.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::cache::{Clock, DEFAULT_STALE_GRACE, DEFAULT_TTL, FeedCache, Freshness, SystemClock};
use crate::config::{Config, DEFAULT_TIMEZONE};
use crate::error::PulseResult;
use crate::fetch::FeedSource;
use crate::lookup::{StopNameIndex, TripLineMap};
use crate::realtime::{
    LineFilter, RecordContext, TripEstimates, VehicleResponse, extract_trip_estimates,
    extract_vehicles,
};
use crate::stats::{CallKind, StatsStore};

/// Upstream feed URLs, also used as cache keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoints {
    pub vehicle_positions: String,
    pub trip_updates: String,
}

/// Per-request parameters.
#[derive(Debug, Clone, Default)]
pub struct VehicleQuery {
    pub home_stops: HashSet<String>,
    pub lines: LineFilter,
}

impl VehicleQuery {
    pub fn new<I, S>(home_stops: I, lines: LineFilter) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            home_stops: home_stops.into_iter().map(Into::into).collect(),
            lines,
        }
    }
}

pub struct Pipeline<S, K = SystemClock> {
    source: S,
    cache: FeedCache<K>,
    endpoints: FeedEndpoints,
    ttl: Duration,
    trip_lines: TripLineMap,
    stop_directory: Option<PathBuf>,
    stats: Option<Arc<StatsStore>>,
    timezone: Tz,
}

impl<S: FeedSource> Pipeline<S> {
    pub fn new(source: S, endpoints: FeedEndpoints, trip_lines: TripLineMap) -> Self {
        Self::with_cache(
            source,
            endpoints,
            trip_lines,
            FeedCache::new(DEFAULT_STALE_GRACE),
        )
    }

    /// Builds a pipeline from process configuration.
    ///
    /// Loads the trip line map once; a missing map fails here rather than
    /// producing empty responses later.
    pub fn from_config(source: S, config: &Config) -> PulseResult<Self> {
        let trip_lines = TripLineMap::load(&config.trip_line_map)?;
        let mut pipeline = Self::with_cache(
            source,
            config.endpoints.clone(),
            trip_lines,
            FeedCache::new(config.stale_grace),
        )
        .ttl(config.cache_ttl)
        .stop_directory(&config.stop_directory)
        .timezone(config.timezone);

        if let Some(path) = &config.stats_file {
            pipeline = pipeline.stats(StatsStore::new(path));
        }
        Ok(pipeline)
    }
}

impl<S: FeedSource, K: Clock> Pipeline<S, K> {
    pub fn with_cache(
        source: S,
        endpoints: FeedEndpoints,
        trip_lines: TripLineMap,
        cache: FeedCache<K>,
    ) -> Self {
        Self {
            source,
            cache,
            endpoints,
            ttl: DEFAULT_TTL,
            trip_lines,
            stop_directory: None,
            stats: None,
            timezone: DEFAULT_TIMEZONE,
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Snapshot used to name termini; without one, destinations come only from the trip line map.
    pub fn stop_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.stop_directory = Some(path.into());
        self
    }

    pub fn stats(mut self, store: StatsStore) -> Self {
        self.stats = Some(Arc::new(store));
        self
    }

    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn trip_lines(&self) -> &TripLineMap {
        &self.trip_lines
    }

    /// Produces the consolidated vehicle view for one request.
    ///
    /// Feed-level failures (fetch or decode) degrade to empty results for
    /// that feed only.
    #[tracing::instrument(skip_all, fields(home_stops = query.home_stops.len()))]
    pub async fn vehicles(&self, query: &VehicleQuery) -> VehicleResponse {
        let now = self.cache.clock().now();
        self.record_call(now, CallKind::Request).await;

        let (vehicle_feed, trip_feed) = tokio::join!(
            self.load_feed(&self.endpoints.vehicle_positions, now),
            self.load_feed(&self.endpoints.trip_updates, now),
        );

        let estimates = trip_feed
            .and_then(|feed| {
                extract_trip_estimates(&feed, &self.trip_lines, &query.home_stops, &query.lines)
                    .inspect_err(|e| warn!(error = %e, "TripUpdates feed undecodable, no ETAs"))
                    .ok()
            })
            .unwrap_or_default();

        let stop_names = match &self.stop_directory {
            Some(path) if !estimates.termini.is_empty() => load_stop_names(path.clone()).await,
            _ => StopNameIndex::default(),
        };

        let vehicles = vehicle_feed
            .and_then(|feed| {
                let ctx = self.record_context(&estimates, &stop_names, &query.lines, now);
                extract_vehicles(&feed, &ctx)
                    .inspect_err(|e| {
                        warn!(error = %e, "VehiclePositions feed undecodable, no vehicles")
                    })
                    .ok()
            })
            .unwrap_or_default();

        info!(
            vehicles = vehicles.len(),
            etas = estimates.etas.len(),
            termini = estimates.termini.len(),
            "Vehicle response assembled"
        );

        VehicleResponse {
            timestamp: now.timestamp(),
            vehicles,
        }
    }

    fn record_context<'a>(
        &'a self,
        estimates: &'a TripEstimates,
        stop_names: &'a StopNameIndex,
        filter: &'a LineFilter,
        now: DateTime<Utc>,
    ) -> RecordContext<'a> {
        RecordContext {
            trip_lines: &self.trip_lines,
            estimates,
            stop_names,
            filter,
            now,
            timezone: self.timezone,
        }
    }

    async fn load_feed(&self, url: &str, now: DateTime<Utc>) -> Option<Bytes> {
        let lookup = self
            .cache
            .fetch_or_reuse(url, self.ttl, || self.source.fetch_feed(url))
            .await
            .ok()?;

        let kind = match lookup.freshness {
            Freshness::Fetched => CallKind::Upstream,
            Freshness::Cached | Freshness::Stale => CallKind::Cached,
        };
        self.record_call(now, kind).await;

        Some(lookup.feed.bytes).filter(|bytes| !bytes.is_empty())
    }

    /// Counts one call in the stats file, off the async worker threads.
    async fn record_call(&self, now: DateTime<Utc>, kind: CallKind) {
        let Some(stats) = self.stats.clone() else {
            return;
        };
        let date = now.with_timezone(&self.timezone).date_naive();
        let path = stats.path().to_path_buf();
        match tokio::task::spawn_blocking(move || stats.record(date, kind)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Failed to record call stats"),
            Err(e) => warn!(error = %e, "Stats task did not complete"),
        }
    }
}

/// Parses the directory snapshot on the blocking pool.
async fn load_stop_names(path: PathBuf) -> StopNameIndex {
    tokio::task::spawn_blocking(move || StopNameIndex::load(&path))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Stop name task did not complete, terminus names omitted");
            StopNameIndex::default()
        })
}
