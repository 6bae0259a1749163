//! Daily call-volume accounting.
//!
//! Tracks how many feed lookups went upstream versus were served from the
//! shared cache, and how many client requests arrived, per calendar day.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PulseResult;
use crate::output::write_json;

/// Number of most recent days kept in the stats file.
pub const RETAINED_DAYS: usize = 30;
/// Monthly upstream call quota of the Trafiklab bronze tier.
pub const MONTH_LIMIT_BRONZE: u64 = 30_000;
/// Monthly upstream call quota of the Trafiklab silver tier.
pub const MONTH_LIMIT_SILVER: u64 = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Feed fetched from the upstream provider.
    Upstream,
    /// Feed served from the shared cache.
    Cached,
    /// Client request for vehicle data.
    Request,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCalls {
    #[serde(rename = "trafiklab")]
    pub upstream: u64,
    pub cached: u64,
    pub requests: u64,
}

/// Counters keyed by `YYYY-MM-DD`; keys sort chronologically.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallStats {
    days: BTreeMap<String, DailyCalls>,
}

#[derive(Debug, Serialize)]
pub struct StatsSummary {
    pub today: DailyCalls,
    pub month_trafiklab_calls: u64,
    pub month_limit_bronze: u64,
    pub month_limit_silver: u64,
    pub usage_pct_bronze: f64,
    pub daily: BTreeMap<String, DailyCalls>,
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl CallStats {
    pub fn record(&mut self, date: NaiveDate, kind: CallKind) {
        let day = self.days.entry(day_key(date)).or_default();
        match kind {
            CallKind::Upstream => day.upstream += 1,
            CallKind::Cached => day.cached += 1,
            CallKind::Request => day.requests += 1,
        }

        while self.days.len() > RETAINED_DAYS {
            self.days.pop_first();
        }
    }

    pub fn day(&self, date: NaiveDate) -> DailyCalls {
        self.days.get(&day_key(date)).copied().unwrap_or_default()
    }

    /// Upstream calls in the calendar month containing `date`.
    pub fn month_upstream(&self, date: NaiveDate) -> u64 {
        let month = date.format("%Y-%m-").to_string();
        self.days
            .iter()
            .filter(|(day, _)| day.starts_with(&month))
            .map(|(_, calls)| calls.upstream)
            .sum()
    }

    pub fn pct(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn summary(&self, date: NaiveDate) -> StatsSummary {
        let month = self.month_upstream(date);
        StatsSummary {
            today: self.day(date),
            month_trafiklab_calls: month,
            month_limit_bronze: MONTH_LIMIT_BRONZE,
            month_limit_silver: MONTH_LIMIT_SILVER,
            usage_pct_bronze: (Self::pct(month, MONTH_LIMIT_BRONZE) * 10.0).round() / 10.0,
            daily: self.days.clone(),
        }
    }
}

/// [`CallStats`] persisted as a JSON file, safe to share between requests.
#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stats file; a missing or corrupt file counts as empty.
    pub fn load(&self) -> CallStats {
        let Ok(content) = std::fs::read(&self.path) else {
            return CallStats::default();
        };
        serde_json::from_slice(&content).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Stats file unreadable, starting over");
            CallStats::default()
        })
    }

    pub fn record(&self, date: NaiveDate, kind: CallKind) -> PulseResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stats = self.load();
        stats.record(date, kind);
        write_json(&self.path, &stats)
    }
}
