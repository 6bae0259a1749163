//! Process configuration from environment variables (after `.env` loading).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::cache::{DEFAULT_STALE_GRACE, DEFAULT_TTL};
use crate::error::{PulseError, PulseResult};
use crate::fetch::DEFAULT_TIMEOUT;
use crate::lookup::stop_directory::DEFAULT_DIRECTORY_URL;
use crate::pipeline::FeedEndpoints;

pub const DEFAULT_VEHICLE_POSITIONS_URL: &str =
    "https://opendata.samtrafiken.se/gtfs-rt/sl/VehiclePositions.pb";
pub const DEFAULT_TRIP_UPDATES_URL: &str =
    "https://opendata.samtrafiken.se/gtfs-rt/sl/TripUpdates.pb";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Stockholm;
/// Home stops used when `HOME_STOPS` is not set.
pub const DEFAULT_HOME_STOPS: [&str; 3] =
    ["9022001040205001", "9022001040205002", "9021001040205000"];

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: FeedEndpoints,
    /// Trafiklab API key, appended to feed requests as `?key=`.
    pub api_key: String,
    pub cache_ttl: Duration,
    pub stale_grace: Duration,
    pub fetch_timeout: Duration,
    pub trip_line_map: PathBuf,
    pub stop_directory: PathBuf,
    pub stop_directory_url: String,
    /// `None` disables call accounting.
    pub stats_file: Option<PathBuf>,
    pub timezone: Tz,
    pub home_stops: Vec<String>,
}

impl Config {
    pub fn from_env() -> PulseResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> PulseResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string());
        let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());
        let secs = |name: &str, default: Duration| -> PulseResult<Duration> {
            match non_empty(name) {
                Some(raw) => raw
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|e| PulseError::Config(format!("{name}={raw}: {e}"))),
                None => Ok(default),
            }
        };

        let timezone = match non_empty("DISPLAY_TIMEZONE") {
            Some(name) => Tz::from_str(&name)
                .map_err(|e| PulseError::Config(format!("DISPLAY_TIMEZONE={name}: {e}")))?,
            None => DEFAULT_TIMEZONE,
        };

        let home_stops = match non_empty("HOME_STOPS") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_HOME_STOPS.map(String::from).to_vec(),
        };

        // STATS_FILE set to "" turns accounting off; unset uses the default.
        let stats_file = match var("STATS_FILE") {
            Some(path) if path.is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(std::env::temp_dir().join("transit_pulse_stats.json")),
        };

        Ok(Self {
            endpoints: FeedEndpoints {
                vehicle_positions: non_empty("VEHICLE_POSITIONS_URL")
                    .unwrap_or_else(|| DEFAULT_VEHICLE_POSITIONS_URL.to_string()),
                trip_updates: non_empty("TRIP_UPDATES_URL")
                    .unwrap_or_else(|| DEFAULT_TRIP_UPDATES_URL.to_string()),
            },
            api_key: var("TRAFIKLAB_KEY").unwrap_or_default(),
            cache_ttl: secs("FEED_CACHE_TTL_SECS", DEFAULT_TTL)?,
            stale_grace: secs("FEED_STALE_GRACE_SECS", DEFAULT_STALE_GRACE)?,
            fetch_timeout: secs("FEED_TIMEOUT_SECS", DEFAULT_TIMEOUT)?,
            trip_line_map: non_empty("TRIP_LINE_MAP")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("trip_line_map.json")),
            stop_directory: non_empty("STOP_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("transit_pulse_stops.json")),
            stop_directory_url: non_empty("STOP_DIRECTORY_URL")
                .unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
            stats_file,
            timezone,
            home_stops,
        })
    }
}

/// Splits a comma-separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
