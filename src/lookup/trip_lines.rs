use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::error::{PulseError, PulseResult};

/// Separates the line designator from the static destination in map values.
pub const DESTINATION_SEPARATOR: char = '|';

/// Route ids shorter than this carry no embedded line code.
const ROUTE_ID_MIN_LEN: usize = 13;
/// Position of the zero-padded line code inside a route id such as
/// `9011001004000000` (agency prefix, 5-digit line, suffix).
const ROUTE_LINE_CODE: std::ops::Range<usize> = 7..12;

/// Static knowledge about one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripLineEntry {
    pub line: String,
    pub destination: Option<String>,
}

impl TripLineEntry {
    /// Parses a map value: either `"<line>"` or `"<line>|<destination>"`.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(DESTINATION_SEPARATOR) {
            Some((line, destination)) => Self {
                line: line.to_string(),
                destination: (!destination.is_empty()).then(|| destination.to_string()),
            },
            None => Self {
                line: raw.to_string(),
                destination: None,
            },
        }
    }
}

/// Read-only trip id → line lookup, loaded from a JSON object.
///
/// ```json
/// { "14010000652211331": "4|Radiohuset", "14010000652211502": "172" }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TripLineMap {
    entries: HashMap<String, TripLineEntry>,
}

impl TripLineMap {
    /// Loads the map from `path`.
    ///
    /// A missing file is reported as [`PulseError::TripLineMapMissing`] so
    /// callers can tell a deployment problem apart from an empty result.
    pub fn load(path: &Path) -> PulseResult<Self> {
        if !path.exists() {
            return Err(PulseError::TripLineMapMissing(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let map = Self::from_json(&content).map_err(|source| PulseError::TripLineMapInvalid {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), trips = map.len(), "Trip line map loaded");
        Ok(map)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, String> = serde_json::from_str(content)?;
        Ok(raw.into_iter().collect())
    }

    pub fn get(&self, trip_id: &str) -> Option<&TripLineEntry> {
        self.entries.get(trip_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the line for a trip, falling back to the line code embedded
    /// in `route_id` when the trip is unknown.
    ///
    /// Returns `None` when neither source yields a non-empty line.
    pub fn resolve(&self, trip_id: &str, route_id: Option<&str>) -> Option<TripLineEntry> {
        let entry = (!trip_id.is_empty())
            .then(|| self.entries.get(trip_id))
            .flatten();

        if let Some(entry) = entry {
            if !entry.line.is_empty() {
                return Some(entry.clone());
            }
        }

        let line = route_id.and_then(line_from_route_id)?;
        Some(TripLineEntry {
            line,
            destination: entry.and_then(|e| e.destination.clone()),
        })
    }
}

impl<K, V> FromIterator<(K, V)> for TripLineMap
where
    K: Into<String>,
    V: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(trip_id, raw)| (trip_id.into(), TripLineEntry::parse(raw.as_ref())))
                .collect(),
        }
    }
}

/// Extracts the line designator embedded in a route id, without leading zeros.
///
/// This layout is observed in the SL feed and is not part of GTFS.
pub fn line_from_route_id(route_id: &str) -> Option<String> {
    if route_id.len() < ROUTE_ID_MIN_LEN {
        return None;
    }
    let line = route_id.get(ROUTE_LINE_CODE)?.trim_start_matches('0');
    (!line.is_empty()).then(|| line.to_string())
}
