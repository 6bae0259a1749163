//! Local snapshot of the transit directory's site list.
//!
//! The snapshot feeds two consumers: stop search by name, and the
//! [`StopNameIndex`] used to name a trip's realtime terminus. GTFS stop ids
//! are derived from directory ids as `9022001` + 6-digit id + `001`/`002`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PulseResult;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::output::write_json;

/// Default directory endpoint; `expand=true` includes stop areas per site.
pub const DEFAULT_DIRECTORY_URL: &str = "https://transport.integration.sl.se/v1/sites?expand=true";
/// Snapshots older than this are refreshed before searching.
pub const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
/// Upper bound on stop search results.
pub const SEARCH_LIMIT: usize = 15;
/// Shorter queries return nothing.
const MIN_QUERY_LEN: usize = 2;
/// A snapshot file smaller than this is assumed to be a failed download.
const MIN_SNAPSHOT_BYTES: u64 = 1000;

const GTFS_STOP_PREFIX: &str = "9022001";
const GTFS_STOP_SUFFIXES: [&str; 2] = ["001", "002"];

/// Directory id that may arrive as a JSON number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AreaId {
    Number(u64),
    Text(String),
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pad() so width/fill specs apply when building GTFS ids
        match self {
            AreaId::Number(n) => f.pad(&n.to_string()),
            AreaId::Text(s) => f.pad(s),
        }
    }
}

/// Both platform-level GTFS stop ids for a directory site or stop area id.
pub fn gtfs_stop_ids(id: impl fmt::Display) -> [String; 2] {
    GTFS_STOP_SUFFIXES.map(|suffix| format!("{GTFS_STOP_PREFIX}{id:0>6}{suffix}"))
}

/// One site as stored in the snapshot file (compact keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySite {
    #[serde(rename = "s")]
    pub site_id: u64,
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "la")]
    pub lat: f64,
    #[serde(rename = "lo")]
    pub lon: f64,
    #[serde(rename = "sa", default)]
    pub stop_areas: Vec<AreaId>,
}

impl DirectorySite {
    /// GTFS stop ids for this site: from its stop areas, or the site id when it has none.
    pub fn gtfs_stop_ids(&self) -> Vec<String> {
        if self.stop_areas.is_empty() {
            return gtfs_stop_ids(self.site_id).to_vec();
        }
        self.stop_areas.iter().flat_map(gtfs_stop_ids).collect()
    }
}

/// A site as returned by the directory API.
#[derive(Debug, Deserialize)]
struct ApiSite {
    id: Option<u64>,
    #[serde(default)]
    name: String,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    stop_areas: Vec<AreaId>,
}

impl ApiSite {
    fn into_site(self) -> Option<DirectorySite> {
        Some(DirectorySite {
            site_id: self.id.filter(|id| *id != 0)?,
            name: self.name,
            lat: self.lat.filter(|v| *v != 0.0)?,
            lon: self.lon.filter(|v| *v != 0.0)?,
            stop_areas: self.stop_areas,
        })
    }
}

/// A stop search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopMatch {
    /// Comma-separated GTFS stop ids, ready to use as home stops.
    pub id: String,
    #[serde(rename = "siteId")]
    pub site_id: u64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopDirectory {
    sites: Vec<DirectorySite>,
}

impl StopDirectory {
    pub fn new(sites: Vec<DirectorySite>) -> Self {
        Self { sites }
    }

    pub fn sites(&self) -> &[DirectorySite] {
        &self.sites
    }

    pub fn load(path: &Path) -> PulseResult<Self> {
        let content = std::fs::read(path)?;
        let sites: Vec<DirectorySite> = serde_json::from_slice(&content)?;
        Ok(Self { sites })
    }

    pub fn save(&self, path: &Path) -> PulseResult<()> {
        write_json(path, &self.sites)
    }

    /// Whether the snapshot at `path` exists, looks complete and is younger than `max_age`.
    pub fn is_fresh(path: &Path, max_age: Duration) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        meta.len() > MIN_SNAPSHOT_BYTES && age.is_some_and(|age| age < max_age)
    }

    /// Downloads the site list from the directory API.
    #[tracing::instrument(skip(client))]
    pub async fn download<C: HttpClient + ?Sized>(client: &C, url: &str) -> PulseResult<Self> {
        let bytes = fetch_bytes(client, url).await?;
        let raw: Vec<ApiSite> = serde_json::from_slice(&bytes)?;
        let total = raw.len();
        let sites: Vec<_> = raw.into_iter().filter_map(ApiSite::into_site).collect();
        info!(total, kept = sites.len(), "Stop directory downloaded");
        Ok(Self { sites })
    }

    /// Loads the snapshot, downloading and saving a new one when it is stale.
    pub async fn load_or_refresh<C: HttpClient + ?Sized>(
        client: &C,
        url: &str,
        path: &Path,
        max_age: Duration,
    ) -> PulseResult<Self> {
        if Self::is_fresh(path, max_age) {
            debug!(path = %path.display(), "Using cached stop directory");
            return Self::load(path);
        }
        let directory = Self::download(client, url).await?;
        directory.save(path)?;
        Ok(directory)
    }

    /// Case-insensitive substring search over site names.
    pub fn search(&self, query: &str) -> Vec<StopMatch> {
        let query = query.trim().to_lowercase();
        if query.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }

        self.sites
            .iter()
            .filter(|site| site.name.to_lowercase().contains(&query))
            .take(SEARCH_LIMIT)
            .map(|site| StopMatch {
                id: site.gtfs_stop_ids().join(","),
                site_id: site.site_id,
                name: site.name.clone(),
                lat: site.lat,
                lon: site.lon,
            })
            .collect()
    }

    /// Builds the GTFS stop id → display name index.
    pub fn name_index(&self) -> StopNameIndex {
        let mut names = HashMap::new();
        for site in &self.sites {
            let ids = site
                .stop_areas
                .iter()
                .flat_map(gtfs_stop_ids)
                .chain(gtfs_stop_ids(site.site_id));
            for id in ids {
                names.insert(id, site.name.clone());
            }
        }
        StopNameIndex { names }
    }
}

/// GTFS stop id → human-readable name.
#[derive(Debug, Clone, Default)]
pub struct StopNameIndex {
    names: HashMap<String, String>,
}

impl StopNameIndex {
    /// Builds the index from the snapshot at `path`.
    ///
    /// A missing or unreadable snapshot yields an empty index; terminus
    /// naming is then simply omitted.
    pub fn load(path: &Path) -> Self {
        match StopDirectory::load(path) {
            Ok(directory) => {
                let index = directory.name_index();
                debug!(stops = index.len(), "Stop name index built");
                index
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Stop directory unavailable, terminus names omitted");
                Self::default()
            }
        }
    }

    pub fn get(&self, stop_id: &str) -> Option<&str> {
        self.names.get(stop_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StopNameIndex {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
