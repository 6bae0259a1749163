use std::path::PathBuf;

use crate::fetch::FetchError;

/// Errors that abort a whole request or command, as opposed to feed-level
/// problems which degrade to empty results.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("trip line map not found at {}", .0.display())]
    TripLineMapMissing(PathBuf),

    #[error("trip line map at {} is not valid: {source}", .path.display())]
    TripLineMapInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PulseResult<T> = Result<T, PulseError>;
