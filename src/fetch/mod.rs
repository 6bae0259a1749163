//! Upstream HTTP retrieval of feed and directory payloads.

mod basic;
mod client;
mod url_param;

pub use basic::{BasicClient, DEFAULT_TIMEOUT};
pub use client::{FeedSource, HttpClient};
pub use url_param::{TRAFIKLAB_KEY_PARAM, UrlParam};

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

/// Why an upstream fetch produced no data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(u16),
}

/// GETs `url` and returns the body, treating anything but `200 OK` as a failure.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FetchError> {
    let url = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    if resp.status() != StatusCode::OK {
        return Err(FetchError::Status(resp.status().as_u16()));
    }
    Ok(resp.bytes().await?)
}
