use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Request, Response};

use super::{FetchError, fetch_bytes};

/// Executes prepared HTTP requests; wrappers layer auth on top of a base client.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Anything that can produce the raw body of a feed URL.
///
/// Every [`HttpClient`] is a feed source; tests substitute canned buffers.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<C: HttpClient> FeedSource for C {
    async fn fetch_feed(&self, url: &str) -> Result<Bytes, FetchError> {
        fetch_bytes(self, url).await
    }
}
