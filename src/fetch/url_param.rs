use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// Query parameter Trafiklab expects the API key in.
pub const TRAFIKLAB_KEY_PARAM: &str = "key";

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
///
/// An empty `key` leaves requests untouched, so feeds that need no key can
/// share the same client stack.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn api_key(inner: C, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: TRAFIKLAB_KEY_PARAM.to_string(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        if !self.key.is_empty() {
            req.url_mut()
                .query_pairs_mut()
                .append_pair(&self.param_name, &self.key);
        }
        self.inner.execute(req).await
    }
}
