use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::FetchError;

/// Thin HTTP client for resource fetchers.
///
/// Base URL and auth header are injected once at construction, so call
/// sites only name the path they want. Non-success statuses become
/// [`FetchError::Status`]; there is no retry layer here — a failed fetch is
/// reported to the resource cache, which keeps serving the last good value.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    bearer: Option<String>,
}

impl ApiClient {
    /// Create a client for the given API base URL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            bearer: None,
        }
    }

    /// Attach a bearer token sent with every request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// API base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` (relative to the base URL) and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// [`FetchError::Transport`] if the request never produced a response,
    /// [`FetchError::Status`] on a non-success status (with the body for
    /// diagnostics), [`FetchError::Decode`] if the body does not match `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| FetchError::Transport(format!("invalid path {path:?}: {e}")))?;

        let mut request = self.http.get(url).query(query);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%path, status = status.as_u16(), "api request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// GET `path` as untyped JSON, the shape [`ResourceCache`] stores.
    ///
    /// [`ResourceCache`]: crate::ResourceCache
    pub async fn get_value(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<JsonValue, FetchError> {
        self.get(path, query).await
    }
}
