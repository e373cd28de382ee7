//! Thin HTTP client for the backend.
//!
//! Adds the base URL and bearer token to every request and maps response
//! statuses onto `ClientError`. There are no automatic retries.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::config::ApiConfig;
use crate::error::ClientError;

/// Maximum number of body characters kept in errors and logs.
const BODY_PREVIEW_CHARS: usize = 200;

/// HTTP client bound to one backend.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("authenticated", &self.inner.token.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the base URL
    /// cannot take path segments.
    pub fn new(config: &ApiConfig) -> Result<Self, ClientError> {
        if config.base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl(config.base_url.to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client: builder.build()?,
                base_url: config.base_url.clone(),
                token: config.token.clone(),
            }),
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build the URL for a list of path segments. Segments are percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidBaseUrl` if the base URL cannot take a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidBaseUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET and parse a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success, or
    /// the body is not valid JSON for `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let body = self.dispatch(Method::GET, segments, None, None).await?;
        parse_body(&body)
    }

    /// POST a JSON body and parse the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success, or
    /// the response is not valid JSON for `T`.
    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(body)?;
        let response = self
            .dispatch(Method::POST, segments, Some(payload), None)
            .await?;
        parse_body(&response)
    }

    /// POST a JSON body, ignoring the response body.
    ///
    /// When `idempotency_key` is set it is sent as the `Idempotency-Key` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn post_ignore_body<B>(
        &self,
        segments: &[&str],
        body: &B,
        idempotency_key: Option<&str>,
    ) -> Result<(), ClientError>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(body)?;
        self.dispatch(Method::POST, segments, Some(payload), idempotency_key)
            .await?;
        Ok(())
    }

    /// DELETE, ignoring the response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn delete(&self, segments: &[&str]) -> Result<(), ClientError> {
        self.dispatch(Method::DELETE, segments, None, None).await?;
        Ok(())
    }

    /// Send a request to a slash-separated relative path.
    ///
    /// Used to replay stored requests; returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String, ClientError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.dispatch(method, &segments, body, None).await
    }

    /// Execute a request and return the body of a successful response.
    #[instrument(skip(self, body), fields(method = %method, path = %segments.join("/")))]
    async fn dispatch(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
        idempotency_key: Option<&str>,
    ) -> Result<String, ClientError> {
        let url = self.endpoint(segments)?;

        let mut request = self
            .inner
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(ClientError::RateLimited(retry_after));
        }

        let response_text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(segments.join("/")));
        }

        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %preview(&response_text),
                "Backend returned non-success status"
            );
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: preview(&response_text),
            });
        }

        debug!(status = %status, bytes = response_text.len(), "Backend responded");
        Ok(response_text)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %preview(body),
            "Failed to parse backend response"
        );
        ClientError::Parse(e)
    })
}

fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}
