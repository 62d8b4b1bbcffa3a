//! HTTP request helper for the school backend.
//!
//! Every request carries the user's bearer token and a request-level
//! timeout. Responses are JSON envelopes of the form
//! `{ "success": bool, "message": "...", ...payload }`; a non-success HTTP
//! status or `success: false` becomes a [`ProviderError`].

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::endpoints::{Endpoint, EndpointRegistry};
use crate::error::{ProviderError, ProviderResult};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_USER_AGENT: &str = concat!("edusis-calendar/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the school backend, e.g. `https://api.school.edu/api/v1`.
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Response envelope shared by every school backend endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: Option<bool>,
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

/// Client for the school backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: EndpointRegistry,
}

impl ApiClient {
    /// Creates a client from its configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid base URL or if the HTTP
    /// client cannot be built.
    pub fn new(config: &ApiConfig) -> ProviderResult<Self> {
        Ok(Self {
            http: build_http_client(config.timeout, &config.user_agent)?,
            endpoints: EndpointRegistry::new(&config.base_url)?,
        })
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    /// Performs an authenticated GET and unwraps the response envelope.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or timeout, non-success status,
    /// an undecodable body, or an envelope with `success: false`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        token: &str,
        query: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = self.endpoints.url_with_query(endpoint, query);
        debug!(endpoint = %endpoint, "Requesting school API");

        let mut request = self.http.get(url);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(map_send_error)?;
        let envelope: Envelope<T> = read_json(response).await?;

        if envelope.success == Some(false) {
            return Err(ProviderError::server(format!(
                "{} reported failure: {}",
                endpoint,
                envelope.message.as_deref().unwrap_or("no message")
            )));
        }

        Ok(envelope.payload)
    }
}

/// Builds a reqwest client with the given timeout.
pub(crate) fn build_http_client(
    timeout: Duration,
    user_agent: &str,
) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::configuration("failed to create HTTP client").with_source(e))
}

/// Maps a transport error to a network error.
pub(crate) fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::network("request timeout").with_source(e)
    } else if e.is_connect() {
        ProviderError::network(format!("connection failed: {}", e))
    } else {
        ProviderError::network(format!("request failed: {}", e))
    }
}

/// Checks the response status and decodes the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(ProviderError::rate_limited(format!(
            "rate limit exceeded{}",
            retry_after
                .map(|s| format!(", retry after {} seconds", s))
                .unwrap_or_default()
        )));
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ProviderError::authentication("access token expired or invalid"));
    }

    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::authorization("access denied"));
    }

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProviderError::not_found(format!(
            "{} not found",
            response.url().path()
        )));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(if status.is_client_error() {
            ProviderError::bad_request(format!("API error ({}): {}", status, body))
        } else {
            ProviderError::server(format!("API error ({}): {}", status, body))
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {}", e))
    })
}
