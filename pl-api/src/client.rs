//! HTTP client for the PrayLock backend REST API.
//!
//! Handles authentication, custom headers, timeout management, bounded
//! retry on gateway errors, and envelope parsing. Long-horizon retrying
//! (offline queues) lives above this layer; the client only smooths over
//! momentary gateway blips.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use pl_core::config::{AppConfig, ServerConfig};
use pl_core::constants;
use pl_core::error::{PlError, PlResult};

use crate::response::ServerResponse;

/// Retry configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

/// HTTP client for communicating with the PrayLock backend.
///
/// Wraps reqwest::Client with bearer authentication, header injection,
/// bounded retry, and envelope handling.
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    /// Base URL for the API (e.g. "https://api.praylock.app/api/v1").
    api_root: String,
    /// Bearer token attached to every request.
    auth_token: String,
    /// Default request timeout.
    timeout: Duration,
    /// Custom headers from server config.
    custom_headers: Vec<(String, String)>,
    /// Retry configuration.
    retry_config: RetryConfig,
}

impl ApiClient {
    /// Create a new ApiClient from server configuration.
    pub fn new(config: &ServerConfig) -> PlResult<Self> {
        let sanitized_address = AppConfig::sanitize_server_address(&config.address);
        if sanitized_address.is_empty() {
            return Err(PlError::MissingConfig("server address".into()));
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_millis(config.api_timeout_ms))
            .connect_timeout(Duration::from_secs(15))
            .tcp_keepalive(Duration::from_secs(30));

        if config.accept_self_signed_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| PlError::Http(format!("failed to build HTTP client: {e}")))?;

        let api_root = format!("{sanitized_address}/api/{}", constants::API_VERSION);
        let custom_headers = config
            .custom_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            inner,
            api_root,
            auth_token: config.auth_token.clone(),
            timeout: Duration::from_millis(config.api_timeout_ms),
            custom_headers,
            retry_config: RetryConfig::default(),
        })
    }

    /// Set custom retry configuration.
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Get the current API root URL.
    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_root)
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> RequestBuilder {
        let mut builder = self
            .inner
            .request(method, url)
            .timeout(self.timeout)
            .bearer_auth(&self.auth_token);
        for (key, value) in &self.custom_headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(b) = body {
            builder = builder.json(b);
        }
        builder
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.retry_config.base_delay.as_secs_f64();
        let max = self.retry_config.max_delay.as_secs_f64();
        Duration::from_secs_f64((base * 2.0_f64.powi(attempt as i32)).min(max))
    }

    /// Execute a request, retrying gateway errors a bounded number of times.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> PlResult<Response> {
        let url = self.url(path);
        debug!("{method} {path}");

        let mut last_error: Option<PlError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay(attempt - 1);
                warn!(
                    "retrying {method} {path} (attempt {}/{}) after {:.1}s",
                    attempt + 1,
                    self.retry_config.max_retries + 1,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            match self.build_request(method.clone(), &url, body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if self
                        .retry_config
                        .retryable_statuses
                        .contains(&status.as_u16())
                        && attempt < self.retry_config.max_retries
                    {
                        warn!("retryable status {} from {path}", status.as_u16());
                        last_error = Some(PlError::ServerError {
                            status: status.as_u16(),
                            message: format!("retryable status {status}"),
                        });
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let err = if e.is_timeout() {
                        PlError::Timeout(format!("{method} {path}: {e}"))
                    } else {
                        PlError::Http(format!("{method} {path}: {e}"))
                    };
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PlError::Http(format!("{method} {path} failed"))))
    }

    /// Parse a response into the envelope and extract its data payload.
    async fn parse_data<T: DeserializeOwned>(&self, response: Response) -> PlResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlError::Http(format!("failed to read response body: {e}")))?;

        let envelope: ServerResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                PlError::Serialization(format!("unexpected response shape: {e}"))
            } else {
                PlError::ServerError {
                    status: status.as_u16(),
                    message: truncate(&body, 200),
                }
            }
        })?;

        if !envelope.is_success() {
            return Err(PlError::ServerError {
                status: envelope.status,
                message: envelope.error_message().unwrap_or_default(),
            });
        }

        envelope
            .data
            .ok_or_else(|| PlError::Serialization("response envelope missing data".into()))
    }

    /// GET a path and decode the envelope data.
    pub(crate) async fn get_data<T: DeserializeOwned>(&self, path: &str) -> PlResult<T> {
        let response = self.request_with_retry(Method::GET, path, None).await?;
        self.parse_data(response).await
    }

    /// GET a path where a null/absent data payload is a valid answer.
    pub(crate) async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> PlResult<Option<T>> {
        let response = self.request_with_retry(Method::GET, path, None).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlError::Http(format!("failed to read response body: {e}")))?;

        let envelope: ServerResponse<T> =
            serde_json::from_str(&body).map_err(|e| {
                if status.is_success() {
                    PlError::Serialization(format!("unexpected response shape: {e}"))
                } else {
                    PlError::ServerError {
                        status: status.as_u16(),
                        message: truncate(&body, 200),
                    }
                }
            })?;

        if !envelope.is_success() {
            return Err(PlError::ServerError {
                status: envelope.status,
                message: envelope.error_message().unwrap_or_default(),
            });
        }

        Ok(envelope.data)
    }

    /// POST a body to a path and decode the envelope data.
    pub(crate) async fn post_data<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> PlResult<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .request_with_retry(Method::POST, path, Some(&body))
            .await?;
        self.parse_data(response).await
    }

    /// POST a body to a path, ignoring any data payload.
    pub(crate) async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> PlResult<()> {
        let body = serde_json::to_value(body)?;
        let response = self
            .request_with_retry(Method::POST, path, Some(&body))
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(PlError::ServerError {
                status: status.as_u16(),
                message: truncate(&body, 200),
            })
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Status codes that mean "try again later" regardless of endpoint.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}
