use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::{Method, ScrobbleSource, UpstreamError, UpstreamRequest};

pub const DEFAULT_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// HTTP client for the Last.fm 2.0 JSON API.
///
/// Injects credentials and the subject username, bounds every call with a
/// fixed timeout and caps in-flight requests. It never retries and never
/// caches; see [`super::RetryingSource`] and [`crate::cache::ResponseCache`].
pub struct LastFmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    username: String,
    rate_limiter: Arc<Semaphore>,
}

impl LastFmClient {
    pub fn new(
        base_url: String,
        api_key: String,
        username: String,
        timeout: Duration,
        max_concurrent_requests: usize,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scrobble-dash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!(base_url = %base_url, timeout = ?timeout, "Initialized Last.fm client");

        Ok(Self {
            client,
            base_url,
            api_key,
            username,
            rate_limiter: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
        })
    }

    fn query_params<'a>(&'a self, request: &'a UpstreamRequest) -> Vec<(&'a str, &'a str)> {
        let mut params = Vec::with_capacity(request.params.len() + 4);
        params.push(("method", request.method.name()));
        if request.method.is_user_scoped() {
            params.push(("user", self.username.as_str()));
        }
        params.extend(request.params.iter().map(|(key, value)| (*key, value.as_str())));
        params.push(("api_key", self.api_key.as_str()));
        params.push(("format", "json"));
        params
    }
}

#[async_trait]
impl ScrobbleSource for LastFmClient {
    #[instrument(skip(self, request), fields(method = %request.method))]
    async fn fetch(&self, request: UpstreamRequest) -> Result<Value, UpstreamError> {
        let method = request.method;
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|_| UpstreamError::unavailable(method, "request limiter closed"))?;

        debug!(params = ?request.params, "Calling upstream");

        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(&request))
            .send()
            .await
            .map_err(|e| UpstreamError::unavailable(method, describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::unavailable(method, describe_transport_error(&e)))?;

        let parsed = parse_body(method, status, &body);
        if let Err(e) = &parsed {
            warn!("Upstream call failed: {}", e);
        }
        parsed
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// Classifies a raw upstream response into JSON or an [`UpstreamError`].
///
/// Last.fm reports API errors as `{"error": <code>, "message": ...}`, with
/// either a 200 or a 4xx status, so the body is inspected before the status.
pub(crate) fn parse_body(method: Method, status: StatusCode, body: &str) -> Result<Value, UpstreamError> {
    // Proxies answer rate limiting with their own pages; only Last.fm's
    // envelope carries an error code.
    let transient = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if transient => {
            return Err(UpstreamError::unavailable(method, format!("HTTP {}", status)));
        }
        Err(e) => {
            return Err(UpstreamError::malformed(
                method,
                format!("HTTP {} with non-JSON body: {}", status, e),
            ));
        }
    };

    if let Some(code) = value.get("error").and_then(Value::as_i64) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(UpstreamError::Api {
            method,
            code,
            message,
        });
    }

    if transient {
        return Err(UpstreamError::unavailable(method, format!("HTTP {}", status)));
    }

    if value.get(method.root_key()).is_none() {
        return Err(UpstreamError::malformed(
            method,
            format!("missing top-level key `{}`", method.root_key()),
        ));
    }

    Ok(value)
}
