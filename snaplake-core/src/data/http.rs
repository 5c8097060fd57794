//! Blocking JSON-over-HTTP fetcher shared by the connectors.
//!
//! Handles retries with exponential backoff, status-code classification and
//! the circuit breaker. Status handling:
//! - 403: trip the breaker, fail immediately.
//! - 429: count a failure, retry.
//! - 401: authentication error, no retry.
//! - other 4xx: fail immediately with `HttpStatus`.
//! - 5xx: count a failure, retry.
//! - connect/timeout errors: retry.
//!
//! Retry pauses double from `base_delay_ms` and never exceed [`MAX_BACKOFF`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::connector::ConnectorError;

pub const DEFAULT_USER_AGENT: &str = concat!("snaplake/", env!("CARGO_PKG_VERSION"));

/// Longest single pause between two attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Largest `max_retries` a config may ask for.
pub const MAX_RETRIES: u32 = 10;

/// Pause before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// saturating and capped at [`MAX_BACKOFF`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Transport settings, shared by every connector of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub user_agent: String,
}

impl HttpSettings {
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.timeout_secs == 0 {
            return Err(ConnectorError::InvalidConfig(
                "http.timeout_secs must be at least 1".into(),
            ));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(ConnectorError::InvalidConfig(format!(
                "http.max_retries must be at most {MAX_RETRIES}, got {}",
                self.max_retries
            )));
        }
        Ok(())
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_retries: 2,
            base_delay_ms: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    /// Build a fetcher. `headers` are sent with every request (API keys).
    pub fn new(
        settings: &HttpSettings,
        headers: &[(&'static str, String)],
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ConnectorError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let mut value = HeaderValue::from_str(value).map_err(|e| {
                ConnectorError::InvalidConfig(format!("header {name} is not valid: {e}"))
            })?;
            value.set_sensitive(true);
            default_headers.insert(HeaderName::from_static(name), value);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .default_headers(default_headers)
            .build()
            .map_err(|e| ConnectorError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
        })
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }

    /// GET `url` with `query` and parse the body as JSON.
    pub fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ConnectorError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(ConnectorError::CircuitBreakerTripped);
        }

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(self.base_delay, attempt);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(url, attempt, delay_ms, "retrying");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(ConnectorError::CircuitBreakerTripped);
            }

            match self.client.get(url).query(query).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::FORBIDDEN {
                        self.circuit_breaker.trip();
                        return Err(ConnectorError::CircuitBreakerTripped);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!(url, retry_after_secs = retry_after, "rate limited");
                        last_error = Some(ConnectorError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ConnectorError::AuthenticationRequired(format!(
                            "{url} rejected the request credentials"
                        )));
                    }

                    if status.is_client_error() {
                        return Err(ConnectorError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    if !status.is_success() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(ConnectorError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }

                    let body: Value = resp.json().map_err(|e| {
                        ConnectorError::ResponseFormatChanged(format!(
                            "body of {url} is not JSON: {e}"
                        ))
                    })?;
                    self.circuit_breaker.record_success();
                    return Ok(body);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(ConnectorError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(ConnectorError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ConnectorError::Other("max retries exceeded".into())))
    }
}
