//! The retrying HTTP client.
//!
//! One `fetch` call is: concurrency permit → pacer acquire → attempt loop
//! with capped exponential backoff. Retryable failures are connect errors,
//! timeouts, HTTP 429 and 5xx; everything else is terminal immediately.
//! Every wait (permit, pacer, the request itself, backoff) is cancellable.
//!
//! Network I/O goes through the [`HttpTransport`] trait so the retry and
//! admission logic can be exercised against scripted responders in tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ScrapePolicy, TargetConfig};
use crate::error::{ConfigError, ConfigResult, FetchError};
use crate::fetch::pacer::RequestPacer;

/// A single outbound request. Value type, created per attempt.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

impl FetchRequest {
    /// A GET request with a 30 second timeout and no extra headers.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A successful fetch. Owned exclusively by the caller that issued it.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
    /// URL after redirects
    pub final_url: String,
    /// Wall time across all attempts
    pub elapsed: Duration,
}

/// Retry and admission policy for fetches.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_multiplier: f64,
    pub backoff_cap: Duration,
    pub max_concurrent: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_secs(10),
            max_concurrent: 4,
        }
    }
}

impl FetchPolicy {
    pub fn from_policy(policy: &ScrapePolicy) -> Self {
        Self {
            timeout: policy.timeout(),
            max_retries: policy.max_retries,
            backoff_base: Duration::from_millis(policy.backoff_base_ms),
            backoff_multiplier: policy.backoff_multiplier,
            backoff_cap: Duration::from_millis(policy.backoff_cap_ms),
            max_concurrent: policy.max_concurrent.max(1),
        }
    }

    /// Delay before retry number `attempt` (0-based), capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.backoff_base.mul_f64(factor.max(1.0));
        delay.min(self.backoff_cap)
    }
}

/// Response from the raw transport, before retry classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

/// Failures below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Connection failures and timeouts are retryable; anything else is
    /// terminal for the page.
    pub fn retryable(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::Connect(_))
    }
}

/// Raw HTTP transport beneath the client. Implemented by reqwest in
/// production and by scripted responders in tests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &FetchRequest)
        -> Result<TransportResponse, TransportError>;
}

/// reqwest-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the policy's user agent and default headers.
    pub fn new(policy: &ScrapePolicy) -> ConfigResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &policy.headers {
            let name_parsed = HeaderName::try_from(name.as_str())
                .map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
            let value_parsed = HeaderValue::try_from(value.as_str())
                .map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
            headers.insert(name_parsed, value_parsed);
        }

        let client = reqwest::Client::builder()
            .user_agent(policy.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(format!("body read failed: {e}")))?;

        Ok(TransportResponse {
            status,
            body,
            final_url,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Issues single network requests with timeout, retry/backoff and
/// per-target concurrency admission.
pub struct FetchClient {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<RequestPacer>,
    policy: FetchPolicy,
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl FetchClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        pacer: Arc<RequestPacer>,
        policy: FetchPolicy,
    ) -> Self {
        Self {
            transport,
            pacer,
            policy,
            permits: Mutex::new(HashMap::new()),
        }
    }

    /// Register a target's pacing interval and concurrency bound before a
    /// run. Unregistered keys fall back to the policy defaults.
    pub fn register_target(&self, target: &TargetConfig, policy: &ScrapePolicy) {
        self.pacer
            .register(&target.name, target.rate_limit(policy));
        let mut permits = self.permits.lock().expect("permit lock poisoned");
        permits.insert(
            target.name.clone(),
            Arc::new(Semaphore::new(target.concurrency(policy))),
        );
    }

    fn pool_for(&self, key: &str) -> Arc<Semaphore> {
        let mut permits = self.permits.lock().expect("permit lock poisoned");
        permits
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.policy.max_concurrent)))
            .clone()
    }

    /// Fetch one URL under the target's admission and pacing rules.
    pub async fn fetch(
        &self,
        request: FetchRequest,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let cancelled = || FetchError::Cancelled {
            url: request.url.clone(),
        };

        let pool = self.pool_for(key);
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            permit = pool.acquire_owned() => permit.map_err(|_| cancelled())?,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = self.pacer.acquire(key) => {}
        }

        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = self.policy.backoff_delay(attempt - 1);
                debug!(
                    url = %request.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let attempt_started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                outcome = self.transport.execute(&request) => outcome,
            };
            match outcome {
                Ok(response) => {
                    let elapsed_ms = attempt_started.elapsed().as_millis() as u64;
                    if retryable_status(response.status) {
                        warn!(
                            method = %request.method,
                            url = %request.url,
                            status = response.status,
                            attempt,
                            elapsed_ms,
                            "retryable status"
                        );
                        last_error = format!("HTTP {}", response.status);
                        continue;
                    }
                    if !(200..300).contains(&response.status) {
                        warn!(
                            method = %request.method,
                            url = %request.url,
                            status = response.status,
                            attempt,
                            elapsed_ms,
                            "request failed"
                        );
                        return Err(FetchError::Status {
                            url: request.url,
                            status: response.status,
                        });
                    }
                    info!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        attempt,
                        elapsed_ms,
                        "request succeeded"
                    );
                    return Ok(FetchResult {
                        status: response.status,
                        body: response.body,
                        final_url: response.final_url,
                        elapsed: started.elapsed(),
                    });
                }
                Err(err) => {
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        attempt,
                        error = %err,
                        "transport error"
                    );
                    if !err.retryable() {
                        return Err(FetchError::Transport {
                            url: request.url,
                            message: err.to_string(),
                        });
                    }
                    last_error = err.to_string();
                }
            }
        }

        let attempts = self.policy.max_retries + 1;
        warn!(url = %request.url, attempts, "retries exhausted");
        Err(FetchError::Exhausted {
            url: request.url,
            attempts,
            last: last_error,
        })
    }
}

fn retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn client_with(transport: ScriptedTransport, max_retries: u32) -> FetchClient {
        FetchClient::new(
            Arc::new(transport),
            Arc::new(RequestPacer::unpaced()),
            FetchPolicy {
                max_retries,
                backoff_base: Duration::from_millis(10),
                ..Default::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let transport = ScriptedTransport::new().with_page("https://a.test/", "<html>ok</html>");
        let client = client_with(transport, 3);

        let result = client
            .fetch(FetchRequest::get("https://a.test/"), "a", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, 200);
        assert!(result.body.contains("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exactly_max_retries_then_exhausted() {
        let transport = ScriptedTransport::new().with_status("https://a.test/flaky", 500);
        let client = client_with(transport, 2);

        let err = client
            .fetch(
                FetchRequest::get("https://a.test/flaky"),
                "a",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        match err {
            FetchError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_call_count_on_exhaustion() {
        let transport = ScriptedTransport::new().with_timeout("https://a.test/slow");
        let calls = transport.calls_handle();
        let client = client_with(transport, 3);

        let _ = client
            .fetch(
                FetchRequest::get("https://a.test/slow"),
                "a",
                &CancellationToken::new(),
            )
            .await;

        // 1 initial attempt + 3 retries
        assert_eq!(calls.read().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_not_retried() {
        let transport = ScriptedTransport::new().with_status("https://a.test/missing", 404);
        let calls = transport.calls_handle();
        let client = client_with(transport, 3);

        let err = client
            .fetch(
                FetchRequest::get("https://a.test/missing"),
                "a",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(calls.read().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        use crate::testing::ScriptedResponse;

        let transport = ScriptedTransport::new().with_sequence(
            "https://a.test/sometimes",
            vec![
                ScriptedResponse::Status(503),
                ScriptedResponse::Timeout,
                ScriptedResponse::Html("<html>finally</html>".into()),
            ],
        );
        let client = client_with(transport, 3);

        let result = client
            .fetch(
                FetchRequest::get("https://a.test/sometimes"),
                "a",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.body.contains("finally"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let transport = ScriptedTransport::new().with_page("https://a.test/", "ok");
        let calls = transport.calls_handle();
        let client = client_with(transport, 3);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client
            .fetch(FetchRequest::get("https://a.test/"), "a", &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(calls.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        use std::sync::atomic::Ordering;

        let transport = ScriptedTransport::new()
            .with_page("https://a.test/1", "one")
            .with_page("https://a.test/2", "two")
            .with_page("https://a.test/3", "three")
            .with_delay(Duration::from_millis(30));
        let peak = transport.peak_in_flight_handle();

        let client = Arc::new(FetchClient::new(
            Arc::new(transport),
            Arc::new(RequestPacer::unpaced()),
            FetchPolicy {
                max_concurrent: 2,
                ..Default::default()
            },
        ));

        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for url in ["https://a.test/1", "https://a.test/2", "https://a.test/3"] {
            let client = client.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                client.fetch(FetchRequest::get(url), "a", &cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
