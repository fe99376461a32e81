//! Scripted fakes for exercising the engine without a network.
//!
//! These live in the library (not behind `cfg(test)`) so downstream crates
//! can drive the orchestrator in their own tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{NotifyError, StorageError};
use crate::fetch::{FetchRequest, HttpTransport, TransportError, TransportResponse};
use crate::traits::{Notifier, StorageAdapter};
use crate::types::{RawRecord, RunResult};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// 200 with the given HTML body
    Html(String),
    /// The given status with an empty body
    Status(u16),
    /// A transport timeout
    Timeout,
    /// A connection failure
    Connect,
}

/// An [`HttpTransport`] that serves canned responses per URL and records
/// every request it sees.
///
/// Each URL's responses are served in order; the last one repeats once the
/// script runs out. URLs with no script get a 404.
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, (Vec<ScriptedResponse>, usize)>>,
    calls: Arc<RwLock<Vec<String>>>,
    cancel_on: Mutex<HashMap<String, CancellationToken>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Arc::new(RwLock::new(Vec::new())),
            cancel_on: Mutex::new(HashMap::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `body` with a 200 for every request to `url`.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_sequence(url, vec![ScriptedResponse::Html(body.into())])
    }

    /// Serve `status` with an empty body for every request to `url`.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.with_sequence(url, vec![ScriptedResponse::Status(status)])
    }

    /// Time out every request to `url`.
    pub fn with_timeout(self, url: impl Into<String>) -> Self {
        self.with_sequence(url, vec![ScriptedResponse::Timeout])
    }

    /// Serve `responses` in order for `url`; the last repeats.
    pub fn with_sequence(
        self,
        url: impl Into<String>,
        responses: Vec<ScriptedResponse>,
    ) -> Self {
        self.routes
            .lock()
            .expect("routes lock poisoned")
            .insert(url.into(), (responses, 0));
        self
    }

    /// Cancel `token` when a request for `url` arrives, before replying.
    pub fn with_cancel_on(self, url: impl Into<String>, token: CancellationToken) -> Self {
        self.cancel_on
            .lock()
            .expect("cancel lock poisoned")
            .insert(url.into(), token);
        self
    }

    /// Hold every request open for `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the request log (URLs in arrival order).
    pub fn calls_handle(&self) -> Arc<RwLock<Vec<String>>> {
        self.calls.clone()
    }

    /// Shared handle to the high-water mark of concurrent requests.
    pub fn peak_in_flight_handle(&self) -> Arc<AtomicUsize> {
        self.peak_in_flight.clone()
    }

    /// How many requests hit `url`.
    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .read()
            .expect("calls lock poisoned")
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        request: &FetchRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.calls
            .write()
            .expect("calls lock poisoned")
            .push(request.url.clone());

        if let Some(token) = self
            .cancel_on
            .lock()
            .expect("cancel lock poisoned")
            .get(&request.url)
        {
            token.cancel();
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = {
            let mut routes = self.routes.lock().expect("routes lock poisoned");
            match routes.get_mut(&request.url) {
                Some((responses, served)) => {
                    let index = (*served).min(responses.len().saturating_sub(1));
                    *served += 1;
                    responses.get(index).cloned()
                }
                None => None,
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let final_url = request.url.clone();
        match response {
            Some(ScriptedResponse::Html(body)) => Ok(TransportResponse {
                status: 200,
                body,
                final_url,
            }),
            Some(ScriptedResponse::Status(status)) => Ok(TransportResponse {
                status,
                body: String::new(),
                final_url,
            }),
            Some(ScriptedResponse::Timeout) => Err(TransportError::Timeout),
            Some(ScriptedResponse::Connect) => {
                Err(TransportError::Connect("connection refused".into()))
            }
            None => Ok(TransportResponse {
                status: 404,
                body: String::new(),
                final_url,
            }),
        }
    }
}

/// A [`StorageAdapter`] that records what it is asked to save and can be
/// scripted to fail.
pub struct MockStorage {
    saved: RwLock<Vec<RawRecord>>,
    save_calls: AtomicUsize,
    failure: Option<String>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            saved: RwLock::new(Vec::new()),
            save_calls: AtomicUsize::new(0),
            failure: None,
        }
    }

    /// A storage that fails every save with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    /// Every record saved so far, across all calls.
    pub fn saved(&self) -> Vec<RawRecord> {
        self.saved.read().expect("storage lock poisoned").clone()
    }

    /// How many times `save` was called.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MockStorage {
    async fn save(&self, records: &[RawRecord]) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(StorageError::Backend(message.clone()));
        }
        self.saved
            .write()
            .expect("storage lock poisoned")
            .extend_from_slice(records);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A [`Notifier`] that records every result it is handed.
pub struct MockNotifier {
    notified: RwLock<Vec<RunResult>>,
    failure: Option<String>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            notified: RwLock::new(Vec::new()),
            failure: None,
        }
    }

    /// A notifier that records the result but still reports failure.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            notified: RwLock::new(Vec::new()),
            failure: Some(message.into()),
        }
    }

    pub fn notified(&self) -> Vec<RunResult> {
        self.notified.read().expect("notifier lock poisoned").clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, result: &RunResult) -> Result<(), NotifyError> {
        self.notified
            .write()
            .expect("notifier lock poisoned")
            .push(result.clone());
        match &self.failure {
            Some(message) => Err(NotifyError(message.clone())),
            None => Ok(()),
        }
    }
}
