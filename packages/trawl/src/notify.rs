//! Run-completion notifiers.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use crate::error::NotifyError;
use crate::traits::Notifier;
use crate::types::RunResult;

/// POSTs the JSON-serialized run result to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, result: &RunResult) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(result)
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "webhook returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Logs the run result at info level. The default when no webhook is
/// configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, result: &RunResult) -> Result<(), NotifyError> {
        info!(
            run_id = %result.run_id,
            target = %result.target,
            status = ?result.status,
            records_stored = result.counts.records_stored,
            errors = result.errors.len(),
            "run notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunCounts, RunStatus};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result(status: RunStatus) -> RunResult {
        RunResult {
            run_id: "run-1".into(),
            target: "quotes".into(),
            status,
            counts: RunCounts::default(),
            duration_ms: 12,
            dry_run: false,
            started_at: chrono::Utc::now(),
            errors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_result_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "target": "quotes",
                "status": "success",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        notifier.notify(&result(RunStatus::Success)).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        let err = notifier.notify(&result(RunStatus::Failed)).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
