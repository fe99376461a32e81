use async_trait::async_trait;

use crate::error::NotifyError;
use crate::types::RunResult;

/// Delivers the outcome of a finished run. Failures are logged by the
/// orchestrator and never change the run's status.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, result: &RunResult) -> Result<(), NotifyError>;
}
