//! Run outcomes: per-seed walk summaries and the terminal RunResult.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No errors at all
    Success,
    /// Non-fatal errors occurred but storage succeeded
    Partial,
    /// No usable data, a storage failure, or cancellation
    Failed,
}

impl RunStatus {
    /// Process exit code mapping: success and partial are 0, failed is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::Partial => 0,
            RunStatus::Failed => 1,
        }
    }
}

/// Classification of a non-fatal (or run-ending) error summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Extraction,
    Record,
    Storage,
    Notification,
    Cancelled,
}

/// One accumulated error, surfaced in the RunResult instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ErrorSummary {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
            url: Some(url.into()),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Extraction,
            message: message.into(),
            url: None,
        }
    }

    pub fn record(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Record,
            message: message.into(),
            url: None,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Storage,
            message: message.into(),
            url: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "run cancelled".into(),
            url: None,
        }
    }
}

/// Monotonically non-decreasing counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub pages_failed: usize,
    pub records_extracted: usize,
    pub records_cleaned: usize,
    pub records_dropped: usize,
    pub records_stored: usize,
}

/// How one seed's walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkTerminal {
    /// Pagination ran to its natural or bounded end
    Done,
    /// robots.txt disallowed the page
    Skipped,
    /// A page fetch failed terminally
    Failed,
    /// The run was cancelled mid-walk
    Cancelled,
}

/// Summary of one seed's pagination walk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkSummary {
    pub seed_url: String,
    pub pages_fetched: usize,
    pub pages_skipped: usize,
    pub pages_failed: usize,
    pub records: usize,
    pub terminal: WalkTerminal,
}

impl WalkSummary {
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed_url: seed_url.into(),
            pages_fetched: 0,
            pages_skipped: 0,
            pages_failed: 0,
            records: 0,
            terminal: WalkTerminal::Done,
        }
    }
}

/// The terminal record of a run: the engine's only externally observable
/// output besides collaborator side effects. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub target: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub errors: Vec<ErrorSummary>,
}

impl RunResult {
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }
}
