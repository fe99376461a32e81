//! Typed errors for the extraction engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure class: configuration problems abort before any fetch,
//! fetch failures are terminal per page but non-fatal to the run, and
//! storage failures flip the run to failed.

use thiserror::Error;

/// Fatal configuration problems, surfaced once at target-load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL in the configuration does not parse
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A CSS selector does not compile
    #[error("malformed selector `{selector}` for {context}")]
    Selector { context: String, selector: String },

    /// Pagination enabled without a way to find the next page
    #[error("pagination enabled for target `{target}` but no next_selector configured")]
    PaginationWithoutSelector { target: String },

    /// Pagination bound out of range
    #[error("invalid pagination bound for target `{target}`: max_pages must be at least 1")]
    PaginationBound { target: String },

    /// A target has no seed URLs to walk
    #[error("target `{target}` has no seed URLs")]
    NoSeeds { target: String },

    /// Referenced target missing from configuration
    #[error("target `{0}` not found in configuration")]
    UnknownTarget(String),

    /// A configured header name or value is not valid HTTP
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Configuration file did not deserialize
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures of a single fetch. Terminal for that page, non-fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-retryable HTTP status (4xx other than 429)
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Retry budget exhausted against a persistently failing endpoint
    #[error("retries exhausted fetching {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },

    /// Non-retryable transport failure (e.g. body read error)
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The run was cancelled while this fetch was queued or in flight
    #[error("fetch cancelled: {url}")]
    Cancelled { url: String },
}

impl FetchError {
    /// True when the error came from exhausting the retry budget.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, FetchError::Exhausted { .. })
    }

    /// True when the error was a cancellation, not a network failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }

    /// The URL the failed fetch was for.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Exhausted { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Cancelled { url } => url,
        }
    }
}

/// Storage failures. Fatal to the run; no retry at the engine level.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Notification failures. Logged by the orchestrator, never fatal.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
