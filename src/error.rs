//! Solver error taxonomy with retry classification.
//!
//! Transient transport failures (fetch timeouts, 5xx, submission transport
//! errors) are retried locally inside the adapters with exponential backoff.
//! Everything else propagates to the orchestrator, which classifies it into
//! a terminal session status.

use std::time::Duration;

use thiserror::Error;

/// Cap on any single backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff for transient failures: `base * 2^attempt`, capped.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u32.saturating_pow(attempt);
    base.saturating_mul(multiplier).min(MAX_BACKOFF)
}

/// Page or file retrieval failure.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("{url} returned HTTP {status}")]
    NotFound { url: String, status: u16 },

    #[error("failed to render {url}: {reason}")]
    RenderFailure { url: String, reason: String },

    #[error("failed to store download from {url}: {reason}")]
    StorageFailure { url: String, reason: String },
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::NotFound { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            FetchError::RenderFailure { .. } | FetchError::StorageFailure { .. } => false,
        }
    }

    /// Suggested delay before the given retry attempt.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        let base = match self {
            FetchError::NotFound { status: 429, .. } => Duration::from_secs(2),
            _ => Duration::from_millis(500),
        };
        backoff_delay(base, attempt)
    }

    /// The URL this failure occurred on.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::NotFound { url, .. }
            | FetchError::RenderFailure { url, .. }
            | FetchError::StorageFailure { url, .. } => url,
        }
    }
}

/// The reasoning engine could not produce an answer for a task.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning step budget exhausted after {steps} steps")]
    StepBudgetExhausted { steps: usize },

    #[error("reasoning timed out after {secs}s")]
    TaskTimeout { secs: u64 },

    #[error("LLM call failed: {message}")]
    Llm { message: String },

    #[error("engine produced no parseable answer: {detail}")]
    MalformedAnswer { detail: String },
}

/// Answer submission failure.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission transport failure: {reason}")]
    Transport { reason: String },

    #[error("verifier rejected submission format: {reason}")]
    RejectedFormat { reason: String },
}

impl SubmitError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SubmitError::Transport { .. })
    }

    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        backoff_delay(Duration::from_millis(500), attempt)
    }
}

/// Failure inside the isolated code-execution tool.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("code execution failed: {reason}")]
    RuntimeFault { reason: String },

    #[error("code execution timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A structural guard on chain traversal tripped.
#[derive(Debug, Error)]
pub enum ChainLimit {
    #[error("next_url {url} was already visited (cycle)")]
    Cycle { url: String },

    #[error("maximum chain depth {max} reached")]
    MaxDepth { max: usize },

    #[error("session wall clock exceeded {secs}s")]
    WallClock { secs: u64 },
}

/// Terminal cause recorded on a session that did not complete.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    ChainLimit(#[from] ChainLimit),

    #[error("answer rejected by verifier{}", reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Rejected { reason: Option<String> },

    #[error("session cancelled")]
    Cancelled,
}

impl SolveError {
    /// Whether this cause aborts the session (guard/cancel) rather than
    /// failing it (step failure).
    pub fn is_abort(&self) -> bool {
        matches!(self, SolveError::ChainLimit(_) | SolveError::Cancelled)
    }
}
