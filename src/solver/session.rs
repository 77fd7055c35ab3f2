//! Session record: the mutable state threaded through one chain run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

/// Credentials presented on every submission. Opaque to the orchestrator:
/// forwarded into payloads, never inspected.
#[derive(Debug, Clone)]
pub struct Identity {
    pub email: String,
    pub secret: String,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Chain traversal in progress
    Running,
    /// Verifier accepted the final answer and gave no next_url
    Completed,
    /// A step failed terminally or an answer was rejected
    Failed,
    /// A guard tripped: cycle, depth, wall clock, or cancellation
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Outcome of one processed task. Kept instead of full task content to
/// bound session memory.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub url: String,
    pub depth: usize,
    pub accepted: bool,
    pub message: Option<String>,
}

/// One end-to-end run of a quiz chain.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub identity: Identity,
    pub starting_url: String,
    pub current_url: String,
    /// Normalized URLs already claimed by this chain, for cycle detection.
    pub visited: Vec<String>,
    /// Number of tasks processed so far.
    pub depth: usize,
    pub status: SessionStatus,
    pub outcomes: Vec<TaskOutcome>,
    /// Terminal cause when status is Failed or Aborted.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A session shared between the orchestrator and the API layer.
pub type SharedSession = Arc<RwLock<Session>>;

impl Session {
    /// Create a session about to fetch `starting_url`.
    pub fn new(identity: Identity, starting_url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            current_url: starting_url.clone(),
            visited: vec![normalize_url(&starting_url)],
            starting_url,
            depth: 0,
            status: SessionStatus::Running,
            outcomes: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to a terminal status, recording the cause.
    pub fn finish(&mut self, status: SessionStatus, failure: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    /// Serializable view for the observability endpoints. Credentials are
    /// deliberately left out.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            status: self.status,
            starting_url: self.starting_url.clone(),
            current_url: self.current_url.clone(),
            depth: self.depth,
            visited: self.visited.clone(),
            outcomes: self.outcomes.clone(),
            failure: self.failure.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Point-in-time view of a session, safe to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub status: SessionStatus,
    pub starting_url: String,
    pub current_url: String,
    pub depth: usize,
    pub visited: Vec<String>,
    pub outcomes: Vec<TaskOutcome>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Normalize a URL for cycle detection: scheme + host + path + query,
/// fragment dropped. Unparseable inputs are compared as trimmed strings.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_fragment() {
        assert_eq!(
            normalize_url("http://quiz.example/task?a=1#section"),
            "http://quiz.example/task?a=1"
        );
    }

    #[test]
    fn test_normalize_keeps_query() {
        assert_eq!(
            normalize_url("http://quiz.example/task?a=1&b=2"),
            "http://quiz.example/task?a=1&b=2"
        );
    }

    #[test]
    fn test_normalize_case_insensitive_host() {
        assert_eq!(
            normalize_url("HTTP://Quiz.Example/Task"),
            normalize_url("http://quiz.example/Task")
        );
    }

    #[test]
    fn test_new_session_claims_starting_url() {
        let session = Session::new(
            Identity {
                email: "student@example.com".into(),
                secret: "s".into(),
            },
            "http://quiz.example/quiz-start#intro".into(),
        );
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.depth, 0);
        assert_eq!(session.visited, vec!["http://quiz.example/quiz-start".to_string()]);
    }
}
