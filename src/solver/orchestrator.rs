//! Task orchestrator: the FETCH → REASON → SUBMIT → DECIDE state machine.
//!
//! Recursion across tasks is deliberately an iterative loop with a
//! session-carried depth counter, so the depth and cycle guards are
//! structural rather than stack-bound. Every state transition re-checks
//! cancellation and the session wall clock; cancellation therefore lands
//! between states, never mid-call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ChainLimit, SolveError};
use crate::llm::LlmClient;
use crate::solver::engine::{EngineOutcome, ReasoningEngine};
use crate::solver::session::{normalize_url, SessionStatus, SharedSession, TaskOutcome};
use crate::solver::{Attachment, Task, Transcript};
use crate::tools::{
    AudioTranscriber, FileDownloader, PageFetcher, SubmissionResult, SubmitClient, ToolRegistry,
};

/// File extensions downloaded ahead of reasoning when referenced by a page.
const DATA_EXTENSIONS: &[&str] = &[".csv", ".json", ".pdf", ".xlsx", ".txt"];

/// Media extensions downloaded and transcribed ahead of reasoning.
const MEDIA_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".m4a", ".ogg", ".flac", ".mp4", ".mpeg"];

/// One step of the per-task state machine.
enum State {
    Fetch { url: String },
    Reason { task: Task },
    Submit { task_url: String, outcome: EngineOutcome },
    Decide { task_url: String, result: SubmissionResult },
}

/// Drives sessions through their chains. Holds no per-session state, so
/// independent sessions can run through one orchestrator concurrently.
pub struct Orchestrator {
    config: Config,
    engine: ReasoningEngine,
    fetcher: PageFetcher,
    downloader: FileDownloader,
    submitter: SubmitClient,
    transcriber: Option<AudioTranscriber>,
}

impl Orchestrator {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>) -> Self {
        let tools = ToolRegistry::for_reasoning(&config);
        let engine = ReasoningEngine::new(
            llm,
            tools,
            config.default_model.clone(),
            config.max_reasoning_steps,
            config.task_timeout,
        );
        let fetcher = PageFetcher::from_config(&config);
        let downloader = FileDownloader::new(config.fetch_retries);
        let submitter = SubmitClient::new(config.fetch_retries);
        let transcriber = AudioTranscriber::from_config(&config);

        Self {
            config,
            engine,
            fetcher,
            downloader,
            submitter,
            transcriber,
        }
    }

    /// Run one session to a terminal status.
    pub async fn run(&self, session: SharedSession, cancel: CancellationToken) {
        let (id, starting_url) = {
            let s = session.read().await;
            (s.id, s.starting_url.clone())
        };
        tracing::info!("Session {} starting at {}", id, starting_url);

        let deadline = Instant::now() + self.config.session_timeout;
        let result = self
            .run_chain(&session, &cancel, deadline, starting_url)
            .await;

        // Nothing from this run is meant to outlive it.
        let session_root = self.config.scratch_dir.join(id.to_string());
        if let Err(e) = tokio::fs::remove_dir_all(&session_root).await {
            tracing::debug!("Scratch cleanup for session {}: {}", id, e);
        }

        let mut s = session.write().await;
        match result {
            Ok(()) => {
                tracing::info!("Session {} completed after {} tasks", id, s.depth);
                s.finish(SessionStatus::Completed, None);
            }
            Err(e) => {
                let status = if e.is_abort() {
                    SessionStatus::Aborted
                } else {
                    SessionStatus::Failed
                };
                tracing::error!(
                    "Session {} ended {:?} at {} (depth {}): {}",
                    id,
                    status,
                    s.current_url,
                    s.depth,
                    e
                );
                s.finish(status, Some(e.to_string()));
            }
        }
    }

    async fn run_chain(
        &self,
        session: &SharedSession,
        cancel: &CancellationToken,
        deadline: Instant,
        starting_url: String,
    ) -> Result<(), SolveError> {
        let mut state = State::Fetch { url: starting_url };

        loop {
            if cancel.is_cancelled() {
                return Err(SolveError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ChainLimit::WallClock {
                    secs: self.config.session_timeout.as_secs(),
                }
                .into());
            }

            state = match state {
                State::Fetch { url } => {
                    tracing::info!("FETCH {}", url);
                    let scratch = self.task_scratch(session).await;
                    let page = self.fetcher.fetch(&url).await?;
                    let (attachments, media) =
                        self.download_attachments(&page.links, &scratch).await;
                    let transcripts = self.transcribe_media(&media).await;
                    State::Reason {
                        task: Task {
                            url,
                            content: page.text,
                            attachments,
                            transcripts,
                        },
                    }
                }

                State::Reason { task } => {
                    tracing::info!("REASON {}", task.url);
                    let scratch = self.task_scratch(session).await;
                    let outcome = self.engine.solve(&task, &scratch).await?;
                    State::Submit {
                        task_url: task.url,
                        outcome,
                    }
                }

                State::Submit { task_url, outcome } => {
                    tracing::info!("SUBMIT {} -> {}", task_url, outcome.submit_url);
                    let payload = {
                        let s = session.read().await;
                        json!({
                            "email": s.identity.email,
                            "secret": s.identity.secret,
                            "url": task_url,
                            "answer": outcome.answer,
                        })
                    };
                    let result = self.submitter.submit(&outcome.submit_url, &payload).await?;

                    // This task's downloads are no longer needed.
                    let scratch = self.task_scratch(session).await;
                    if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
                        tracing::debug!("Task scratch cleanup: {}", e);
                    }

                    State::Decide { task_url, result }
                }

                State::Decide { task_url, result } => {
                    let mut s = session.write().await;
                    s.depth += 1;
                    let depth = s.depth;
                    s.outcomes.push(TaskOutcome {
                        url: task_url,
                        depth,
                        accepted: result.accepted,
                        message: result.message.clone(),
                    });

                    if !result.accepted {
                        return Err(SolveError::Rejected {
                            reason: result.message,
                        });
                    }

                    let Some(next_url) = result.next_url else {
                        return Ok(());
                    };

                    let normalized = normalize_url(&next_url);
                    if s.visited.contains(&normalized) {
                        return Err(ChainLimit::Cycle { url: normalized }.into());
                    }
                    if s.depth >= self.config.max_chain_depth {
                        return Err(ChainLimit::MaxDepth {
                            max: self.config.max_chain_depth,
                        }
                        .into());
                    }

                    s.visited.push(normalized);
                    s.current_url = next_url.clone();
                    State::Fetch { url: next_url }
                }
            };
        }
    }

    /// Scratch directory for the task currently being processed.
    async fn task_scratch(&self, session: &SharedSession) -> PathBuf {
        let s = session.read().await;
        self.config
            .scratch_dir
            .join(s.id.to_string())
            .join(format!("task-{}", s.depth))
    }

    /// Download data and media files referenced by the page before reasoning
    /// starts. Individual failures are logged and skipped; the engine can
    /// still re-fetch via its download tool if it needs one. Media files are
    /// returned separately so they can be transcribed.
    async fn download_attachments(
        &self,
        links: &[String],
        scratch: &std::path::Path,
    ) -> (Vec<Attachment>, Vec<Attachment>) {
        let mut attachments = Vec::new();
        let mut media = Vec::new();
        for link in links {
            let lower = link.to_lowercase();
            let is_data = DATA_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
            let is_media = MEDIA_EXTENSIONS.iter().any(|ext| lower.ends_with(ext));
            if !is_data && !is_media {
                continue;
            }
            match self.downloader.download(link, scratch).await {
                Ok(d) => {
                    let attachment = Attachment {
                        url: d.url,
                        path: d.path,
                        bytes: d.bytes,
                    };
                    if is_media {
                        media.push(attachment.clone());
                    }
                    attachments.push(attachment);
                }
                Err(e) => tracing::warn!("Skipping attachment {}: {}", link, e),
            }
        }
        (attachments, media)
    }

    /// Transcribe downloaded media files. Failures degrade the prompt rather
    /// than the task; the engine can retry via its transcription tool.
    async fn transcribe_media(&self, media: &[Attachment]) -> Vec<Transcript> {
        let Some(transcriber) = &self.transcriber else {
            if !media.is_empty() {
                tracing::warn!(
                    "{} media file(s) on page but transcription is not configured",
                    media.len()
                );
            }
            return Vec::new();
        };

        let mut transcripts = Vec::new();
        for attachment in media {
            match transcriber.transcribe(&attachment.path).await {
                Ok(text) => transcripts.push(Transcript {
                    url: attachment.url.clone(),
                    text,
                }),
                Err(e) => tracing::warn!("Skipping transcription of {}: {}", attachment.url, e),
            }
        }
        transcripts
    }
}
