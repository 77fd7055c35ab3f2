//! Quiz-chain solving: session state, the reasoning engine facade, and the
//! task orchestrator.
//!
//! One session traverses a chain of tasks linked by `next_url` pointers.
//! The orchestrator drives each task through FETCH → REASON → SUBMIT →
//! DECIDE; the engine derives the answer, the orchestrator owns every
//! decision about continuing, failing, or aborting.

mod engine;
mod orchestrator;
mod session;

pub use engine::{EngineOutcome, ReasoningEngine};
pub use orchestrator::Orchestrator;
pub use session::{
    normalize_url, Identity, Session, SessionSnapshot, SessionStatus, SharedSession, TaskOutcome,
};

use std::path::PathBuf;

/// The unit of work at one URL.
#[derive(Debug, Clone)]
pub struct Task {
    /// Address of the page this task came from.
    pub url: String,
    /// Rendered text of the page, not raw markup.
    pub content: String,
    /// Files referenced by the page, downloaded to local scratch.
    pub attachments: Vec<Attachment>,
    /// Transcripts of media files referenced by the page.
    pub transcripts: Vec<Transcript>,
}

/// A downloaded file referenced by a task page.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Original reference on the page.
    pub url: String,
    /// Local path in the task's scratch directory.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
}

/// Text of a transcribed media file.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Original media reference on the page.
    pub url: String,
    /// Transcribed speech.
    pub text: String,
}
