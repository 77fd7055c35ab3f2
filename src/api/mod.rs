//! HTTP API for quizchain.
//!
//! ## Endpoints
//!
//! - `POST /run` - Validate the shared secret and schedule a quiz-chain session
//! - `GET /health` - Health check
//! - `GET /sessions` - List session snapshots
//! - `GET /sessions/{id}` - Get one session snapshot
//! - `POST /sessions/{id}/cancel` - Cancel a running session
//!
//! `POST /run` acknowledges immediately; the chain runs as a background
//! task and its outcome is visible only through the session endpoints and
//! logs.

mod routes;
mod types;

pub use routes::{router, serve, AppState, SessionHandle};
pub use types::*;
