//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to start solving a quiz chain.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Identity email forwarded on every submission
    pub email: String,

    /// Shared secret; must match the configured `STUDENT_SECRET`
    pub secret: String,

    /// Starting task URL
    pub url: String,
}

/// Acknowledgement returned while the chain runs in the background.
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub message: String,
    pub status: String,
    pub session_id: Uuid,
}
