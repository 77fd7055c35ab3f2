//! Answer submission to the verification endpoint.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SubmitError;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The verifier's decision on one submitted answer.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    /// Whether the answer was accepted.
    pub accepted: bool,
    /// Pointer to the next task, absent when the chain is finished.
    pub next_url: Option<String>,
    /// Human-readable detail; never used for control flow.
    pub message: Option<String>,
}

/// Wire shape of the verifier response: `{correct, url?, reason?}`.
#[derive(Debug, Deserialize)]
struct VerifierResponse {
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Posts answers to verification endpoints with bounded transport retry.
pub struct SubmitClient {
    client: reqwest::Client,
    retries: u32,
}

impl SubmitClient {
    pub fn new(retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; quizchain/0.3)")
            .timeout(SUBMIT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, retries }
    }

    /// Submit `payload` to `submit_url`, retrying transport failures.
    ///
    /// A parseable verifier response is returned as-is even when the answer
    /// is rejected; rejection is the orchestrator's decision to make.
    pub async fn submit(
        &self,
        submit_url: &str,
        payload: &Value,
    ) -> Result<SubmissionResult, SubmitError> {
        let mut attempt = 0;
        loop {
            match self.submit_once(submit_url, payload).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = e.suggested_delay(attempt);
                    tracing::warn!(
                        "Submission attempt {} to {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        submit_url,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn submit_once(
        &self,
        submit_url: &str,
        payload: &Value,
    ) -> Result<SubmissionResult, SubmitError> {
        tracing::info!("Submitting answer to {}", submit_url);
        let response = self
            .client
            .post(submit_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmitError::Transport {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| SubmitError::Transport {
            reason: format!("failed to read response: {}", e),
        })?;

        if status.is_server_error() {
            return Err(SubmitError::Transport {
                reason: format!("verifier returned HTTP {}", status),
            });
        }
        if !status.is_success() {
            return Err(SubmitError::RejectedFormat {
                reason: format!("verifier returned HTTP {}: {}", status, body),
            });
        }

        let parsed: VerifierResponse =
            serde_json::from_str(&body).map_err(|e| SubmitError::RejectedFormat {
                reason: format!("unparseable verifier response: {} (body: {})", e, body),
            })?;

        tracing::info!(
            "Verifier responded: correct={} next_url={:?}",
            parsed.correct,
            parsed.url
        );

        Ok(SubmissionResult {
            accepted: parsed.correct,
            next_url: parsed.url.filter(|u| !u.is_empty()),
            message: parsed.reason,
        })
    }
}
