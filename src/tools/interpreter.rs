//! Isolated code execution for data analysis.
//!
//! Runs snippets through a Python interpreter in a subprocess with a cleared
//! environment, the task scratch directory as working directory, and a hard
//! timeout. The subprocess never sees session credentials.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::Tool;
use crate::error::ExecutionError;

const EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Captured output above this length is truncated.
const MAX_OUTPUT: usize = 20_000;

/// Sanitize command output to be safe for LLM consumption.
/// Removes binary garbage while preserving valid text.
fn sanitize_output(bytes: &[u8]) -> String {
    let non_printable_count = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    // If more than 10% is non-printable (excluding newlines/tabs), it's likely binary
    if bytes.len() > 100 && non_printable_count > bytes.len() / 10 {
        return format!(
            "[Binary output detected - {} bytes, {}% non-printable.]",
            bytes.len(),
            non_printable_count * 100 / bytes.len()
        );
    }

    let text = String::from_utf8_lossy(bytes);
    text.chars()
        .filter(|&c| c == '\n' || c == '\r' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect()
}

fn truncate(mut s: String) -> String {
    if s.len() > MAX_OUTPUT {
        s.truncate(MAX_OUTPUT);
        s.push_str("\n[truncated]");
    }
    s
}

/// Execute a Python snippet against downloaded task data.
pub struct ExecuteCode {
    python_bin: String,
}

impl ExecuteCode {
    pub fn new(python_bin: String) -> Self {
        Self { python_bin }
    }

    async fn run(&self, code: &str, scratch_dir: &Path) -> Result<String, ExecutionError> {
        tokio::fs::create_dir_all(scratch_dir)
            .await
            .map_err(|e| ExecutionError::RuntimeFault {
                reason: format!("cannot prepare working directory: {}", e),
            })?;

        let child = Command::new(&self.python_bin)
            .arg("-c")
            .arg(code)
            .current_dir(scratch_dir)
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::RuntimeFault {
                reason: format!("failed to start {}: {}", self.python_bin, e),
            })?;

        let output = tokio::time::timeout(EXEC_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout {
                secs: EXEC_TIMEOUT.as_secs(),
            })?
            .map_err(|e| ExecutionError::RuntimeFault {
                reason: e.to_string(),
            })?;

        let stdout = sanitize_output(&output.stdout);
        let stderr = sanitize_output(&output.stderr);

        if !output.status.success() {
            return Err(ExecutionError::RuntimeFault {
                reason: truncate(format!(
                    "exit status {}: {}",
                    output.status.code().unwrap_or(-1),
                    if stderr.is_empty() { stdout } else { stderr }
                )),
            });
        }

        let mut combined = stdout;
        if !stderr.is_empty() {
            combined.push_str("\n[stderr]\n");
            combined.push_str(&stderr);
        }
        if combined.trim().is_empty() {
            combined = "(no output)".to_string();
        }
        Ok(truncate(combined))
    }
}

#[async_trait]
impl Tool for ExecuteCode {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Execute Python code in an isolated interpreter. Use for calculations and for analyzing downloaded files (the working directory contains this task's downloads). Print whatever result you need."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to run. Results must be printed to stdout."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, args: Value, scratch_dir: &Path) -> anyhow::Result<String> {
        let code = args["code"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'code' argument"))?;

        Ok(self.run(code, scratch_dir).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_passes_text() {
        let out = sanitize_output(b"sum = 30\n");
        assert_eq!(out, "sum = 30\n");
    }

    #[test]
    fn test_sanitize_flags_binary() {
        let bytes: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let out = sanitize_output(&bytes);
        assert!(out.starts_with("[Binary output detected"));
    }

    #[tokio::test]
    async fn test_execute_prints_result() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCode::new("python3".to_string());
        let out = tool
            .execute(json!({"code": "print(10 + 20)"}), dir.path())
            .await
            .unwrap();
        assert!(out.contains("30"));
    }

    #[tokio::test]
    async fn test_execute_surfaces_runtime_fault() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecuteCode::new("python3".to_string());
        let err = tool
            .execute(json!({"code": "raise ValueError('boom')"}), dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
