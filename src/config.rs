//! Configuration management for quizchain.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `STUDENT_SECRET` - Required. Shared secret the trigger endpoint validates.
//! - `STUDENT_EMAIL` - Optional. Identity presented on submissions. Defaults to `student@example.com`.
//! - `DEFAULT_MODEL` - Optional. The LLM model to use. Defaults to `openai/gpt-5-mini`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8000`.
//! - `MAX_CHAIN_DEPTH` - Optional. Maximum tasks per session. Defaults to `20`.
//! - `MAX_REASONING_STEPS` - Optional. Tool-call budget per task. Defaults to `12`.
//! - `TASK_TIMEOUT_SECS` - Optional. Reasoning wall clock per task. Defaults to `300`.
//! - `SESSION_TIMEOUT_SECS` - Optional. Wall clock per chain. Defaults to `1800`.
//! - `FETCH_RETRIES` - Optional. Retries for transient fetch/submit failures. Defaults to `3`.
//! - `SCRATCH_DIR` - Optional. Root directory for downloaded files. Defaults to the system temp dir.
//! - `BROWSER_ENABLED` - Optional. Fetch pages via a CDP browser instead of plain HTTP.
//! - `BROWSER_CDP_URL` - Optional. CDP endpoint. Defaults to `http://127.0.0.1:9222`.
//! - `PYTHON_BIN` - Optional. Interpreter for the execute_code tool. Defaults to `python3`.
//! - `TRANSCRIBE_API_KEY` - Optional. Enables audio transcription of media attachments.
//! - `TRANSCRIBE_API_URL` - Optional. Whisper-compatible transcription endpoint. Defaults to the OpenAI one.
//! - `TRANSCRIBE_MODEL` - Optional. Transcription model. Defaults to `whisper-1`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// LLM model identifier (OpenRouter format)
    pub default_model: String,

    /// Shared secret validated on `POST /run`
    pub student_secret: String,

    /// Identity email forwarded on every submission
    pub student_email: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Maximum number of tasks one session may traverse
    pub max_chain_depth: usize,

    /// Maximum tool-calling steps per task inside the reasoning engine
    pub max_reasoning_steps: usize,

    /// Wall-clock bound on reasoning for a single task
    pub task_timeout: Duration,

    /// Wall-clock bound on one whole chain run
    pub session_timeout: Duration,

    /// Retry count for transient fetch and submission failures
    pub fetch_retries: u32,

    /// Root directory for per-task download scratch space
    pub scratch_dir: PathBuf,

    /// Fetch pages through a CDP browser (for script-rendered pages)
    pub browser_enabled: bool,

    /// Chrome DevTools Protocol endpoint
    pub browser_cdp_url: String,

    /// Interpreter binary for the execute_code tool
    pub python_bin: String,

    /// API key for audio transcription; `None` disables transcription
    pub transcribe_api_key: Option<String>,

    /// Whisper-compatible transcription endpoint
    pub transcribe_api_url: String,

    /// Transcription model identifier
    pub transcribe_model: String,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` or
    /// `STUDENT_SECRET` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let student_secret = std::env::var("STUDENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("STUDENT_SECRET".to_string()))?;

        let student_email = std::env::var("STUDENT_EMAIL")
            .unwrap_or_else(|_| "student@example.com".to_string());

        let default_model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "openai/gpt-5-mini".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse("PORT", "8000")?;

        let max_chain_depth = env_parse("MAX_CHAIN_DEPTH", "20")?;
        let max_reasoning_steps = env_parse("MAX_REASONING_STEPS", "12")?;
        let task_timeout = Duration::from_secs(env_parse("TASK_TIMEOUT_SECS", "300")?);
        let session_timeout = Duration::from_secs(env_parse("SESSION_TIMEOUT_SECS", "1800")?);
        let fetch_retries = env_parse("FETCH_RETRIES", "3")?;

        let scratch_dir = std::env::var("SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("quizchain"));

        let browser_enabled = std::env::var("BROWSER_ENABLED")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        let browser_cdp_url = std::env::var("BROWSER_CDP_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9222".to_string());

        let python_bin = std::env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string());

        let transcribe_api_key = std::env::var("TRANSCRIBE_API_KEY").ok();
        let transcribe_api_url = std::env::var("TRANSCRIBE_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/audio/transcriptions".to_string());
        let transcribe_model =
            std::env::var("TRANSCRIBE_MODEL").unwrap_or_else(|_| "whisper-1".to_string());

        Ok(Self {
            api_key,
            default_model,
            student_secret,
            student_email,
            host,
            port,
            max_chain_depth,
            max_reasoning_steps,
            task_timeout,
            session_timeout,
            fetch_retries,
            scratch_dir,
            browser_enabled,
            browser_cdp_url,
            python_bin,
            transcribe_api_key,
            transcribe_api_url,
            transcribe_model,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, student_secret: String, scratch_dir: PathBuf) -> Self {
        Self {
            api_key,
            default_model: "openai/gpt-5-mini".to_string(),
            student_secret,
            student_email: "student@example.com".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_chain_depth: 20,
            max_reasoning_steps: 12,
            task_timeout: Duration::from_secs(300),
            session_timeout: Duration::from_secs(1800),
            fetch_retries: 3,
            scratch_dir,
            browser_enabled: false,
            browser_cdp_url: "http://127.0.0.1:9222".to_string(),
            python_bin: "python3".to_string(),
            transcribe_api_key: None,
            transcribe_api_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            transcribe_model: "whisper-1".to_string(),
        }
    }
}
