//! File download into per-task scratch storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::Tool;
use crate::error::FetchError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Extensions inferred from Content-Type when the URL gives none.
const EXT_MAP: &[(&str, &str)] = &[
    ("application/json", "json"),
    ("application/pdf", "pdf"),
    ("text/csv", "csv"),
    ("text/plain", "txt"),
    ("audio/mpeg", "mp3"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/mp4", "m4a"),
];

/// A file saved to local scratch storage.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Original URL the file came from.
    pub url: String,
    /// Local path it was written to.
    pub path: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
}

/// Downloads referenced files with bounded retry for transient failures.
pub struct FileDownloader {
    client: reqwest::Client,
    retries: u32,
}

impl FileDownloader {
    pub fn new(retries: u32) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; quizchain/0.3)")
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, retries }
    }

    /// Download `url` into `dest_dir`, retrying transient failures.
    pub async fn download(&self, url: &str, dest_dir: &Path) -> Result<Downloaded, FetchError> {
        let mut attempt = 0;
        loop {
            match self.download_once(url, dest_dir).await {
                Ok(d) => return Ok(d),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = e.suggested_delay(attempt);
                    tracing::warn!(
                        "Download attempt {} for {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        url,
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

    async fn download_once(&self, url: &str, dest_dir: &Path) -> Result<Downloaded, FetchError> {
        tracing::debug!("Downloading file from: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::NotFound {
                    url: url.to_string(),
                    status: 0,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let disposition = response
            .headers()
            .get("content-disposition")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let filename = pick_filename(url, disposition.as_deref(), &content_type);

        let storage_err = |reason: String| FetchError::StorageFailure {
            url: url.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| storage_err(e.to_string()))?;
        let path = dest_dir.join(&filename);

        let body = response
            .bytes()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    storage_err(format!("failed to read body: {}", e))
                }
            })?;
        let bytes = body.len() as u64;

        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| storage_err(e.to_string()))?;

        tracing::info!("File downloaded to: {} ({} bytes)", path.display(), bytes);
        Ok(Downloaded {
            url: url.to_string(),
            path,
            bytes,
        })
    }
}

/// Choose a local filename: Content-Disposition, then URL tail, with an
/// extension inferred from Content-Type when missing.
fn pick_filename(url: &str, disposition: Option<&str>, content_type: &str) -> String {
    let mut filename = disposition
        .and_then(|d| {
            Regex::new(r#"filename="?([^";]+)"?"#)
                .ok()
                .and_then(|re| re.captures(d))
                .map(|c| c[1].trim().to_string())
        })
        .unwrap_or_default();

    if filename.is_empty() {
        filename = url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();
    }

    if filename.is_empty() {
        filename = format!("download_{}", uuid::Uuid::new_v4());
    }

    if !filename.contains('.') {
        for (ctype, ext) in EXT_MAP {
            if content_type.contains(ctype) {
                filename = format!("{}.{}", filename, ext);
                break;
            }
        }
    }

    // Strip path separators a hostile header could smuggle in.
    filename.replace(['/', '\\'], "_")
}

/// Download a referenced file into the task's scratch directory.
pub struct DownloadFile {
    downloader: Arc<FileDownloader>,
}

impl DownloadFile {
    pub fn new(downloader: Arc<FileDownloader>) -> Self {
        Self { downloader }
    }
}

#[async_trait]
impl Tool for DownloadFile {
    fn name(&self) -> &str {
        "download_file"
    }

    fn description(&self) -> &str {
        "Download a file referenced by the task page to local storage. Returns the local path and size. Use before analyzing data files with execute_code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The file URL to download"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, scratch_dir: &Path) -> anyhow::Result<String> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'url' argument"))?;

        let downloaded = self.downloader.download(url, scratch_dir).await?;
        Ok(format!(
            "Saved {} to {} ({} bytes)",
            downloaded.url,
            downloaded.path.display(),
            downloaded.bytes
        ))
    }
}
