//! Tool adapters for the quiz solver.
//!
//! Each adapter is a single-purpose, independently-failing capability behind
//! a uniform invocation contract (name, JSON input, text output). The
//! reasoning engine dispatches among them by name through the
//! [`ToolRegistry`]; the orchestrator uses the typed clients
//! ([`PageFetcher`], [`FileDownloader`], [`SubmitClient`]) directly.
//!
//! ## Scratch-First Design
//!
//! Tools operate inside a per-task scratch directory:
//! - downloads land there
//! - code execution runs with it as working directory
//!
//! The directory is discarded once the task's submission resolves, so no
//! adapter state leaks across tasks.

mod download;
mod interpreter;
mod submit;
mod transcribe;
mod web;

pub use download::{Downloaded, DownloadFile, FileDownloader};
pub use interpreter::ExecuteCode;
pub use submit::{SubmissionResult, SubmitClient};
pub use transcribe::{AudioTranscriber, TranscribeAudio};
pub use web::{PageData, PageFetcher, ReadPage};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::llm::{FunctionDefinition, ToolDefinition};

/// Information about a tool for display purposes.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// `scratch_dir` is the current task's scratch directory; downloads go
    /// there and code runs with it as the working directory.
    async fn execute(&self, args: Value, scratch_dir: &Path) -> anyhow::Result<String>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create the registry exposed to the reasoning engine.
    ///
    /// Deliberately excludes answer submission: the engine never holds
    /// credentials, so submitting stays with the orchestrator.
    pub fn for_reasoning(config: &Config) -> Self {
        let fetcher = Arc::new(PageFetcher::from_config(config));
        let downloader = Arc::new(FileDownloader::new(config.fetch_retries));

        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert("read_page".to_string(), Arc::new(ReadPage::new(fetcher)));
        tools.insert(
            "download_file".to_string(),
            Arc::new(DownloadFile::new(Arc::clone(&downloader))),
        );
        tools.insert(
            "execute_code".to_string(),
            Arc::new(ExecuteCode::new(config.python_bin.clone())),
        );
        if let Some(transcriber) = AudioTranscriber::from_config(config) {
            tools.insert(
                "transcribe_audio".to_string(),
                Arc::new(TranscribeAudio::new(downloader, Arc::new(transcriber))),
            );
        }

        tracing::debug!("Reasoning tool registry ready with {} tools", tools.len());
        Self { tools }
    }

    /// List all available tools.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Get tool schemas in LLM-compatible format.
    pub fn get_tool_schemas(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                tool_type: "function".to_string(),
                function: FunctionDefinition {
                    name: t.name().to_string(),
                    description: t.description().to_string(),
                    parameters: t.parameters_schema(),
                },
            })
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        scratch_dir: &Path,
    ) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;

        tool.execute(args, scratch_dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_names(registry: &ToolRegistry) -> Vec<String> {
        registry.list_tools().iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_reasoning_registry_excludes_submission() {
        let config =
            Config::new("k".to_string(), "s".to_string(), std::env::temp_dir());
        let names = tool_names(&ToolRegistry::for_reasoning(&config));
        assert!(names.contains(&"read_page".to_string()));
        assert!(names.contains(&"download_file".to_string()));
        assert!(names.contains(&"execute_code".to_string()));
        assert!(!names.iter().any(|n| n.contains("submit")));
    }

    #[test]
    fn test_transcription_tool_gated_on_key() {
        let mut config =
            Config::new("k".to_string(), "s".to_string(), std::env::temp_dir());
        let without = tool_names(&ToolRegistry::for_reasoning(&config));
        assert!(!without.contains(&"transcribe_audio".to_string()));

        config.transcribe_api_key = Some("tk".to_string());
        let with = tool_names(&ToolRegistry::for_reasoning(&config));
        assert!(with.contains(&"transcribe_audio".to_string()));
    }
}
