//! Reasoning engine facade.
//!
//! Wraps the LLM in a tool-calling loop: given one task, the engine may
//! invoke its tools (page reading, file download, code execution) any number
//! of times up to its step budget, then must yield a final JSON answer with
//! the submission URL it extracted from the page. The orchestrator only ever
//! sees the final outcome or a `ReasoningError`.
//!
//! The step budget is independent of the orchestrator's chain-depth bound:
//! it stops one task's reasoning from looping even though the orchestrator
//! only bounds the number of tasks.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::ReasoningError;
use crate::llm::{ChatMessage, LlmClient};
use crate::solver::Task;
use crate::tools::ToolRegistry;

/// What the engine hands back for a solved task.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    /// Absolute verification endpoint extracted from the page.
    pub submit_url: String,
    /// The answer payload; shape is task-defined and opaque downstream.
    pub answer: Value,
}

/// LLM-backed reasoning over one task at a time.
pub struct ReasoningEngine {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    model: String,
    max_steps: usize,
    task_timeout: Duration,
}

impl ReasoningEngine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        model: String,
        max_steps: usize,
        task_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            tools,
            model,
            max_steps,
            task_timeout,
        }
    }

    /// Derive an answer for `task`, bounded by the step budget and the
    /// per-task wall clock.
    pub async fn solve(
        &self,
        task: &Task,
        scratch_dir: &Path,
    ) -> Result<EngineOutcome, ReasoningError> {
        tokio::time::timeout(self.task_timeout, self.run_loop(task, scratch_dir))
            .await
            .map_err(|_| ReasoningError::TaskTimeout {
                secs: self.task_timeout.as_secs(),
            })?
    }

    async fn run_loop(
        &self,
        task: &Task,
        scratch_dir: &Path,
    ) -> Result<EngineOutcome, ReasoningError> {
        let mut messages = vec![
            ChatMessage::system(self.build_system_prompt()),
            ChatMessage::user(build_task_prompt(task)),
        ];
        let tool_schemas = self.tools.get_tool_schemas();

        for step in 0..self.max_steps {
            tracing::debug!("Reasoning step {} for {}", step + 1, task.url);

            let response = self
                .llm
                .chat_completion(&self.model, &messages, Some(&tool_schemas))
                .await
                .map_err(|e| ReasoningError::Llm {
                    message: e.to_string(),
                })?;

            if let Some(tool_calls) = &response.tool_calls {
                if !tool_calls.is_empty() {
                    messages.push(ChatMessage::assistant_tool_calls(
                        response.content.clone(),
                        tool_calls.clone(),
                    ));

                    for tool_call in tool_calls {
                        let args: Value = serde_json::from_str(&tool_call.function.arguments)
                            .unwrap_or(Value::Null);
                        tracing::info!(
                            "Tool call: {} {}",
                            tool_call.function.name,
                            tool_call.function.arguments
                        );

                        let observation = match self
                            .tools
                            .execute(&tool_call.function.name, args, scratch_dir)
                            .await
                        {
                            Ok(output) => output,
                            Err(e) => format!("Error: {}", e),
                        };

                        messages.push(ChatMessage::tool_result(tool_call.id.clone(), observation));
                    }

                    continue;
                }
            }

            // No tool calls: the model is done, its content must be the answer.
            let content = response.content.unwrap_or_default();
            match parse_final(&content, &task.url) {
                Ok(outcome) => return Ok(outcome),
                Err(detail) => {
                    tracing::warn!("Unparseable final output at step {}: {}", step + 1, detail);
                    messages.push(ChatMessage::new(crate::llm::Role::Assistant, content));
                    messages.push(ChatMessage::user(
                        "That was not valid. Reply with ONLY a JSON object of the form \
                         {\"submit_url\": \"...\", \"answer\": ...} and nothing else.",
                    ));
                }
            }
        }

        Err(ReasoningError::StepBudgetExhausted {
            steps: self.max_steps,
        })
    }

    fn build_system_prompt(&self) -> String {
        let tool_descriptions = self
            .tools
            .list_tools()
            .iter()
            .map(|t| format!("- **{}**: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You solve one web quiz task at a time.

## Available Tools
{tool_descriptions}

## Rules
1. Read the task text carefully; use tools when the answer needs page content, files, or computation
2. Find the submission URL on the page. It must be absolute, not relative
3. Never POST the answer yourself; the caller submits it
4. The answer may be a number, string, boolean, or JSON value - keep its natural type

## Final Response
When you know the answer, reply with ONLY this JSON object and nothing else:
{{"submit_url": "<absolute submission URL>", "answer": <the answer value>}}"#,
            tool_descriptions = tool_descriptions
        )
    }
}

/// Render the task into the opening user message.
fn build_task_prompt(task: &Task) -> String {
    let mut prompt = format!(
        "Task page URL: {}\n\n--- PAGE CONTENT ---\n{}\n",
        task.url, task.content
    );

    if !task.attachments.is_empty() {
        let manifest = task
            .attachments
            .iter()
            .map(|a| format!("- {} -> {} ({} bytes)", a.url, a.path.display(), a.bytes))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!("\n--- DOWNLOADED FILES ---\n{}\n", manifest));
    }

    if !task.transcripts.is_empty() {
        let transcripts = task
            .transcripts
            .iter()
            .map(|t| format!("Transcription of {}:\n{}", t.url, t.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        prompt.push_str(&format!("\n--- AUDIO TRANSCRIPTIONS ---\n{}\n", transcripts));
    }

    prompt
}

/// Parse the model's final message into an outcome.
///
/// Accepts markdown code fences around the JSON. A relative submission URL
/// is resolved against the task page.
fn parse_final(content: &str, base_url: &str) -> Result<EngineOutcome, String> {
    let cleaned = strip_code_fences(content);

    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| format!("not JSON: {} ({})", e, cleaned))?;

    let submit_url = value
        .get("submit_url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "missing submit_url".to_string())?;
    let answer = value
        .get("answer")
        .cloned()
        .ok_or_else(|| "missing answer".to_string())?;

    let submit_url = match Url::parse(submit_url) {
        Ok(u) => u.to_string(),
        Err(_) => Url::parse(base_url)
            .and_then(|b| b.join(submit_url))
            .map(|u| u.to_string())
            .map_err(|_| format!("unusable submit_url: {}", submit_url))?,
    };

    Ok(EngineOutcome {
        submit_url,
        answer,
    })
}

/// Strip a surrounding markdown code fence, if any.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_final_plain_json() {
        let outcome = parse_final(
            r#"{"submit_url": "http://v.example/submit", "answer": 30}"#,
            "http://quiz.example/quiz-start",
        )
        .unwrap();
        assert_eq!(outcome.submit_url, "http://v.example/submit");
        assert_eq!(outcome.answer, json!(30));
    }

    #[test]
    fn test_parse_final_strips_fences() {
        let content = "```json\n{\"submit_url\": \"http://v.example/submit\", \"answer\": \"paris\"}\n```";
        let outcome = parse_final(content, "http://quiz.example/quiz-2").unwrap();
        assert_eq!(outcome.answer, json!("paris"));
    }

    #[test]
    fn test_parse_final_resolves_relative_submit_url() {
        let outcome = parse_final(
            r#"{"submit_url": "/submit", "answer": true}"#,
            "http://quiz.example/tasks/quiz-1",
        )
        .unwrap();
        assert_eq!(outcome.submit_url, "http://quiz.example/submit");
    }

    #[test]
    fn test_parse_final_rejects_prose() {
        assert!(parse_final("The answer is 30.", "http://quiz.example/").is_err());
        assert!(parse_final(r#"{"answer": 30}"#, "http://quiz.example/").is_err());
    }

    #[test]
    fn test_task_prompt_lists_attachments() {
        let task = Task {
            url: "http://quiz.example/quiz-1".into(),
            content: "Sum the values.".into(),
            attachments: vec![crate::solver::Attachment {
                url: "http://quiz.example/data.csv".into(),
                path: "/tmp/scratch/data.csv".into(),
                bytes: 42,
            }],
            transcripts: vec![],
        };
        let prompt = build_task_prompt(&task);
        assert!(prompt.contains("DOWNLOADED FILES"));
        assert!(prompt.contains("data.csv"));
        assert!(!prompt.contains("AUDIO TRANSCRIPTIONS"));
    }

    #[test]
    fn test_task_prompt_includes_transcripts() {
        let task = Task {
            url: "http://quiz.example/quiz-1".into(),
            content: "Listen to the clip and answer.".into(),
            attachments: vec![],
            transcripts: vec![crate::solver::Transcript {
                url: "http://quiz.example/question.mp3".into(),
                text: "what is ten plus twenty".into(),
            }],
        };
        let prompt = build_task_prompt(&task);
        assert!(prompt.contains("AUDIO TRANSCRIPTIONS"));
        assert!(prompt.contains("question.mp3"));
        assert!(prompt.contains("what is ten plus twenty"));
    }
}
