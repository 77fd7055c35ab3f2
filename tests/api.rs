//! HTTP trigger surface: secret validation, background scheduling, and the
//! session observability endpoints.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use quizchain::api::{router, AppState};
use quizchain::config::Config;
use quizchain::llm::{ChatMessage, ChatResponse, LlmClient, ToolDefinition};
use quizchain::solver::Orchestrator;

const SECRET: &str = "default_secret";

struct ScriptedLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
    ) -> anyhow::Result<ChatResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

/// One-task verifier: any answer is accepted, chain ends.
async fn spawn_verifier() -> String {
    let app = Router::new()
        .route(
            "/quiz-start",
            get(|| async { Html("<html><body>Trivial quiz</body></html>") }),
        )
        .route(
            "/submit",
            post(|Json(_): Json<Value>| async { Json(json!({ "correct": true })) }),
        );
    spawn(app).await
}

async fn spawn_app(scratch: &tempfile::TempDir, answers: Vec<ChatResponse>) -> String {
    let config = Config::new(
        "test-key".to_string(),
        SECRET.to_string(),
        scratch.path().to_path_buf(),
    );
    let llm = Arc::new(ScriptedLlm {
        responses: Mutex::new(answers.into()),
    });
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), llm));
    let state = Arc::new(AppState::new(config, orchestrator));
    spawn(router(state)).await
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let scratch = tempfile::tempdir().unwrap();
    let app = spawn_app(&scratch, vec![]).await;

    let body: Value = reqwest::get(format!("{}/health", app))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn run_rejects_invalid_secret() {
    let scratch = tempfile::tempdir().unwrap();
    let app = spawn_app(&scratch, vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/run", app))
        .json(&json!({
            "email": "student@example.com",
            "secret": "wrong",
            "url": "http://quiz.example/quiz-start",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn run_rejects_malformed_url() {
    let scratch = tempfile::tempdir().unwrap();
    let app = spawn_app(&scratch, vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/run", app))
        .json(&json!({
            "email": "student@example.com",
            "secret": SECRET,
            "url": "not a url",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn run_acknowledges_and_session_reaches_terminal_status() {
    let verifier = spawn_verifier().await;

    let scratch = tempfile::tempdir().unwrap();
    let answer = ChatResponse {
        content: Some(
            json!({ "submit_url": format!("{}/submit", verifier), "answer": 1 }).to_string(),
        ),
        tool_calls: None,
        finish_reason: Some("stop".to_string()),
        usage: None,
        model: None,
    };
    let app = spawn_app(&scratch, vec![answer]).await;

    let client = reqwest::Client::new();
    let ack: Value = client
        .post(format!("{}/run", app))
        .json(&json!({
            "email": "student@example.com",
            "secret": SECRET,
            "url": format!("{}/quiz-start", verifier),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["status"], json!("ok"));
    let id = ack["session_id"].as_str().unwrap().to_string();

    // The ack returns before the chain finishes; poll the snapshot.
    let mut snapshot = Value::Null;
    for _ in 0..100 {
        snapshot = client
            .get(format!("{}/sessions/{}", app, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if snapshot["status"] != json!("running") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(snapshot["status"], json!("completed"));
    assert_eq!(snapshot["depth"], json!(1));
    // Credentials never leak through the observability surface.
    assert!(snapshot.get("secret").is_none());
    assert!(snapshot.get("identity").is_none());

    let sessions: Value = client
        .get(format!("{}/sessions", app))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cancel_unknown_session_is_not_found() {
    let scratch = tempfile::tempdir().unwrap();
    let app = spawn_app(&scratch, vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!(
            "{}/sessions/00000000-0000-0000-0000-000000000000/cancel",
            app
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
