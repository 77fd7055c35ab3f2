//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::OpenRouterClient;
use crate::solver::{Identity, Orchestrator, Session, SessionSnapshot, SharedSession};

use super::types::{RunRequest, RunResponse};

/// Retained sessions above this count evict the oldest terminal ones.
const MAX_SESSIONS: usize = 256;

/// A tracked session: shared record plus its cancellation token.
pub struct SessionHandle {
    pub session: SharedSession,
    pub cancel: CancellationToken,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(run_quiz))
        .route("/health", get(health_check))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/cancel", post(cancel_session))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let llm = Arc::new(OpenRouterClient::new(config.api_key.clone()));
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), llm));
    let state = Arc::new(AppState::new(config.clone(), orchestrator));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Receive a quiz-chain trigger, validate the secret, and schedule the run.
async fn run_quiz(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    tracing::info!("Received run request for {}", req.url);

    if req.secret != state.config.student_secret {
        tracing::warn!("Invalid secret on run request for {}", req.url);
        return Err((StatusCode::FORBIDDEN, "Invalid secret".to_string()));
    }

    if Url::parse(&req.url).is_err() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Invalid starting URL: {}", req.url),
        ));
    }

    // An empty email falls back to the configured identity.
    let email = if req.email.trim().is_empty() {
        state.config.student_email.clone()
    } else {
        req.email
    };

    let session = Session::new(
        Identity {
            email,
            secret: req.secret,
        },
        req.url,
    );
    let id = session.id;
    let shared: SharedSession = Arc::new(RwLock::new(session));
    let cancel = CancellationToken::new();

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            id,
            SessionHandle {
                session: Arc::clone(&shared),
                cancel: cancel.clone(),
            },
        );
        prune_sessions(&mut sessions).await;
    }

    // The chain runs in the background; this request only acknowledges.
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        orchestrator.run(shared, cancel).await;
    });

    Ok(Json(RunResponse {
        message: "Quiz processing started".to_string(),
        status: "ok".to_string(),
        session_id: id,
    }))
}

/// Evict the oldest terminal sessions once the map outgrows [`MAX_SESSIONS`].
/// Running sessions are never evicted.
async fn prune_sessions(sessions: &mut HashMap<Uuid, SessionHandle>) {
    if sessions.len() <= MAX_SESSIONS {
        return;
    }

    let mut terminal = Vec::new();
    for (id, handle) in sessions.iter() {
        let s = handle.session.read().await;
        if s.status.is_terminal() {
            terminal.push((*id, s.started_at));
        }
    }
    terminal.sort_by_key(|(_, started_at)| *started_at);

    let excess = sessions.len().saturating_sub(MAX_SESSIONS);
    for (id, _) in terminal.into_iter().take(excess) {
        tracing::debug!("Evicting terminal session {}", id);
        sessions.remove(&id);
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// List all sessions, most recent first.
async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSnapshot>> {
    let sessions = state.sessions.read().await;
    let mut snapshots = Vec::with_capacity(sessions.len());
    for handle in sessions.values() {
        snapshots.push(handle.session.read().await.snapshot());
    }
    snapshots.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(snapshots)
}

/// Get one session snapshot.
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    match sessions.get(&id) {
        Some(handle) => Ok(Json(handle.session.read().await.snapshot())),
        None => Err((StatusCode::NOT_FOUND, format!("Session {} not found", id))),
    }
}

/// Cancel a running session. Takes effect at the next state transition.
async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let sessions = state.sessions.read().await;
    let Some(handle) = sessions.get(&id) else {
        return Err((StatusCode::NOT_FOUND, format!("Session {} not found", id)));
    };

    let status = handle.session.read().await.status;
    if status.is_terminal() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Session {} is not running (status: {:?})", id, status),
        ));
    }

    handle.cancel.cancel();
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Session cancellation requested"
    })))
}
