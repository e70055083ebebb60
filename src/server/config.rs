use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::configuration::Settings;
use crate::server::{
    handlers::chat::{chat_content, chat_history, orch_agent},
    services::{agent::AgentService, transcript::TranscriptStore},
};

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AgentService>,
    pub transcripts: Arc<TranscriptStore>,
    pub thread_id: String,
    pub flush_shutdown: watch::Sender<bool>,
}

/// Initializes the services, opens the agent thread reused for every
/// exchange, and starts the transcript flush loop. The returned handle
/// finishes once the loop has observed the shutdown signal.
pub async fn build_state(settings: &Settings) -> anyhow::Result<(AppState, JoinHandle<()>)> {
    let agent = Arc::new(AgentService::new(&settings.agent));
    let thread_id = agent.create_thread().await?;
    info!("Opened agent thread {}", thread_id);

    let transcripts = Arc::new(TranscriptStore::new(
        &settings.transcripts.dir,
        Duration::from_secs(settings.transcripts.idle_timeout_secs),
        Duration::from_secs(settings.transcripts.poll_interval_secs),
    )?);

    let (flush_shutdown, shutdown_rx) = watch::channel(false);
    let flusher = TranscriptStore::spawn_flusher(transcripts.clone(), shutdown_rx);

    let state = AppState {
        agent,
        transcripts,
        thread_id,
        flush_shutdown,
    };

    Ok((state, flusher))
}

pub async fn configure_app(settings: &Settings) -> anyhow::Result<Router> {
    let (state, _flusher) = build_state(settings).await?;
    Ok(app_router(state))
}

async fn log_request(request: Request, next: Next) -> Response {
    info!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/chat_history", get(chat_history))
        .route("/chat_content", post(chat_content))
        .route("/orch_agent", post(orch_agent))
        .layer(middleware::from_fn(log_request))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
