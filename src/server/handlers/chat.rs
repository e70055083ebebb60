use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::server::{
    config::AppState,
    services::{
        formatter::format_reply,
        transcript::{ChatPair, TranscriptError},
    },
};

#[derive(Debug, Deserialize)]
pub struct MessageInput {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub history: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatContentResponse {
    pub filename: String,
    pub chat_history: Vec<ChatPair>,
}

pub async fn chat_history(
    State(state): State<AppState>,
) -> Result<Json<ChatHistoryResponse>, (StatusCode, String)> {
    let history = state.transcripts.list_history().map_err(|e| {
        error!("Failed to list chat history: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list chat history: {}", e),
        )
    })?;

    Ok(Json(ChatHistoryResponse { history }))
}

pub async fn chat_content(
    State(state): State<AppState>,
    Json(request): Json<FileRequest>,
) -> Result<Json<ChatContentResponse>, (StatusCode, String)> {
    info!("Loading chat content from {}", request.filename);

    let chat_history = state
        .transcripts
        .read_transcript(&request.filename)
        .map_err(|e| match e {
            TranscriptError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "Chat file not found.".to_string())
            }
            other => {
                error!("Failed to read chat content: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to read chat content: {}", other),
                )
            }
        })?;

    Ok(Json(ChatContentResponse {
        filename: request.filename,
        chat_history,
    }))
}

pub async fn orch_agent(
    State(state): State<AppState>,
    Json(payload): Json<MessageInput>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    info!("Relaying message to agent thread {}", state.thread_id);
    let user_message = payload.message;

    state
        .agent
        .create_message(&state.thread_id, &user_message)
        .await
        .map_err(|e| {
            error!("Failed to post user message: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to post user message: {}", e),
            )
        })?;

    state
        .agent
        .create_and_process_run(&state.thread_id)
        .await
        .map_err(|e| {
            error!("Agent run failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Agent run failed: {}", e),
            )
        })?;

    let messages = state
        .agent
        .list_text_messages(&state.thread_id)
        .await
        .map_err(|e| {
            error!("Failed to list thread messages: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list thread messages: {}", e),
            )
        })?;

    // The listing is newest first, so the first text message is the reply
    // to the message just processed.
    if let Some(raw_reply) = messages.first() {
        debug!("Raw agent reply: {}", raw_reply);
        let reply = format_reply(raw_reply);

        state
            .transcripts
            .append(user_message, reply.response.clone());

        return Ok(Json(json!({
            "response": reply.response,
            "sources": reply.sources,
            "chat_log_file": null
        })));
    }

    Ok(Json(json!({
        "response": "Sorry, no valid response.",
        "sources": []
    })))
}
