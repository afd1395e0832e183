use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post, put},
    Json, Router,
};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use trialtower_agent::TurnUpdate;
use trialtower_schema::{DebugEvent, Message};

use crate::routes::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Serialize)]
pub struct TranscriptView {
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct SettingsView {
    pub thinking_expanded: bool,
    pub debug_enabled: bool,
}

#[derive(Deserialize)]
pub struct SettingsUpdate {
    pub thinking_expanded: Option<bool>,
    pub debug_enabled: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/{id}/messages", post(post_message))
        .route("/sessions/{id}", get(get_transcript))
        .route("/sessions/{id}", delete(clear_session))
        .route("/sessions/{id}/settings", get(get_settings))
        .route("/sessions/{id}/settings", put(put_settings))
        .route("/sessions/{id}/debug", get(get_debug))
}

/// Run one chat turn and stream its updates back as SSE, one event per
/// `TurnUpdate`, named by the update's kind. The turn itself runs in a
/// spawned task holding the session lock, so a second message to the same
/// session queues behind it.
async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let client = state.agent()?.clone();
    let context = state.sessions.get_or_create(&session_id);
    let (tx, rx) = mpsc::channel::<TurnUpdate>(64);

    tokio::spawn(async move {
        let mut context = context.lock().await;
        if let Err(e) = context.send_message(&client, &request.text, &tx).await {
            tracing::warn!(error = %e, "chat turn failed before streaming");
            let _ = tx
                .send(TurnUpdate::Error {
                    code: "request_failed".to_string(),
                    message: e.to_string(),
                })
                .await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|update| {
        let event = Event::default().event(update.kind());
        Ok(match serde_json::to_string(&update) {
            Ok(json) => event.data(json),
            Err(_) => event,
        })
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Display-form transcript, annotations intact. An unknown session id reads
/// as an empty transcript rather than an error.
async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<TranscriptView> {
    let messages = match state.sessions.get(&session_id) {
        Some(context) => context.lock().await.messages(),
        None => Vec::new(),
    };
    Json(TranscriptView { messages })
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    if let Some(context) = state.sessions.get(&session_id) {
        context.lock().await.clear();
    }
    state.sessions.remove(&session_id);
    Json(serde_json::json!({ "status": "cleared", "session": session_id }))
}

async fn get_settings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SettingsView> {
    let (thinking_expanded, debug_enabled) = match state.sessions.get(&session_id) {
        Some(context) => {
            let context = context.lock().await;
            (context.thinking_expanded, context.debug_enabled)
        }
        None => (true, false),
    };
    Json(SettingsView {
        thinking_expanded,
        debug_enabled,
    })
}

/// Partial update; creates the session so toggles can be set before the
/// first message.
async fn put_settings(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(update): Json<SettingsUpdate>,
) -> Json<SettingsView> {
    let context = state.sessions.get_or_create(&session_id);
    let mut context = context.lock().await;
    if let Some(thinking_expanded) = update.thinking_expanded {
        context.thinking_expanded = thinking_expanded;
    }
    if let Some(debug_enabled) = update.debug_enabled {
        context.debug_enabled = debug_enabled;
    }
    Json(SettingsView {
        thinking_expanded: context.thinking_expanded,
        debug_enabled: context.debug_enabled,
    })
}

/// Captured debug events, newest first.
async fn get_debug(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<DebugEvent>> {
    let events = match state.sessions.get(&session_id) {
        Some(context) => context.lock().await.debug.snapshot(),
        None => Vec::new(),
    };
    Json(events)
}
