use super::ApiError;
use crate::chat::EventStream;
use crate::models::{ChatRequest, ChatResponse};
use crate::resolver::ModelRole;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use std::convert::Infallible;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(chat_stream))
        .route("/chat/regular", post(chat_regular))
        .route("/chat/regular/stream", post(chat_regular_stream))
        .route("/chat/vision", post(chat_vision))
        .route("/chat/vision/stream", post(chat_vision_stream))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    respond(&state, ModelRole::Explicit, request).await
}

async fn chat_stream(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    ndjson(state.chat.stream(ModelRole::Explicit, request))
}

async fn chat_regular(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    respond(&state, ModelRole::Regular, request).await
}

async fn chat_regular_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    ndjson(state.chat.stream(ModelRole::Regular, request))
}

async fn chat_vision(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    respond(&state, ModelRole::Vision, request).await
}

async fn chat_vision_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    ndjson(state.chat.stream(ModelRole::Vision, request))
}

async fn respond(
    state: &AppState,
    role: ModelRole,
    request: ChatRequest,
) -> Result<Json<ChatResponse>, ApiError> {
    state.chat.respond(role, request).await.map(Json).map_err(|e| {
        tracing::error!(route = role.label(), "Chat completion failed: {}", e);
        ApiError::chat_unavailable(&e)
    })
}

/// One JSON object per line. The status is already 200 when the first line
/// goes out, so a failure just ends the body early, without a `done` line.
fn ndjson(events: EventStream) -> Response {
    let body = async_stream::stream! {
        let mut events = events;
        while let Some(event) = events.next().await {
            match event.and_then(|event| event.to_ndjson()) {
                Ok(line) => yield Ok::<Bytes, Infallible>(Bytes::from(line)),
                Err(e) => {
                    tracing::error!("Chat stream ended early: {}", e);
                    break;
                }
            }
        }
    };

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(body),
    )
        .into_response()
}
