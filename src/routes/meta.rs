use crate::models::HealthResponse;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/help", get(help))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "LM Studio gateway up" }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

const ROUTES: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Health check"),
    ("GET", "/models", "List loaded models from LM Studio"),
    (
        "POST",
        "/models/load",
        "Load a model. Body: { model_key: string, exclusive?: boolean }",
    ),
    (
        "POST",
        "/models/unload",
        "Unload model(s). Body: { model_key?: string, unload_all?: boolean }",
    ),
    (
        "POST",
        "/chat",
        "Non-streaming chat with custom model. Body: { model_key?, messages: [{role, content, images?}], config? }",
    ),
    (
        "POST",
        "/chat/stream",
        "Streaming chat with custom model (NDJSON). Body: { model_key?, messages: [{role, content, images?}], config? }",
    ),
    (
        "POST",
        "/chat/regular",
        "Non-streaming text-only chat using the default regular model. Body: { messages: [{role, content}], config? }",
    ),
    (
        "POST",
        "/chat/regular/stream",
        "Streaming text-only chat using the default regular model (NDJSON). Body: { messages: [{role, content}], config? }",
    ),
    (
        "POST",
        "/chat/vision",
        "Non-streaming vision chat using the default vision model. Body: { messages: [{role, content, images?}], config? }",
    ),
    (
        "POST",
        "/chat/vision/stream",
        "Streaming vision chat using the default vision model (NDJSON). Body: { messages: [{role, content, images?}], config? }",
    ),
];

async fn help(State(state): State<AppState>) -> Json<Value> {
    let routes: Vec<Value> = ROUTES
        .iter()
        .map(|(method, path, description)| {
            json!({ "method": method, "path": path, "description": description })
        })
        .collect();
    let resolver = state.chat.resolver();

    Json(json!({
        "summary": "LM Studio gateway: OpenAI-compatible API for chat, LM Studio REST API for model management",
        "routes": routes,
        "notes": [
            "Model management (load/unload) goes through the LM Studio REST API",
            format!("Chat goes through the OpenAI-compatible endpoint at {}", state.config.openai_base_url),
            "messages[].role is one of system|user|assistant",
            "messages[].images[] accepts { data_base64, mime_type? } for vision models",
            "Images are sent as data URLs: data:image/jpeg;base64,{base64_string}",
            "config supports: temperature, maxTokens, topP, presencePenalty, frequencyPenalty",
            format!(
                "Default models: regular={}, vision={}",
                resolver.regular_default(),
                resolver.vision_default()
            ),
            "Streaming returns application/x-ndjson with one JSON object per line",
            "Use exclusive=true when loading to unload other models first"
        ]
    }))
}
