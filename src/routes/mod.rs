//! HTTP routes
//!
//! Handlers are thin: they pick a [`ModelRole`](crate::resolver::ModelRole),
//! call into the chat service or the model host, and map failures onto
//! `{"detail": ...}` bodies.

pub mod chat;
pub mod meta;
pub mod models;

use crate::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(meta::routes())
        .merge(models::routes())
        .merge(chat::routes())
}

/// Error body returned to clients.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            detail: detail.into(),
        }
    }

    pub fn chat_unavailable(err: &crate::Error) -> Self {
        Self::service_unavailable(format!("Chat service unavailable: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}
