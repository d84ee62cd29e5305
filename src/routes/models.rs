use super::ApiError;
use crate::models::{
    LoadModelRequest, LoadModelResponse, ModelInfo, UnloadModelRequest, UnloadModelResponse,
};
use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/models", get(list_models))
        .route("/models/load", post(load_model))
        .route("/models/unload", post(unload_model))
}

async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    state.models.list_models().await.map(Json).map_err(|e| {
        tracing::error!("Listing models failed: {}", e);
        ApiError::service_unavailable(e.to_string())
    })
}

async fn load_model(
    State(state): State<AppState>,
    Json(request): Json<LoadModelRequest>,
) -> Json<LoadModelResponse> {
    let response = match state
        .models
        .load_model(&request.model_key, request.exclusive)
        .await
    {
        Ok(model) => LoadModelResponse {
            loaded: true,
            model: Some(model),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Loading {} failed: {}", request.model_key, e);
            LoadModelResponse {
                loaded: false,
                model: None,
                error: Some(e.to_string()),
            }
        }
    };
    Json(response)
}

async fn unload_model(
    State(state): State<AppState>,
    Json(request): Json<UnloadModelRequest>,
) -> Json<UnloadModelResponse> {
    let outcome = if request.unload_all {
        state.models.unload_all().await
    } else if let Some(model_key) = request.model_key.filter(|key| !key.is_empty()) {
        state
            .models
            .unload_model(&model_key)
            .await
            .map(|()| vec![model_key])
    } else {
        return Json(UnloadModelResponse {
            success: false,
            unloaded_keys: Vec::new(),
            error: Some("Must specify model_key or unload_all=true".to_string()),
        });
    };

    Json(match outcome {
        Ok(unloaded_keys) => UnloadModelResponse {
            success: true,
            unloaded_keys,
            error: None,
        },
        Err(e) => {
            tracing::warn!("Unloading failed: {}", e);
            UnloadModelResponse {
                success: false,
                unloaded_keys: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    })
}
