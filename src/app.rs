//! Application wiring: services, router and the HTTP listener.

use crate::ai::{InferenceService, LazyInferenceClient};
use crate::chat::ChatService;
use crate::config::{Config, TimeoutPolicy};
use crate::lifecycle::{LmStudioHost, ModelHost};
use crate::logging::request_logging;
use crate::routes;
use crate::state::AppState;
use crate::Result;
use axum::{
    http::HeaderValue,
    middleware, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Owns the configuration and shared state of a running gateway.
pub struct App {
    config: Arc<Config>,
    state: AppState,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub inference: Arc<dyn InferenceService>,
    pub model_host: Arc<dyn ModelHost>,
}

impl App {
    /// Build an app talking to the backends named in `config`.
    ///
    /// No connection is made here; the inference client is created on the
    /// first chat request.
    pub fn new(config: Config) -> Result<Self> {
        let inference = LazyInferenceClient::new(config.inference_settings());
        let model_host = LmStudioHost::new(
            &config.lmstudio_host,
            TimeoutPolicy::with_read_timeout(config.llm_timeout),
        )?;

        info!(
            inference = %config.openai_base_url,
            lmstudio = %config.lmstudio_host,
            regular = %config.default_regular_model,
            vision = %config.default_vision_model,
            "Backends configured"
        );

        Ok(Self::with_services(
            AppServices {
                inference: Arc::new(inference),
                model_host: Arc::new(model_host),
            },
            config,
        ))
    }

    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: Config) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            chat: ChatService::new(services.inference, config.resolver()),
            models: services.model_host,
            config: Arc::clone(&config),
        };
        Self { config, state }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Router {
        let router = routes::router().with_state(self.state.clone());
        let router = match cors_layer(&self.config.cors_origin_list()) {
            Some(cors) => router.layer(cors),
            None => router,
        };
        router.layer(middleware::from_fn(request_logging))
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// `*` allows any origin without credentials; an explicit list allows those
/// origins with credentials. No origins means no CORS headers at all.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    if origins.iter().any(|origin| origin == "*") {
        return Some(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}
