use super::sse::decode_chunks;
use super::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::ai::{ChunkStream, InferenceService};
use crate::config::{InferenceSettings, TimeoutPolicy};
use crate::logging::elapsed_ms;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// Holds one connection pool; cheap to share behind a reference.
pub struct OpenAiHttpClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeouts: TimeoutPolicy,
}

impl OpenAiHttpClient {
    pub fn new(settings: &InferenceSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeouts.connect)
            .read_timeout(settings.timeouts.read)
            .build()?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeouts: settings.timeouts,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn dispatch(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH);
        let budget = self.timeouts.dispatch_budget();

        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send();

        let response = tokio::time::timeout(budget, send)
            .await
            .map_err(|_| {
                tracing::error!("Inference backend did not answer within {:?}", budget);
                Error::Timeout(format!("no response from {} within {:?}", url, budget))
            })?
            .map_err(|e| {
                tracing::error!("Failed to send request to inference backend: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!(
                "Inference backend error (status {}): {}",
                status,
                error_text
            );
            return Err(Error::AiProvider(format!(
                "API error (status {}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        tracing::debug!(model = %request.model, "Sending chat completion request");

        let response = self.dispatch(request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse completion response: {}\nBody: {}", e, body);
            Error::AiProvider(format!("Failed to parse completion response: {}", e))
        })
    }

    /// Start a streamed completion. Dropping the returned stream closes the
    /// underlying response.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream> {
        tracing::debug!(model = %request.model, "Sending streaming chat completion request");

        let response = self.dispatch(request).await?;
        Ok(Box::pin(decode_chunks(response.bytes_stream())))
    }
}

#[async_trait]
impl InferenceService for OpenAiHttpClient {
    async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.chat_completion(request).await
    }

    async fn create_completion_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        self.chat_completion_stream(request).await
    }
}

/// Shared handle to the inference client, built on first use.
///
/// All clones share a single [`OpenAiHttpClient`]; concurrent first calls
/// construct it exactly once.
#[derive(Clone)]
pub struct LazyInferenceClient {
    settings: Arc<InferenceSettings>,
    cell: Arc<OnceCell<OpenAiHttpClient>>,
}

impl LazyInferenceClient {
    pub fn new(settings: InferenceSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<&OpenAiHttpClient> {
        self.cell
            .get_or_try_init(|| async {
                let started = Instant::now();
                let client = OpenAiHttpClient::new(&self.settings)?;
                tracing::info!(
                    base_url = %client.base_url(),
                    elapsed_ms = elapsed_ms(started),
                    "Inference client created"
                );
                Ok::<_, Error>(client)
            })
            .await
    }
}

#[async_trait]
impl InferenceService for LazyInferenceClient {
    async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.get().await?.chat_completion(request).await
    }

    async fn create_completion_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        self.get().await?.chat_completion_stream(request).await
    }
}
