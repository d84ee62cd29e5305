//! Inference backend integration
//!
//! Talks to an OpenAI-compatible chat completions endpoint, either in one
//! shot or as a stream of incremental chunks.

pub mod mock;
pub mod openai;

pub use mock::MockInferenceClient;
pub use openai::{LazyInferenceClient, OpenAiHttpClient};

use crate::ai::openai::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Backend chunks in arrival order. Ends when the backend finishes; an
/// `Err` item is terminal.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse>;

    async fn create_completion_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream>;
}
