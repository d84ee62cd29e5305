pub mod client;
pub mod sse;
pub mod types;

pub use client::{LazyInferenceClient, OpenAiHttpClient};
pub use types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChatMessageContent, GenerationParams, ImageUrl, MessagePart,
};
