use super::openai::types::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessageContent, ChunkChoice, Delta, MessagePart, ResponseMessage, Usage,
};
use super::{ChunkStream, InferenceService};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scriptable stand-in for the inference backend.
///
/// Without scripting it echoes the last message back, both as a completion
/// and as a single-fragment stream.
#[derive(Clone)]
pub struct MockInferenceClient {
    reported_model: Arc<Mutex<Option<String>>>,
    stream_units: Arc<Mutex<Vec<ChatCompletionChunk>>>,
    stream_failure_after: Arc<Mutex<Option<usize>>>,
    unavailable: Arc<Mutex<bool>>,
    requests: Arc<Mutex<Vec<ChatCompletionRequest>>>,
    call_count: Arc<Mutex<usize>>,
    dropped_streams: Arc<AtomicUsize>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            reported_model: Arc::new(Mutex::new(None)),
            stream_units: Arc::new(Mutex::new(Vec::new())),
            stream_failure_after: Arc::new(Mutex::new(None)),
            unavailable: Arc::new(Mutex::new(false)),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            dropped_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Report this model name instead of the requested one.
    pub fn with_reported_model(self, model: &str) -> Self {
        *self.reported_model.lock().unwrap() = Some(model.to_string());
        self
    }

    pub fn with_stream_unit(self, unit: ChatCompletionChunk) -> Self {
        self.stream_units.lock().unwrap().push(unit);
        self
    }

    /// Break the stream with a transport error after `units` chunks.
    pub fn with_stream_failure_after(self, units: usize) -> Self {
        *self.stream_failure_after.lock().unwrap() = Some(units);
        self
    }

    /// Fail every call as if the backend were down.
    pub fn unavailable(self) -> Self {
        *self.unavailable.lock().unwrap() = true;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of streams handed out that have since been dropped.
    pub fn dropped_streams(&self) -> usize {
        self.dropped_streams.load(Ordering::SeqCst)
    }

    fn record(&self, request: &ChatCompletionRequest) -> Result<()> {
        *self.call_count.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request.clone());

        if *self.unavailable.lock().unwrap() {
            return Err(Error::AiProvider("connection refused".to_string()));
        }
        Ok(())
    }

    fn model_for(&self, request: &ChatCompletionRequest) -> String {
        self.reported_model
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| request.model.clone())
    }
}

impl Default for MockInferenceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream chunk carrying one piece of generated text.
pub fn text_chunk(model: &str, text: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: Some(model.to_string()),
        choices: vec![ChunkChoice {
            delta: Some(Delta {
                content: Some(text.to_string()),
            }),
            finish_reason: None,
        }],
        error: None,
    }
}

/// Stream chunk carrying only a finish reason.
pub fn finish_chunk(model: &str, reason: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        model: Some(model.to_string()),
        choices: vec![ChunkChoice {
            delta: Some(Delta::default()),
            finish_reason: Some(reason.to_string()),
        }],
        error: None,
    }
}

fn echo(request: &ChatCompletionRequest) -> String {
    match request.messages.last().map(|message| &message.content) {
        Some(ChatMessageContent::Text(text)) => text.clone(),
        Some(ChatMessageContent::Parts(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    }
}

struct StreamDropGuard(Arc<AtomicUsize>);

impl Drop for StreamDropGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InferenceService for MockInferenceClient {
    async fn create_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        self.record(request)?;

        Ok(ChatCompletionResponse {
            model: self.model_for(request),
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    content: Some(echo(request)),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(Usage {
                completion_tokens: Some(1),
            }),
        })
    }

    async fn create_completion_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream> {
        self.record(request)?;

        let model = self.model_for(request);
        let mut units = self.stream_units.lock().unwrap().clone();
        if units.is_empty() {
            units = vec![text_chunk(&model, &echo(request)), finish_chunk(&model, "stop")];
        }
        let failure_after = *self.stream_failure_after.lock().unwrap();
        let guard = StreamDropGuard(Arc::clone(&self.dropped_streams));

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for unit in units.into_iter().take(failure_after.unwrap_or(usize::MAX)) {
                yield Ok(unit);
            }
            if failure_after.is_some() {
                yield Err(Error::AiProvider("backend connection dropped".to_string()));
            }
        }))
    }
}
