//! Chat orchestration
//!
//! Turns a client [`ChatRequest`] into one backend call and shapes the
//! answer, either as a single [`ChatResponse`] or as a lazy stream of
//! [`StreamEvent`]s.

use crate::ai::openai::types::{ChatCompletionChunk, ChatCompletionRequest};
use crate::ai::InferenceService;
use crate::logging::elapsed_ms;
use crate::models::{ChatRequest, ChatResponse, StreamEvent};
use crate::normalize::build_messages;
use crate::params::map_config;
use crate::resolver::{ModelResolver, ModelRole};
use crate::{Error, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Events of one streamed completion. An `Err` item is terminal and is never
/// followed by a `Done`.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

#[derive(Clone)]
pub struct ChatService {
    inference: Arc<dyn InferenceService>,
    resolver: ModelResolver,
}

impl ChatService {
    pub fn new(inference: Arc<dyn InferenceService>, resolver: ModelResolver) -> Self {
        Self {
            inference,
            resolver,
        }
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Single-shot completion.
    pub async fn respond(&self, role: ModelRole, request: ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let backend_request = self.prepare(role, &request, false);

        tracing::info!(model = %backend_request.model, "Calling inference backend");
        let call_started = Instant::now();
        let response = self.inference.create_completion(&backend_request).await?;
        tracing::info!(
            stage = "backend_call",
            elapsed_ms = elapsed_ms(call_started),
            "Inference backend responded"
        );

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            Error::AiProvider(format!(
                "completion for model {} returned no choices",
                backend_request.model
            ))
        })?;

        let model = if response.model.is_empty() {
            backend_request.model
        } else {
            response.model
        };

        tracing::info!(stage = "total", elapsed_ms = elapsed_ms(started), "Completion finished");

        Ok(ChatResponse {
            model,
            content: choice.message.content.unwrap_or_default(),
            stop_reason: choice.finish_reason,
            predicted_tokens: response.usage.and_then(|usage| usage.completion_tokens),
        })
    }

    /// Streamed completion.
    ///
    /// Returns immediately; the backend is only contacted once the stream is
    /// first polled. Dropping the stream releases the backend connection.
    pub fn stream(&self, role: ModelRole, request: ChatRequest) -> EventStream {
        let started = Instant::now();
        let backend_request = self.prepare(role, &request, true);
        let inference = Arc::clone(&self.inference);

        Box::pin(stream_events(inference, backend_request, started))
    }

    fn prepare(&self, role: ModelRole, request: &ChatRequest, stream: bool) -> ChatCompletionRequest {
        let model = self.resolver.resolve(role, request.model_key.as_deref());
        tracing::debug!(route = role.label(), model = %model, "Resolved model");

        let stage_started = Instant::now();
        let messages = build_messages(&request.messages);
        tracing::info!(stage = "build_messages", elapsed_ms = elapsed_ms(stage_started));

        let stage_started = Instant::now();
        let params = map_config(request.config.as_ref());
        tracing::info!(stage = "map_config", elapsed_ms = elapsed_ms(stage_started));

        ChatCompletionRequest {
            model,
            messages,
            stream,
            params,
        }
    }
}

fn stream_events(
    inference: Arc<dyn InferenceService>,
    backend_request: ChatCompletionRequest,
    started: Instant,
) -> impl Stream<Item = Result<StreamEvent>> + Send + 'static {
    try_stream! {
        tracing::info!(model = %backend_request.model, "Opening inference stream");
        let mut units = inference.create_completion_stream(&backend_request).await?;
        tracing::info!(
            stage = "stream_open",
            elapsed_ms = elapsed_ms(started),
            "Inference stream opened"
        );

        let mut tally = StreamTally::default();
        let mut first_unit = true;
        while let Some(unit) = units.next().await {
            let unit = unit?;
            if first_unit {
                first_unit = false;
                tracing::info!(
                    stage = "first_unit",
                    elapsed_ms = elapsed_ms(started),
                    "Time to first unit"
                );
            }
            if let Some(content) = tally.observe(&unit) {
                yield StreamEvent::Fragment { content };
            }
        }

        tracing::info!(
            stage = "total",
            elapsed_ms = elapsed_ms(started),
            fragments = tally.fragments(),
            "Stream finished"
        );
        yield tally.finish(&backend_request.model);
    }
}

/// Running state of a streamed completion.
#[derive(Debug, Default)]
pub struct StreamTally {
    model: Option<String>,
    fragments: u32,
    stop_reason: Option<String>,
}

impl StreamTally {
    /// Fold one backend unit in; returns the text to forward, if any.
    ///
    /// Units without choices are ignored entirely.
    pub fn observe(&mut self, unit: &ChatCompletionChunk) -> Option<String> {
        let choice = unit.choices.first()?;

        if self.model.is_none() {
            self.model = unit.model.clone().filter(|model| !model.is_empty());
        }
        if let Some(reason) = &choice.finish_reason {
            self.stop_reason = Some(reason.clone());
        }

        let text = unit.delta_text().filter(|text| !text.is_empty())?;
        self.fragments += 1;
        Some(text.to_string())
    }

    pub fn fragments(&self) -> u32 {
        self.fragments
    }

    /// The closing event. `requested` stands in when the backend never
    /// reported a model.
    pub fn finish(self, requested: &str) -> StreamEvent {
        StreamEvent::Done {
            model: self.model.unwrap_or_else(|| requested.to_string()),
            predicted_tokens: (self.fragments > 0).then_some(self.fragments),
            stop_reason: self.stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{finish_chunk, text_chunk};
    use crate::ai::openai::types::{ChatMessageContent, ChunkChoice, Delta};
    use crate::ai::MockInferenceClient;
    use crate::models::{ChatTurn, GenerationConfig, ImageAttachment, Role};
    use pretty_assertions::assert_eq;

    fn service(mock: &MockInferenceClient) -> ChatService {
        ChatService::new(Arc::new(mock.clone()), ModelResolver::new("m1", "v1"))
    }

    fn hi() -> ChatRequest {
        ChatRequest::new(vec![ChatTurn::new(Role::User, "hi")])
    }

    async fn collect(stream: EventStream) -> Vec<Result<StreamEvent>> {
        stream.collect().await
    }

    fn fragment(text: &str) -> StreamEvent {
        StreamEvent::Fragment {
            content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_respond_uses_backend_reported_model() {
        let mock = MockInferenceClient::new().with_reported_model("m1-q4");

        let response = service(&mock).respond(ModelRole::Explicit, hi()).await.unwrap();

        assert_eq!(
            response,
            ChatResponse {
                model: "m1-q4".to_string(),
                content: "hi".to_string(),
                stop_reason: Some("stop".to_string()),
                predicted_tokens: Some(1),
            }
        );
        let sent = &mock.requests()[0];
        assert_eq!(sent.model, "m1");
        assert!(!sent.stream);
    }

    #[tokio::test]
    async fn test_respond_forwards_messages_and_params() {
        let mock = MockInferenceClient::new();
        let mut request = ChatRequest::new(vec![ChatTurn::new(Role::User, "What is in this image?")
            .with_image(ImageAttachment::new("QQ==", Some("image/png")))]);
        request.config = Some(GenerationConfig {
            temperature: Some(0.2),
            ..Default::default()
        });

        service(&mock)
            .respond(ModelRole::Vision, request)
            .await
            .unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.model, "v1");
        assert_eq!(sent.params["temperature"], serde_json::json!(0.2));
        let ChatMessageContent::Parts(parts) = &sent.messages[0].content else {
            panic!("expected multipart content");
        };
        assert_eq!(parts.len(), 2);
    }

    #[tokio::test]
    async fn test_regular_and_vision_ignore_model_key() {
        let mock = MockInferenceClient::new();
        let mut request = hi();
        request.model_key = Some("custom".to_string());
        let chat = service(&mock);

        chat.respond(ModelRole::Regular, request.clone()).await.unwrap();
        chat.respond(ModelRole::Vision, request.clone()).await.unwrap();
        chat.respond(ModelRole::Explicit, request).await.unwrap();

        let models: Vec<String> = mock.requests().into_iter().map(|r| r.model).collect();
        assert_eq!(models, vec!["m1", "v1", "custom"]);
    }

    #[tokio::test]
    async fn test_respond_propagates_backend_failure() {
        let mock = MockInferenceClient::new().unavailable();

        let result = service(&mock).respond(ModelRole::Explicit, hi()).await;

        assert!(matches!(result, Err(Error::AiProvider(_))));
    }

    #[tokio::test]
    async fn test_stream_emits_fragments_then_done() {
        let mock = MockInferenceClient::new()
            .with_stream_unit(text_chunk("m1", "Hel"))
            .with_stream_unit(text_chunk("m1", "lo"))
            .with_stream_unit(text_chunk("m1", "!"))
            .with_stream_unit(finish_chunk("m1", "stop"));

        let events: Vec<StreamEvent> = collect(service(&mock).stream(ModelRole::Explicit, hi()))
            .await
            .into_iter()
            .map(|event| event.unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                fragment("Hel"),
                fragment("lo"),
                fragment("!"),
                StreamEvent::Done {
                    model: "m1".to_string(),
                    predicted_tokens: Some(3),
                    stop_reason: Some("stop".to_string()),
                },
            ]
        );
        assert!(mock.requests()[0].stream);
    }

    #[tokio::test]
    async fn test_stream_without_fragments_reports_no_token_count() {
        let mock = MockInferenceClient::new().with_stream_unit(finish_chunk("m1", "length"));

        let events = collect(service(&mock).stream(ModelRole::Explicit, hi())).await;

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::Done {
                model: "m1".to_string(),
                predicted_tokens: None,
                stop_reason: Some("length".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_stream_falls_back_to_requested_model() {
        let anonymous = ChatCompletionChunk {
            model: None,
            choices: vec![ChunkChoice {
                delta: Some(Delta {
                    content: Some("x".to_string()),
                }),
                finish_reason: None,
            }],
            error: None,
        };
        let mock = MockInferenceClient::new().with_stream_unit(anonymous);

        let events = collect(service(&mock).stream(ModelRole::Vision, hi())).await;

        let Some(Ok(StreamEvent::Done { model, stop_reason, .. })) = events.last() else {
            panic!("expected a done event, got {:?}", events);
        };
        assert_eq!(model, "v1");
        assert_eq!(stop_reason, &None);
    }

    #[tokio::test]
    async fn test_stream_failure_midway_ends_without_done() {
        let mock = MockInferenceClient::new()
            .with_stream_unit(text_chunk("m1", "a"))
            .with_stream_unit(text_chunk("m1", "b"))
            .with_stream_unit(text_chunk("m1", "c"))
            .with_stream_failure_after(2);

        let events = collect(service(&mock).stream(ModelRole::Explicit, hi())).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].as_ref().unwrap(), &fragment("a"));
        assert_eq!(events[1].as_ref().unwrap(), &fragment("b"));
        assert!(events[2].is_err());
    }

    #[tokio::test]
    async fn test_stream_failure_before_first_unit_yields_only_error() {
        let mock = MockInferenceClient::new().unavailable();

        let events = collect(service(&mock).stream(ModelRole::Explicit, hi())).await;

        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_stream_is_lazy_until_polled() {
        let mock = MockInferenceClient::new();

        let stream = service(&mock).stream(ModelRole::Explicit, hi());
        assert_eq!(mock.get_call_count(), 0);

        collect(stream).await;
        assert_eq!(mock.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_backend_stream() {
        let mock = MockInferenceClient::new()
            .with_stream_unit(text_chunk("m1", "a"))
            .with_stream_unit(text_chunk("m1", "b"))
            .with_stream_unit(finish_chunk("m1", "stop"));

        let mut stream = service(&mock).stream(ModelRole::Explicit, hi());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, fragment("a"));
        assert_eq!(mock.dropped_streams(), 0);

        drop(stream);
        assert_eq!(mock.dropped_streams(), 1);
    }

    #[test]
    fn test_tally_ignores_units_without_choices() {
        let mut tally = StreamTally::default();
        let empty = ChatCompletionChunk {
            model: Some("early".to_string()),
            ..Default::default()
        };

        assert_eq!(tally.observe(&empty), None);
        assert_eq!(tally.observe(&text_chunk("m1", "")), None);
        assert_eq!(tally.observe(&text_chunk("m2", "x")), Some("x".to_string()));

        assert_eq!(
            tally.finish("req"),
            StreamEvent::Done {
                model: "m1".to_string(),
                predicted_tokens: Some(1),
                stop_reason: None,
            }
        );
    }
}
