//! Data models and structures
//!
//! Client-facing request/response payloads for the chat and model
//! management endpoints, plus the NDJSON stream events.

use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Speaker of a chat turn.
///
/// Unknown roles are kept verbatim and forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

/// Inline image sent along with a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(default)]
    pub data_base64: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl ImageAttachment {
    pub fn new(data_base64: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            data_base64: data_base64.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_IMAGE_MIME)
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<ImageAttachment>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }
}

/// Sparse generation settings. Unset fields are left to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub top_p: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
}

/// Body accepted by every `/chat` route. The regular and vision routes
/// ignore `model_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model_key: Option<String>,
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub config: Option<GenerationConfig>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatTurn>) -> Self {
        Self {
            model_key: None,
            messages,
            config: None,
        }
    }
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub content: String,
    pub stop_reason: Option<String>,
    pub predicted_tokens: Option<u32>,
}

/// One NDJSON line of a streamed completion.
///
/// A well-formed stream is zero or more fragments followed by exactly one
/// `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Fragment {
        content: String,
    },
    Done {
        model: String,
        predicted_tokens: Option<u32>,
        stop_reason: Option<String>,
    },
}

impl StreamEvent {
    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }

    pub fn to_ndjson(&self) -> crate::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub key: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadModelRequest {
    pub model_key: String,
    #[serde(default)]
    pub exclusive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadModelResponse {
    pub loaded: bool,
    pub model: Option<ModelInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnloadModelRequest {
    #[serde(default)]
    pub model_key: Option<String>,
    #[serde(default)]
    pub unload_all: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnloadModelResponse {
    pub success: bool,
    #[serde(default)]
    pub unloaded_keys: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
