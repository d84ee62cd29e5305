//! Choice of the model identifier for a chat request.

/// Which family of endpoint a request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Client may name a model; falls back to the regular default.
    Explicit,
    /// Text-only tasks; always the regular default.
    Regular,
    /// Multi-modal tasks; always the vision default.
    Vision,
}

impl ModelRole {
    pub fn label(&self) -> &'static str {
        match self {
            ModelRole::Explicit => "chat",
            ModelRole::Regular => "regular",
            ModelRole::Vision => "vision",
        }
    }
}

/// Resolves requests to the configured default models.
///
/// No validation happens here; an unknown model surfaces as a backend error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResolver {
    regular_default: String,
    vision_default: String,
}

impl ModelResolver {
    pub fn new(regular_default: impl Into<String>, vision_default: impl Into<String>) -> Self {
        Self {
            regular_default: regular_default.into(),
            vision_default: vision_default.into(),
        }
    }

    pub fn regular_default(&self) -> &str {
        &self.regular_default
    }

    pub fn vision_default(&self) -> &str {
        &self.vision_default
    }

    pub fn resolve(&self, role: ModelRole, model_key: Option<&str>) -> String {
        match role {
            ModelRole::Explicit => model_key
                .filter(|key| !key.is_empty())
                .unwrap_or(&self.regular_default)
                .to_string(),
            ModelRole::Regular => self.regular_default.clone(),
            ModelRole::Vision => self.vision_default.clone(),
        }
    }
}
