//! Process configuration
//!
//! Read once at startup from the environment (and an optional `.env` file).

use crate::resolver::ModelResolver;
use crate::{Error, Result};
use std::time::Duration;

const DEFAULT_OPENAI_BASE_URL: &str = "http://localhost:1234/v1";
const DEFAULT_OPENAI_API_KEY: &str = "lm-studio";
const DEFAULT_LMSTUDIO_HOST: &str = "http://localhost:1234";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_REGULAR_MODEL: &str = "qwen/qwen3-4b-2507";
const DEFAULT_VISION_MODEL: &str = "qwen3-vl-4b-instruct";
const DEFAULT_LLM_TIMEOUT_SECS: f64 = 300.0;

/// Transport timeout budgets for the inference backend.
///
/// `read` bounds the wait for each piece of the response and is the
/// generation timeout; the others only cover getting the request out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub pool: Duration,
}

impl TimeoutPolicy {
    pub fn with_read_timeout(read: Duration) -> Self {
        Self {
            connect: Duration::from_secs(10),
            read,
            write: Duration::from_secs(30),
            pool: Duration::from_secs(10),
        }
    }

    /// Upper bound for dispatching a request: pool checkout, connect,
    /// upload and waiting for the response head.
    pub fn dispatch_budget(&self) -> Duration {
        self.pool + self.connect + self.write + self.read
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::with_read_timeout(Duration::from_secs_f64(DEFAULT_LLM_TIMEOUT_SECS))
    }
}

/// Connection settings for the OpenAI-compatible inference endpoint.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeouts: TimeoutPolicy,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub lmstudio_host: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
    pub default_regular_model: String,
    pub default_vision_model: String,
    pub llm_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, applying defaults for
    /// anything missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("PORT must be a port number ({}): {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let llm_timeout = match lookup("LLM_TIMEOUT") {
            Some(raw) => parse_timeout(&raw)?,
            None => Duration::from_secs_f64(DEFAULT_LLM_TIMEOUT_SECS),
        };

        Ok(Self {
            openai_base_url: var("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            openai_api_key: var("OPENAI_API_KEY", DEFAULT_OPENAI_API_KEY),
            lmstudio_host: var("LMSTUDIO_HOST", DEFAULT_LMSTUDIO_HOST),
            host: var("HOST", DEFAULT_HOST),
            port,
            cors_origins: var("CORS_ORIGINS", "*"),
            default_regular_model: var("DEFAULT_REGULAR_MODEL", DEFAULT_REGULAR_MODEL),
            default_vision_model: var("DEFAULT_VISION_MODEL", DEFAULT_VISION_MODEL),
            llm_timeout,
        })
    }

    /// Allowed cross-origin hosts. `["*"]` means any origin.
    pub fn cors_origin_list(&self) -> Vec<String> {
        if self.cors_origins.trim() == "*" {
            return vec!["*".to_string()];
        }
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn inference_settings(&self) -> InferenceSettings {
        InferenceSettings {
            base_url: self.openai_base_url.trim_end_matches('/').to_string(),
            api_key: self.openai_api_key.clone(),
            timeouts: TimeoutPolicy::with_read_timeout(self.llm_timeout),
        }
    }

    pub fn resolver(&self) -> ModelResolver {
        ModelResolver::new(
            self.default_regular_model.clone(),
            self.default_vision_model.clone(),
        )
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("LLM_TIMEOUT must be seconds ({}): {}", raw, e)))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("LLM_TIMEOUT out of range ({}): {}", raw, e)))
}
