//! Mapping of the client generation config onto backend parameters.

use crate::ai::openai::types::GenerationParams;
use crate::models::GenerationConfig;
use serde_json::Value;

/// Backend parameters for the fields the client actually set.
///
/// Values are forwarded verbatim; range checking is the backend's job.
pub fn map_config(config: Option<&GenerationConfig>) -> GenerationParams {
    let mut params = GenerationParams::new();
    let Some(config) = config else {
        return params;
    };

    insert_float(&mut params, "temperature", config.temperature);
    if let Some(max_tokens) = config.max_tokens {
        params.insert("max_tokens".to_string(), Value::from(max_tokens));
    }
    insert_float(&mut params, "top_p", config.top_p);
    insert_float(&mut params, "presence_penalty", config.presence_penalty);
    insert_float(&mut params, "frequency_penalty", config.frequency_penalty);

    params
}

fn insert_float(params: &mut GenerationParams, name: &str, value: Option<f64>) {
    let Some(value) = value else {
        return;
    };
    match serde_json::Number::from_f64(value) {
        Some(number) => {
            params.insert(name.to_string(), Value::Number(number));
        }
        None => tracing::warn!("Dropping non-finite {} value {}", name, value),
    }
}
