use super::ModelHost;
use crate::config::TimeoutPolicy;
use crate::models::ModelInfo;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const MODELS_PATH: &str = "/api/v1/models";
const LOAD_PATH: &str = "/api/v1/models/load";
const UNLOAD_PATH: &str = "/api/v1/models/unload";

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    models: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    key: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    loaded_instances: Vec<LoadedInstance>,
}

impl CatalogEntry {
    fn is_loaded_llm(&self) -> bool {
        self.kind == "llm" && !self.key.is_empty() && !self.loaded_instances.is_empty()
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            key: self.key.clone(),
            display_name: Some(
                self.display_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| self.key.clone()),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoadedInstance {
    id: String,
}

#[derive(Serialize)]
struct LoadBody<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct UnloadBody<'a> {
    instance_id: &'a str,
}

/// LM Studio's native REST API.
pub struct LmStudioHost {
    client: Client,
    base_url: String,
}

impl LmStudioHost {
    pub fn new(base_url: &str, timeouts: TimeoutPolicy) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.dispatch_budget())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("LM Studio error (status {}): {}", status, error_text);
            return Err(Error::ModelNotAvailable(format!(
                "LM Studio error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse LM Studio response: {}\nBody: {}", e, body);
            Error::ModelNotAvailable(format!("unexpected LM Studio response: {}", e))
        })
    }

    async fn catalog(&self) -> Result<Catalog> {
        let url = format!("{}{}", self.base_url, MODELS_PATH);
        self.read(self.client.get(url)).await
    }

    async fn loaded(&self) -> Result<Vec<CatalogEntry>> {
        let catalog = self
            .catalog()
            .await
            .map_err(|e| Error::ModelNotAvailable(format!("Could not connect to LM Studio: {}", e)))?;
        Ok(catalog
            .models
            .into_iter()
            .filter(CatalogEntry::is_loaded_llm)
            .collect())
    }

    async fn unload_instance(&self, instance_id: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, UNLOAD_PATH);
        let _: serde_json::Value = self
            .read(self.client.post(url).json(&UnloadBody { instance_id }))
            .await?;
        Ok(())
    }

    async fn unload_entry(&self, entry: &CatalogEntry) -> Result<()> {
        for instance in &entry.loaded_instances {
            self.unload_instance(&instance.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ModelHost for LmStudioHost {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(self.loaded().await?.iter().map(CatalogEntry::info).collect())
    }

    async fn load_model(&self, model_key: &str, exclusive: bool) -> Result<ModelInfo> {
        let failed = |e: Error| Error::ModelNotAvailable(format!("Failed to load model {}: {}", model_key, e));

        if exclusive {
            self.unload_all().await.map_err(failed)?;
        }

        let url = format!("{}{}", self.base_url, LOAD_PATH);
        let _: serde_json::Value = self
            .read(self.client.post(url).json(&LoadBody { model: model_key }))
            .await
            .map_err(failed)?;
        tracing::info!(model = %model_key, "Model loaded");

        let display_name = match self.catalog().await {
            Ok(catalog) => catalog
                .models
                .into_iter()
                .find(|entry| entry.key == model_key)
                .and_then(|entry| entry.display_name),
            Err(e) => {
                tracing::warn!("Could not look up display name for {}: {}", model_key, e);
                None
            }
        };

        Ok(ModelInfo {
            key: model_key.to_string(),
            display_name: Some(display_name.unwrap_or_else(|| model_key.to_string())),
        })
    }

    async fn unload_model(&self, model_key: &str) -> Result<()> {
        let failed =
            |e: Error| Error::ModelNotAvailable(format!("Failed to unload model {}: {}", model_key, e));

        let entry = self
            .loaded()
            .await
            .map_err(failed)?
            .into_iter()
            .find(|entry| entry.key == model_key)
            .ok_or_else(|| failed(Error::ModelNotAvailable("model is not loaded".to_string())))?;

        self.unload_entry(&entry).await.map_err(failed)?;
        tracing::info!(model = %model_key, "Model unloaded");
        Ok(())
    }

    async fn unload_all(&self) -> Result<Vec<String>> {
        let mut unloaded = Vec::new();
        for entry in self.loaded().await? {
            match self.unload_entry(&entry).await {
                Ok(()) => unloaded.push(entry.key),
                Err(e) => tracing::warn!("Skipping model {} during unload: {}", entry.key, e),
            }
        }
        tracing::info!(count = unloaded.len(), "Unloaded all models");
        Ok(unloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host(server: &MockServer) -> LmStudioHost {
        LmStudioHost::new(&server.uri(), TimeoutPolicy::default()).unwrap()
    }

    fn catalog() -> serde_json::Value {
        json!({
            "models": [
                {
                    "type": "llm",
                    "key": "qwen/qwen3-4b-2507",
                    "display_name": "Qwen3 4B",
                    "loaded_instances": [{ "id": "qwen/qwen3-4b-2507" }]
                },
                {
                    "type": "llm",
                    "key": "qwen3-vl-4b-instruct",
                    "display_name": null,
                    "loaded_instances": [{ "id": "vl-a" }, { "id": "vl-b" }]
                },
                {
                    "type": "llm",
                    "key": "idle-model",
                    "loaded_instances": []
                },
                {
                    "type": "embedding",
                    "key": "nomic-embed",
                    "loaded_instances": [{ "id": "nomic-embed" }]
                }
            ]
        })
    }

    async fn mount_catalog(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(MODELS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog()))
            .mount(server)
            .await;
    }

    async fn mount_unload_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(UNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "instance_id": "x" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_list_models_returns_loaded_llms_only() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let models = host(&server).list_models().await.unwrap();

        assert_eq!(
            models,
            vec![
                ModelInfo {
                    key: "qwen/qwen3-4b-2507".to_string(),
                    display_name: Some("Qwen3 4B".to_string()),
                },
                ModelInfo {
                    key: "qwen3-vl-4b-instruct".to_string(),
                    display_name: Some("qwen3-vl-4b-instruct".to_string()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_models_unreachable_is_model_not_available() {
        let host = LmStudioHost::new("http://127.0.0.1:1", TimeoutPolicy::default()).unwrap();

        let result = host.list_models().await;

        match result {
            Err(Error::ModelNotAvailable(msg)) => assert!(msg.contains("Could not connect")),
            other => panic!("expected ModelNotAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_model_posts_key_and_reports_display_name() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("POST"))
            .and(path(LOAD_PATH))
            .and(body_json(json!({ "model": "qwen/qwen3-4b-2507" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "llm",
                "instance_id": "qwen/qwen3-4b-2507",
                "status": "loaded"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = host(&server)
            .load_model("qwen/qwen3-4b-2507", false)
            .await
            .unwrap();

        assert_eq!(info.display_name.as_deref(), Some("Qwen3 4B"));
    }

    #[tokio::test]
    async fn test_exclusive_load_unloads_every_instance_first() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("POST"))
            .and(path(UNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "instance_id": "x" })))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(LOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "loaded" })))
            .expect(1)
            .mount(&server)
            .await;

        let info = host(&server).load_model("new-model", true).await.unwrap();

        assert_eq!(info.key, "new-model");
        assert_eq!(info.display_name.as_deref(), Some("new-model"));
    }

    #[tokio::test]
    async fn test_load_failure_carries_model_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOAD_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let result = host(&server).load_model("missing", false).await;

        match result {
            Err(Error::ModelNotAvailable(msg)) => {
                assert!(msg.contains("Failed to load model missing"));
                assert!(msg.contains("model not found"));
            }
            other => panic!("expected ModelNotAvailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unload_model_unloads_its_instances() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("POST"))
            .and(path(UNLOAD_PATH))
            .and(body_json(json!({ "instance_id": "vl-a" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "instance_id": "vl-a" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(UNLOAD_PATH))
            .and(body_json(json!({ "instance_id": "vl-b" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "instance_id": "vl-b" })))
            .expect(1)
            .mount(&server)
            .await;

        host(&server)
            .unload_model("qwen3-vl-4b-instruct")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unload_model_not_loaded_fails() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;

        let result = host(&server).unload_model("idle-model").await;

        assert!(matches!(result, Err(Error::ModelNotAvailable(_))));
    }

    #[tokio::test]
    async fn test_unload_all_skips_failures() {
        let server = MockServer::start().await;
        mount_catalog(&server).await;
        Mock::given(method("POST"))
            .and(path(UNLOAD_PATH))
            .and(body_json(json!({ "instance_id": "vl-a" })))
            .respond_with(ResponseTemplate::new(500).set_body_string("busy"))
            .mount(&server)
            .await;
        mount_unload_ok(&server).await;

        let unloaded = host(&server).unload_all().await.unwrap();

        assert_eq!(unloaded, vec!["qwen/qwen3-4b-2507".to_string()]);
    }
}
