use super::ModelHost;
use crate::models::ModelInfo;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// In-memory model host for tests.
#[derive(Clone, Default)]
pub struct MockModelHost {
    loaded: Arc<Mutex<Vec<String>>>,
    unavailable: Arc<Mutex<bool>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockModelHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaded(self, model_key: &str) -> Self {
        self.loaded.lock().unwrap().push(model_key.to_string());
        self
    }

    /// Fail every call as if the runtime were unreachable.
    pub fn unavailable(self) -> Self {
        *self.unavailable.lock().unwrap() = true;
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    fn record(&self) -> Result<()> {
        *self.call_count.lock().unwrap() += 1;
        if *self.unavailable.lock().unwrap() {
            return Err(Error::ModelNotAvailable(
                "Could not connect to LM Studio: connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

fn info(key: &str) -> ModelInfo {
    ModelInfo {
        key: key.to_string(),
        display_name: Some(key.to_string()),
    }
}

#[async_trait]
impl ModelHost for MockModelHost {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.record()?;
        Ok(self.loaded.lock().unwrap().iter().map(|key| info(key)).collect())
    }

    async fn load_model(&self, model_key: &str, exclusive: bool) -> Result<ModelInfo> {
        self.record()?;
        let mut loaded = self.loaded.lock().unwrap();
        if exclusive {
            loaded.clear();
        }
        if !loaded.iter().any(|key| key == model_key) {
            loaded.push(model_key.to_string());
        }
        Ok(info(model_key))
    }

    async fn unload_model(&self, model_key: &str) -> Result<()> {
        self.record()?;
        let mut loaded = self.loaded.lock().unwrap();
        let before = loaded.len();
        loaded.retain(|key| key != model_key);
        if loaded.len() == before {
            return Err(Error::ModelNotAvailable(format!(
                "Failed to unload model {}: model is not loaded",
                model_key
            )));
        }
        Ok(())
    }

    async fn unload_all(&self) -> Result<Vec<String>> {
        self.record()?;
        Ok(self.loaded.lock().unwrap().drain(..).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exclusive_load_replaces_loaded_models() {
        let host = MockModelHost::new().with_loaded("a").with_loaded("b");

        host.load_model("c", true).await.unwrap();

        assert_eq!(host.loaded(), vec!["c".to_string()]);
        assert_eq!(host.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_unload_unknown_model_fails() {
        let host = MockModelHost::new().with_loaded("a");

        assert!(host.unload_model("z").await.is_err());
        assert_eq!(host.unload_all().await.unwrap(), vec!["a".to_string()]);
        assert!(host.loaded().is_empty());
    }
}
