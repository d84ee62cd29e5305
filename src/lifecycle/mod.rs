//! Model lifecycle management
//!
//! Listing, loading and unloading models on the local runtime. Chat traffic
//! never goes through here.

pub mod lmstudio;
pub mod mock;

pub use lmstudio::LmStudioHost;
pub use mock::MockModelHost;

use crate::models::ModelInfo;
use crate::Result;
use async_trait::async_trait;

/// Every failure is reported as `Error::ModelNotAvailable`.
#[async_trait]
pub trait ModelHost: Send + Sync {
    /// Currently loaded language models.
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Load `model_key`; with `exclusive`, unload everything else first.
    async fn load_model(&self, model_key: &str, exclusive: bool) -> Result<ModelInfo>;

    async fn unload_model(&self, model_key: &str) -> Result<()>;

    /// Unload every loaded model and return the keys that were unloaded.
    async fn unload_all(&self) -> Result<Vec<String>>;
}
