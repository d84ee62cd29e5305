use crate::chat::ChatService;
use crate::config::Config;
use crate::lifecycle::ModelHost;
use std::sync::Arc;

/// Shared handler state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub models: Arc<dyn ModelHost>,
    pub config: Arc<Config>,
}
