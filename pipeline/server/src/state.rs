//! Shared application state injected into every handler.

use std::sync::Arc;

use zyron_core::{ConversationStore, LlmBackend, ProviderSettings, ServerSettings};

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server settings
    pub server: Arc<ServerSettings>,
    /// Provider settings used to build each request
    pub provider: Arc<ProviderSettings>,
    /// Text-generation backend
    pub backend: Arc<dyn LlmBackend>,
    /// Conversation history for authenticated users
    pub store: Arc<dyn ConversationStore>,
}

impl AppState {
    /// Bundle the server's collaborators
    pub fn new(
        server: ServerSettings,
        provider: ProviderSettings,
        backend: Arc<dyn LlmBackend>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            server: Arc::new(server),
            provider: Arc::new(provider),
            backend,
            store,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("server", &self.server)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}
