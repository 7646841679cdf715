use std::collections::HashMap;
use std::sync::Arc;

use quill_actor::Actor;
use quill_backend::{ChatBackend, IngestBackend, SourceProvider};
use tokio::sync::watch;

use super::ChatClient;
use super::state::{ClientState, RefreshSources};
use crate::backend_client::{
    ChatDispatcher, IngestDispatcher, SourceDispatcher,
};
use crate::registry::DataSourceRegistry;
use crate::snapshot::ClientSnapshot;
use crate::store::ConversationStore;

/// [`ChatClient`] builder.
pub struct ClientBuilder {
    chat: ChatDispatcher,
    ingest: IngestDispatcher,
    sources: SourceDispatcher,
    system_prompt: String,
    initial_sources: Vec<String>,
}

impl ClientBuilder {
    /// Creates a builder from the three backend collaborators: the
    /// streaming completion backend, the ingestion backend, and the
    /// content provider.
    pub fn with_backends<C, I, P>(chat: C, ingest: I, provider: P) -> Self
    where
        C: ChatBackend + 'static,
        I: IngestBackend + 'static,
        P: SourceProvider + 'static,
    {
        Self {
            chat: ChatDispatcher::new(chat),
            ingest: IngestDispatcher::new(ingest),
            sources: SourceDispatcher::new(provider),
            system_prompt: String::new(),
            initial_sources: Vec::new(),
        }
    }

    /// Sets the system prompt every new conversation is seeded with.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Seeds the registry with a placeholder source list, shown until
    /// the startup refresh from the provider replaces it.
    #[inline]
    pub fn with_initial_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initial_sources =
            sources.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the client, spawning its actor and the one-shot source
    /// list refresh.
    pub fn build(self) -> ChatClient {
        let store = ConversationStore::new();
        let registry = DataSourceRegistry::new(self.initial_sources);

        let initial_snapshot = ClientSnapshot {
            conversations: store.snapshot(),
            active: None,
            sources: registry.snapshot_sources(),
            streams: Arc::new(HashMap::new()),
            loading_ingest: false,
            loading_response: false,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial_snapshot);

        let state = ClientState {
            store,
            registry,
            chat: self.chat,
            ingest: self.ingest,
            sources: self.sources.clone(),
            system_prompt: self.system_prompt,
            streams: HashMap::new(),
            next_seq: 1,
            snapshot_tx,
        };
        let handle = Actor::spawn(state, Some("client"));

        {
            let sources = self.sources;
            let handle = handle.clone();
            tokio::spawn(async move {
                match sources.list_source_names().await {
                    Ok(names) => {
                        handle.send(RefreshSources(names)).ok();
                    }
                    Err(err) => {
                        warn!("failed to refresh source names: {err}");
                    }
                }
            });
        }

        ChatClient {
            handle,
            snapshot_rx,
        }
    }
}
