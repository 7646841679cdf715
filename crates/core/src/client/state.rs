use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use quill_actor::{Actor, Message};
use quill_backend::{
    BackendError, ChatMessage, ChatRequest, DocumentId, Granularity,
    Grounding,
};
use tokio::sync::watch;

use crate::backend_client::{
    ChatDispatcher, ChatOutcome, IngestDispatcher, SourceDispatcher,
};
use crate::conversation::ConversationId;
use crate::registry::{DataSourceRegistry, IngestKey};
use crate::snapshot::{ClientSnapshot, StreamState};
use crate::store::ConversationStore;

/// The in-flight stream of one conversation.
///
/// The sequence number identifies the newest request; deliveries tagged
/// with an older number are stale and get dropped.
pub(super) struct StreamSlot {
    seq: u64,
    state: StreamState,
}

/// State exclusively owned by the client actor.
pub(crate) struct ClientState {
    pub(super) store: ConversationStore,
    pub(super) registry: DataSourceRegistry,
    pub(super) chat: ChatDispatcher,
    pub(super) ingest: IngestDispatcher,
    pub(super) sources: SourceDispatcher,
    pub(super) system_prompt: String,
    pub(super) streams: HashMap<ConversationId, StreamSlot>,
    pub(super) next_seq: u64,
    pub(super) snapshot_tx: watch::Sender<ClientSnapshot>,
}

impl ClientState {
    pub(super) fn make_snapshot(&self) -> ClientSnapshot {
        let streams: HashMap<ConversationId, StreamState> = self
            .streams
            .iter()
            .map(|(id, slot)| (*id, slot.state.clone()))
            .collect();
        let loading_response = streams.values().any(|state| {
            matches!(state, StreamState::Awaiting | StreamState::Streaming)
        });
        ClientSnapshot {
            conversations: self.store.snapshot(),
            active: self.store.active_id(),
            sources: self.registry.snapshot_sources(),
            streams: Arc::new(streams),
            loading_ingest: self.registry.is_ingesting(),
            loading_response,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.make_snapshot());
    }

    fn set_data_source(
        &mut self,
        id: ConversationId,
        source: String,
        granularity: Granularity,
        handle: &Actor<Self>,
    ) {
        // A name that is no longer (or not yet) in the registry is a
        // stale selection, not an error.
        if !self.registry.contains(&source) {
            debug!("ignoring selection of unknown source: {source}");
            return;
        }
        if self.store.get(id).is_none() {
            return;
        }

        // The conversation reflects the selection immediately, before
        // ingestion completes.
        self.store.set_data_source(id, source.clone(), granularity);

        let key = IngestKey {
            source,
            granularity,
        };
        if self.registry.begin_ingest(&key) {
            let sources = self.sources.clone();
            let ingest = self.ingest.clone();
            let handle = handle.clone();
            let task_key = key.clone();
            tokio::spawn(async move {
                let result = ingest_source(sources, ingest, &task_key).await;
                handle
                    .send(IngestFinished {
                        key: task_key,
                        result,
                    })
                    .ok();
            });
        }
        self.publish();
    }

    fn send_message(
        &mut self,
        id: ConversationId,
        text: String,
        handle: &Actor<Self>,
    ) {
        if self.store.get(id).is_none() {
            debug!("dropping message for unknown conversation {id}");
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        // The user turn becomes visible right away; the request body is
        // its history up to and including this turn. Appending before
        // building the body is race-free here because only this actor
        // mutates the store.
        self.store.append_message(id, ChatMessage::User(text));
        self.streams.insert(
            id,
            StreamSlot {
                seq,
                state: StreamState::Awaiting,
            },
        );

        let conversation =
            self.store.get(id).expect("conversation was just checked");
        let grounding = conversation
            .data_source()
            .and_then(|source| {
                let key = IngestKey {
                    source: source.to_owned(),
                    granularity: conversation.granularity(),
                };
                self.registry.document_id(&key).cloned()
            })
            .map(|doc_id| Grounding { doc_id });
        let req = ChatRequest {
            messages: conversation.messages().to_vec(),
            grounding,
        };

        let chat = self.chat.clone();
        let delta_handle = handle.clone();
        let finish_handle = handle.clone();
        tokio::spawn(async move {
            let result = chat
                .send_chat(req, move |delta| {
                    delta_handle.send(StreamDelta { id, seq, delta }).ok();
                })
                .await;
            finish_handle.send(StreamFinished { id, seq, result }).ok();
        });
        self.publish();
    }

    /// Returns the stream slot for a delivery, or `None` when the
    /// delivery is stale.
    fn live_slot(
        &mut self,
        id: ConversationId,
        seq: u64,
    ) -> Option<&mut StreamSlot> {
        let slot = self.streams.get_mut(&id)?;
        if slot.seq != seq {
            trace!("dropping stale stream delivery for conversation {id}");
            return None;
        }
        Some(slot)
    }
}

async fn ingest_source(
    sources: SourceDispatcher,
    ingest: IngestDispatcher,
    key: &IngestKey,
) -> Result<DocumentId, Box<dyn BackendError>> {
    let text = sources
        .fetch_source_text(key.source.clone(), key.granularity)
        .await?;
    ingest.ingest_text(key.file_name(), text).await
}

#[derive(Debug)]
pub(super) struct NewConversation;

impl Message<ClientState> for NewConversation {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        let id = state.store.create(&state.system_prompt);
        debug!("created conversation {id}");
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct SelectConversation(pub ConversationId);

impl Message<ClientState> for SelectConversation {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        state.store.select(self.0);
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct RenameConversation {
    pub id: ConversationId,
    pub name: String,
}

impl Message<ClientState> for RenameConversation {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        state.store.rename(self.id, &self.name);
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct RemoveConversation(pub ConversationId);

impl Message<ClientState> for RemoveConversation {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        state.store.remove(self.0);
        // Any in-flight stream for the conversation is orphaned; its
        // remaining deliveries will find no slot and be dropped.
        state.streams.remove(&self.0);
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct ClearConversation(pub ConversationId);

impl Message<ClientState> for ClearConversation {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        state.store.clear(self.0);
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct SetDataSource {
    pub id: ConversationId,
    pub source: String,
    pub granularity: Granularity,
}

impl Message<ClientState> for SetDataSource {
    fn handle(self, state: &mut ClientState, handle: &Actor<ClientState>) {
        state.set_data_source(self.id, self.source, self.granularity, handle);
    }
}

#[derive(Debug)]
pub(super) struct SendMessage {
    pub id: ConversationId,
    pub text: String,
}

impl Message<ClientState> for SendMessage {
    fn handle(self, state: &mut ClientState, handle: &Actor<ClientState>) {
        state.send_message(self.id, self.text, handle);
    }
}

/// The startup refresh of the source-name list, replacing the
/// placeholder set the registry was seeded with.
#[derive(Debug)]
pub(super) struct RefreshSources(pub Vec<String>);

impl Message<ClientState> for RefreshSources {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        state.registry.set_sources(self.0);
        state.publish();
    }
}

pub(super) struct IngestFinished {
    pub key: IngestKey,
    pub result: Result<DocumentId, Box<dyn BackendError>>,
}

impl Debug for IngestFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestFinished")
            .field("key", &self.key)
            .field("result", &self.result)
            .finish()
    }
}

impl Message<ClientState> for IngestFinished {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        match self.result {
            Ok(doc_id) => {
                debug!("ingested {} as {doc_id}", self.key.file_name());
                state.registry.record_document_id(&self.key, doc_id);
            }
            Err(err) => {
                warn!("ingestion of {} failed: {err}", self.key.file_name());
                state.registry.mark_failed(&self.key);
            }
        }
        state.publish();
    }
}

#[derive(Debug)]
pub(super) struct StreamDelta {
    pub id: ConversationId,
    pub seq: u64,
    pub delta: String,
}

impl Message<ClientState> for StreamDelta {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        let Some(slot) = state.live_slot(self.id, self.seq) else {
            return;
        };
        slot.state = StreamState::Streaming;
        state.store.fold_delta(self.id, &self.delta);
        state.publish();
    }
}

pub(super) struct StreamFinished {
    pub id: ConversationId,
    pub seq: u64,
    pub result: Result<ChatOutcome, Box<dyn BackendError>>,
}

impl Debug for StreamFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamFinished")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("result", &self.result)
            .finish()
    }
}

impl Message<ClientState> for StreamFinished {
    fn handle(self, state: &mut ClientState, _handle: &Actor<ClientState>) {
        let Some(slot) = state.live_slot(self.id, self.seq) else {
            return;
        };
        match self.result {
            Ok(outcome) => {
                trace!(
                    "stream for conversation {} assembled {} bytes",
                    self.id,
                    outcome.text.len()
                );
                if !outcome.saw_done {
                    debug!(
                        "stream for conversation {} ended without a done \
                         marker",
                        self.id
                    );
                }
                state.streams.remove(&self.id);
            }
            Err(err) => {
                slot.state = StreamState::Failed(err.to_string());
            }
        }
        state.publish();
    }
}
