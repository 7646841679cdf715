mod builder;
mod state;
#[cfg(test)]
mod tests;

use quill_actor::Actor;
use quill_backend::Granularity;
use tokio::sync::watch;

use crate::conversation::ConversationId;
use crate::snapshot::ClientSnapshot;
pub use builder::ClientBuilder;
use state::{
    ClearConversation, ClientState, NewConversation, RemoveConversation,
    RenameConversation, SelectConversation, SendMessage, SetDataSource,
};

/// The chat client: a handle to the actor that owns all conversation and
/// data source state.
///
/// Every method is a fire-and-forget intent; the resulting state changes
/// arrive through the snapshot channel returned by [`Self::subscribe`].
/// Intents targeting ids that no longer exist are silently dropped, so
/// a rendering layer can race removals without special casing.
pub struct ChatClient {
    handle: Actor<ClientState>,
    snapshot_rx: watch::Receiver<ClientSnapshot>,
}

impl ChatClient {
    /// Creates a new conversation seeded with the system prompt and
    /// makes it active.
    pub fn new_conversation(&self) {
        self.send(NewConversation);
    }

    /// Makes the given conversation active; unknown ids are ignored.
    pub fn select_conversation(&self, id: ConversationId) {
        self.send(SelectConversation(id));
    }

    /// Renames a conversation; empty names and unknown ids are ignored.
    pub fn rename_conversation<S: Into<String>>(
        &self,
        id: ConversationId,
        name: S,
    ) {
        self.send(RenameConversation {
            id,
            name: name.into(),
        });
    }

    /// Removes a conversation.
    ///
    /// The active pointer is not reassigned; if the active conversation
    /// is removed, [`ClientSnapshot::active_conversation`] resolves to
    /// `None` until another conversation is selected.
    pub fn remove_conversation(&self, id: ConversationId) {
        self.send(RemoveConversation(id));
    }

    /// Empties a conversation's message history, system seed included.
    pub fn clear_conversation(&self, id: ConversationId) {
        self.send(ClearConversation(id));
    }

    /// Attaches a data source to a conversation and, if that
    /// (source, granularity) pair has not been ingested yet, kicks off
    /// its ingestion. Unknown source names are ignored.
    pub fn set_data_source<S: Into<String>>(
        &self,
        id: ConversationId,
        source: S,
        granularity: Granularity,
    ) {
        self.send(SetDataSource {
            id,
            source: source.into(),
            granularity,
        });
    }

    /// Sends a user turn on a conversation and starts streaming the
    /// response into it.
    ///
    /// A second send while a previous stream is still open supersedes
    /// it: late deltas from the superseded stream are dropped rather
    /// than interleaved.
    pub fn send_message<S: Into<String>>(&self, id: ConversationId, text: S) {
        self.send(SendMessage {
            id,
            text: text.into(),
        });
    }

    /// Returns a receiver of client state snapshots.
    ///
    /// A fresh snapshot is published after every handled intent and
    /// every arriving stream fragment.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Returns the latest snapshot.
    #[inline]
    pub fn snapshot(&self) -> ClientSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    #[inline]
    fn send<M: quill_actor::Message<ClientState> + 'static>(&self, msg: M) {
        self.handle
            .send(msg)
            .expect("client task has been dropped too early");
    }
}

impl Clone for ChatClient {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            snapshot_rx: self.snapshot_rx.clone(),
        }
    }
}
