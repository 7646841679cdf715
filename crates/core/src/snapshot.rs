use std::collections::HashMap;
use std::sync::Arc;

use crate::conversation::{Conversation, ConversationId};

/// The state of a conversation's in-flight completion stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StreamState {
    /// No stream is in flight.
    #[default]
    Idle,
    /// A request has been issued; no delta has arrived yet.
    Awaiting,
    /// Deltas are being folded into the trailing assistant message.
    Streaming,
    /// The last request failed with the given message. Sending another
    /// message to the conversation retries from scratch.
    Failed(String),
}

/// An immutable view of the client state.
///
/// A snapshot is published after every handled mutation; a reader always
/// holds either the pre- or the post-mutation state and can render from
/// it without racing the client actor.
#[derive(Clone, Debug)]
pub struct ClientSnapshot {
    pub(crate) conversations: Arc<[Conversation]>,
    pub(crate) active: Option<ConversationId>,
    pub(crate) sources: Arc<[String]>,
    pub(crate) streams: Arc<HashMap<ConversationId, StreamState>>,
    pub(crate) loading_ingest: bool,
    pub(crate) loading_response: bool,
}

impl ClientSnapshot {
    /// Returns the conversations, ordered by creation.
    #[inline]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Returns the active conversation id.
    ///
    /// The pointer may be stale after the active conversation has been
    /// removed; [`Self::active_conversation`] resolves it safely.
    #[inline]
    pub fn active_id(&self) -> Option<ConversationId> {
        self.active
    }

    /// Resolves the active conversation, or `None` when no conversation
    /// is active or the pointer is stale.
    pub fn active_conversation(&self) -> Option<&Conversation> {
        let active = self.active?;
        self.conversations.iter().find(|c| c.id == active)
    }

    /// Looks up a conversation by id.
    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Returns the known data source names.
    #[inline]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Returns the stream state of a conversation.
    pub fn stream_state(&self, id: ConversationId) -> StreamState {
        self.streams.get(&id).cloned().unwrap_or_default()
    }

    /// Whether a data source ingestion is in flight.
    #[inline]
    pub fn loading_ingest(&self) -> bool {
        self.loading_ingest
    }

    /// Whether any conversation is waiting on or receiving a response.
    #[inline]
    pub fn loading_response(&self) -> bool {
        self.loading_response
    }

    /// The combined loading indicator the rendering layer keys input
    /// disabling off of.
    #[inline]
    pub fn loading(&self) -> bool {
        self.loading_ingest || self.loading_response
    }
}
