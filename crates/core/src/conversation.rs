//! Conversation-related types.

use std::fmt::{self, Display, Formatter};

use quill_backend::{ChatMessage, Granularity};

/// Identifier of a conversation.
///
/// Identifiers are assigned monotonically and are never reused within a
/// process, even after conversations have been removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub u64);

impl Display for ConversationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A named conversation with an optional data source attachment.
#[derive(Clone, Debug)]
pub struct Conversation {
    pub(crate) id: ConversationId,
    pub(crate) name: String,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) data_source: Option<String>,
    pub(crate) granularity: Granularity,
}

impl Conversation {
    /// Returns the identifier of this conversation.
    #[inline]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Returns the display name of this conversation.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ordered message history.
    ///
    /// Only the trailing message may ever change in place, and only
    /// while it is an assistant message being extended by an in-flight
    /// stream.
    #[inline]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Returns the name of the attached data source, if any.
    ///
    /// The name is a reference into the data source registry, which
    /// remains the single source of truth for ingestion state.
    #[inline]
    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    /// Returns the granularity the attached data source is ingested at.
    #[inline]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}
