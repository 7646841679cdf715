use std::sync::Arc;

use quill_backend::{ChatMessage, Granularity};

use crate::conversation::{Conversation, ConversationId};

/// The ordered collection of conversations and the active pointer.
///
/// The store is plain data owned by the client actor; all mutation goes
/// through the actor, which publishes an immutable snapshot after each
/// one. Lookups are linear, which is fine for the tens of conversations
/// a chat client realistically holds.
pub(crate) struct ConversationStore {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
    next_id: u64,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    /// Creates a new conversation seeded with the system prompt, makes
    /// it active, and returns its id.
    ///
    /// Ids come from a monotonic counter rather than `max + 1`, so an id
    /// freed by removing the newest conversation is still never handed
    /// out again.
    pub fn create(&mut self, system_prompt: &str) -> ConversationId {
        let id = ConversationId(self.next_id);
        self.next_id += 1;
        self.conversations.push(Conversation {
            id,
            name: format!("Conversation {id}"),
            messages: vec![ChatMessage::System(system_prompt.to_owned())],
            data_source: None,
            granularity: Granularity::default(),
        });
        self.active = Some(id);
        id
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn active_id(&self) -> Option<ConversationId> {
        self.active
    }

    /// Sets the active pointer; unknown ids are silently ignored.
    pub fn select(&mut self, id: ConversationId) {
        if self.get(id).is_some() {
            self.active = Some(id);
        }
    }

    /// Renames a conversation; empty names and unknown ids are ignored.
    pub fn rename(&mut self, id: ConversationId, new_name: &str) {
        if new_name.is_empty() {
            return;
        }
        if let Some(conversation) = self.get_mut(id) {
            conversation.name = new_name.to_owned();
        }
    }

    /// Removes a conversation.
    ///
    /// The active pointer is deliberately left untouched: removing the
    /// active conversation leaves it stale, and [`Self::get`] on the
    /// stale id resolves to `None` until the caller selects another
    /// conversation.
    pub fn remove(&mut self, id: ConversationId) {
        self.conversations.retain(|c| c.id != id);
    }

    /// Empties the message history, system seed included.
    pub fn clear(&mut self, id: ConversationId) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.messages.clear();
        }
    }

    pub fn append_message(&mut self, id: ConversationId, msg: ChatMessage) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.messages.push(msg);
        }
    }

    pub fn set_data_source(
        &mut self,
        id: ConversationId,
        source: String,
        granularity: Granularity,
    ) {
        if let Some(conversation) = self.get_mut(id) {
            conversation.data_source = Some(source);
            conversation.granularity = granularity;
        }
    }

    /// Folds an incremental delta into the trailing assistant message,
    /// creating it if the history doesn't end with one.
    ///
    /// This guarantees the assembled answer to a single user turn is
    /// exactly one assistant message, no matter how many fragments the
    /// transport delivered it in.
    pub fn fold_delta(&mut self, id: ConversationId, delta: &str) {
        let Some(conversation) = self.get_mut(id) else {
            return;
        };
        match conversation.messages.last_mut() {
            Some(ChatMessage::Assistant(content)) => content.push_str(delta),
            _ => conversation
                .messages
                .push(ChatMessage::Assistant(delta.to_owned())),
        }
    }

    /// Clones the current list into an immutable snapshot.
    pub fn snapshot(&self) -> Arc<[Conversation]> {
        self.conversations.as_slice().into()
    }
}
