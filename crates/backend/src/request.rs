use crate::DocumentId;

/// A completion request to be sent to the chat backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChatRequest {
    /// The conversation history, including the user turn being answered.
    pub messages: Vec<ChatMessage>,
    /// If set, the completion is grounded with the referenced document.
    pub grounding: Option<Grounding>,
}

/// A complete message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// An assistant text.
    Assistant(String),
}

impl ChatMessage {
    /// Returns the text content of this message.
    #[inline]
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System(content)
            | ChatMessage::User(content)
            | ChatMessage::Assistant(content) => content,
        }
    }
}

/// Grounding context for a completion request.
///
/// When present, the backend restricts retrieval to the referenced
/// ingested document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Grounding {
    /// The document the completion should be grounded with.
    pub doc_id: DocumentId,
}
