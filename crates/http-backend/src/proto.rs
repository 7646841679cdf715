use quill_backend::{ChatMessage, ChatRequest};
use serde::{Deserialize, Serialize};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Choice {
    pub delta: Delta,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IngestResponse {
    pub data: Vec<IngestedDocument>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IngestedDocument {
    pub doc_id: String,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextFilter {
    pub docs_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_context: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_filter: Option<ContextFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_sources: Option<bool>,
    pub stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestRequest {
    pub file_name: String,
    pub text: String,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ChatRequest) -> ChatCompletionRequest {
    let (use_context, context_filter, include_sources) = match &req.grounding {
        Some(grounding) => (
            Some(true),
            Some(ContextFilter {
                docs_ids: vec![grounding.doc_id.0.clone()],
            }),
            Some(false),
        ),
        None => (None, None, None),
    };
    ChatCompletionRequest {
        messages: req.messages.iter().map(create_message).collect(),
        use_context,
        context_filter,
        include_sources,
        stream: true,
    }
}

#[inline]
fn create_message(msg: &ChatMessage) -> Message {
    match msg {
        ChatMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ChatMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ChatMessage::Assistant(content) => Message::Assistant {
            content: content.clone(),
        },
    }
}

/// The reason a fragment could not be turned into a text delta.
#[derive(Debug)]
pub enum DecodeError {
    /// The fragment was not a valid JSON envelope.
    Json(serde_json::Error),
    /// The envelope carried no `choices[0].delta.content` path.
    MissingContent,
}

/// Extracts the incremental text delta from one stream fragment.
///
/// The fixed `choices[0].delta.content` path lives behind this helper so
/// the fold logic never touches the wire schema directly.
pub fn delta_content(fragment: &str) -> Result<String, DecodeError> {
    let mut chunk = serde_json::from_str::<ChatCompletionChunk>(fragment)
        .map_err(DecodeError::Json)?;
    if chunk.choices.is_empty() {
        return Err(DecodeError::MissingContent);
    }
    chunk.choices.swap_remove(0).delta.content.ok_or(DecodeError::MissingContent)
}
