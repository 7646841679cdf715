use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::request::ChatRequest;
use crate::response::ChatResponse;

/// The error type for a backend service.
pub trait BackendError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// An opaque identifier for a document in the backing retrieval index.
///
/// Returned by the ingestion service and passed back verbatim when a
/// completion should be grounded with that document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A type that can answer completion requests with a streamed response.
///
/// Once the backend is created, it should behave like a stateless object.
/// It can still have internal state, but callers should not rely on it,
/// and the backend should be prepared for being dropped anytime.
pub trait ChatBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// The response type for this backend.
    type Response: ChatResponse<Error = Self::Error>;

    /// Sends a completion request.
    fn send_chat(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}

/// A type that can submit raw text to the backing retrieval index.
pub trait IngestBackend: Send + Sync {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// Submits `text` under the given file name, yielding the document
    /// identifier assigned by the index.
    fn ingest_text(
        &self,
        file_name: &str,
        text: &str,
    ) -> impl Future<Output = Result<DocumentId, Self::Error>> + Send + 'static;
}
