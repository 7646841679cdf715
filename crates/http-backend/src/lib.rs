//! An HTTP backend for retrieval-augmented completion services.
//!
//! The backend speaks the `{API_URL}/v1` wire contract: streamed chat
//! completions framed as `data: `-prefixed JSON fragments, and one-shot
//! text ingestion that yields opaque document identifiers.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use quill_backend::{
    BackendError, ChatBackend, ChatRequest, DocumentId, ErrorKind,
    IngestBackend,
};
use reqwest::{Client, Response, header};

pub use config::{HttpConfig, HttpConfigBuilder};
use io::{Chunks, EventReader};
pub use response::HttpChatResponse;

/// Error type for [`HttpBackend`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl BackendError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// HTTP implementation of the chat and ingestion backends.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    config: Arc<HttpConfig>,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` with the given configuration.
    #[inline]
    pub fn new(config: HttpConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }
}

impl ChatBackend for HttpBackend {
    type Error = Error;
    type Response = HttpChatResponse;

    fn send_chat(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let wire_req = proto::create_request(req);
        let resp_fut = self
            .client
            .post(self.config.chat_completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .json(&wire_req)
            .send();

        async move {
            let resp = match resp_fut.await.and_then(Response::error_for_status)
            {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err}"),
                        ErrorKind::Transport,
                    ));
                }
            };

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_stream_content_type = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    m.subtype().as_str() == "event-stream"
                        || m.subtype().as_str() == "json"
                })
                .unwrap_or(false);
            if !is_stream_content_type {
                warn!("unexpected content type: {content_type:?}");
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let events = EventReader::new(chunks);
            Ok(HttpChatResponse::from_events(events))
        }
    }
}

impl IngestBackend for HttpBackend {
    type Error = Error;

    fn ingest_text(
        &self,
        file_name: &str,
        text: &str,
    ) -> impl Future<Output = Result<DocumentId, Self::Error>> + Send + 'static
    {
        let wire_req = proto::IngestRequest {
            file_name: file_name.to_owned(),
            text: text.to_owned(),
        };
        let resp_fut = self
            .client
            .post(self.config.ingest_text_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .json(&wire_req)
            .send();

        async move {
            let resp = match resp_fut.await.and_then(Response::error_for_status)
            {
                Ok(resp) => resp,
                Err(err) => {
                    return Err(Error::new(
                        format!("{err}"),
                        ErrorKind::Transport,
                    ));
                }
            };

            let ingested = resp
                .json::<proto::IngestResponse>()
                .await
                .map_err(|err| {
                    Error::new(format!("{err}"), ErrorKind::Protocol)
                })?;
            let Some(first) = ingested.data.into_iter().next() else {
                return Err(Error::new(
                    "ingestion returned no documents",
                    ErrorKind::Protocol,
                ));
            };
            Ok(DocumentId(first.doc_id))
        }
    }
}
