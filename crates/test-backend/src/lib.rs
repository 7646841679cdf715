//! Local fake backends for testing purpose.
//!
//! The fakes cover all three collaborators of the client core: a
//! scripted completion backend, a recording ingestion backend, and a
//! static source provider. None of them touch the network, and all of
//! them record enough about the requests they receive to write
//! assertions against.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready as poll_ready};
use std::time::Duration;

use quill_backend::{
    BackendError, ChatBackend, ChatEvent, ChatRequest, ChatResponse,
    DocumentId, ErrorKind, Granularity, IngestBackend, SourceProvider,
};
use tokio::time::{Sleep, sleep};

pub use preset::PresetResponse;

/// Error type for the fake backends.
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
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

/// A scripted completion backend.
///
/// Queue preset responses before sending requests; each request pops the
/// next preset off the script. Requests beyond the end of the script
/// fail. Every received request body is recorded and can be inspected
/// afterwards.
#[derive(Clone, Default)]
pub struct ScriptedChatBackend {
    script: Arc<Mutex<Vec<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedChatBackend {
    /// Appends a preset response to the script.
    #[inline]
    pub fn push_response(&self, preset: PresetResponse) {
        self.script.lock().unwrap().push(preset);
    }

    /// Sets the delay between streamed deltas.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the request bodies received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatBackend for ScriptedChatBackend {
    type Error = Error;
    type Response = ScriptedChatResponse;

    fn send_chat(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        self.requests.lock().unwrap().push(req.clone());

        let mut script = self.script.lock().unwrap();
        let result = if script.is_empty() {
            Err(Error {
                message: "no more scripted responses",
                kind: ErrorKind::Transport,
            })
        } else {
            let preset = script.remove(0);
            if preset.fail {
                Err(Error {
                    message: "scripted transport failure",
                    kind: ErrorKind::Transport,
                })
            } else {
                Ok(ScriptedChatResponse {
                    deltas: preset.deltas,
                    event_idx: 0,
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                })
            }
        };
        ready(result)
    }
}

/// The streamed response produced by [`ScriptedChatBackend`].
pub struct ScriptedChatResponse {
    deltas: Vec<String>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ChatResponse for ScriptedChatResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            poll_ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let event_idx = this.event_idx;
            this.event_idx += 1;
            return Poll::Ready(Ok(match event_idx {
                idx if idx < this.deltas.len() => {
                    Some(ChatEvent::Delta(this.deltas[idx].clone()))
                }
                idx if idx == this.deltas.len() => Some(ChatEvent::Completed),
                // In case this method is called after completion.
                _ => None,
            }));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A recording ingestion backend.
///
/// Records every `(file_name, text)` pair it receives and hands out
/// sequential document identifiers. Failures can be queued up front to
/// exercise the failed-ingestion path.
#[derive(Clone, Default)]
pub struct RecordingIngestBackend {
    inner: Arc<Mutex<RecordingIngestInner>>,
}

#[derive(Default)]
struct RecordingIngestInner {
    calls: Vec<(String, String)>,
    pending_failures: u64,
}

impl RecordingIngestBackend {
    /// Makes the next `count` ingestion requests fail.
    #[inline]
    pub fn fail_next(&self, count: u64) {
        self.inner.lock().unwrap().pending_failures = count;
    }

    /// Returns the `(file_name, text)` pairs received so far.
    ///
    /// Failed requests are recorded too.
    #[inline]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl IngestBackend for RecordingIngestBackend {
    type Error = Error;

    fn ingest_text(
        &self,
        file_name: &str,
        text: &str,
    ) -> impl Future<Output = Result<DocumentId, Self::Error>> + Send + 'static
    {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((file_name.to_owned(), text.to_owned()));
        let result = if inner.pending_failures > 0 {
            inner.pending_failures -= 1;
            Err(Error {
                message: "scripted ingestion failure",
                kind: ErrorKind::Transport,
            })
        } else {
            Ok(DocumentId(format!("doc:{}", inner.calls.len())))
        };
        ready(result)
    }
}

/// A source provider backed by an in-memory map.
#[derive(Clone, Default)]
pub struct StaticSourceProvider {
    texts: Arc<Mutex<HashMap<(String, Granularity), String>>>,
}

impl StaticSourceProvider {
    /// Creates a provider with the given source names, generating
    /// placeholder text for both granularities of each source.
    pub fn with_source_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::default();
        for name in names {
            let name = name.into();
            for granularity in [Granularity::Summary, Granularity::Full] {
                provider.insert(
                    &name,
                    granularity,
                    format!("{granularity} of {name}"),
                );
            }
        }
        provider
    }

    /// Sets the text of a source at the given granularity.
    #[inline]
    pub fn insert(
        &self,
        name: &str,
        granularity: Granularity,
        text: impl Into<String>,
    ) {
        self.texts
            .lock()
            .unwrap()
            .insert((name.to_owned(), granularity), text.into());
    }
}

impl SourceProvider for StaticSourceProvider {
    type Error = Error;

    fn list_source_names(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'static
    {
        let mut names: Vec<String> = self
            .texts
            .lock()
            .unwrap()
            .keys()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names.dedup();
        ready(Ok(names))
    }

    fn fetch_source_text(
        &self,
        name: &str,
        granularity: Granularity,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        let text = self
            .texts
            .lock()
            .unwrap()
            .get(&(name.to_owned(), granularity))
            .cloned();
        ready(text.ok_or(Error {
            message: "unknown source",
            kind: ErrorKind::Other,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use quill_backend::ChatMessage;

    use super::*;

    async fn collect(resp: ScriptedChatResponse) -> String {
        let mut resp = pin!(resp);
        let mut text = String::new();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap();
            match event {
                Some(ChatEvent::Delta(delta)) => text.push_str(&delta),
                Some(ChatEvent::Completed) => {}
                None => break,
            }
        }
        text
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let backend = ScriptedChatBackend::default();
        backend.push_response(PresetResponse::with_deltas(["Hello, ", "world!"]));

        let req = ChatRequest {
            messages: vec![ChatMessage::User("Hi".to_owned())],
            grounding: None,
        };
        let resp = backend.send_chat(&req).await.unwrap();
        assert_eq!(collect(resp).await, "Hello, world!");
        assert_eq!(backend.requests().len(), 1);

        // The script is exhausted now.
        assert!(backend.send_chat(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_recording_ingest() {
        let backend = RecordingIngestBackend::default();
        backend.fail_next(1);
        assert!(backend.ingest_text("a.txt", "text").await.is_err());

        let doc = backend.ingest_text("b.txt", "more text").await.unwrap();
        assert_eq!(doc, DocumentId("doc:2".to_owned()));
        assert_eq!(
            backend.calls(),
            vec![
                ("a.txt".to_owned(), "text".to_owned()),
                ("b.txt".to_owned(), "more text".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_static_sources() {
        let provider =
            StaticSourceProvider::with_source_names(["Sales", "Costs"]);
        let names = provider.list_source_names().await.unwrap();
        assert_eq!(names, vec!["Costs".to_owned(), "Sales".to_owned()]);

        let text = provider
            .fetch_source_text("Sales", Granularity::Full)
            .await
            .unwrap();
        assert_eq!(text, "full of Sales");
        assert!(
            provider
                .fetch_source_text("Margin", Granularity::Full)
                .await
                .is_err()
        );
    }
}
