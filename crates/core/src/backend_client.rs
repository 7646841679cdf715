use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use quill_backend::{
    BackendError, ChatBackend, ChatEvent, ChatRequest, ChatResponse,
    DocumentId, Granularity, IngestBackend, SourceProvider,
};
use tracing::Instrument;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type ChatResult = Result<ChatOutcome, Box<dyn BackendError>>;
#[rustfmt::skip]
type ChatHandlerFn = Arc<
    dyn Fn(ChatRequest, Box<dyn Fn(String) + Send + 'static>)
        -> BoxedFuture<ChatResult> + Send + Sync
>;

/// A wrapper around a chat backend that drives the streamed response and
/// provides a type-erased interface for the client actor.
#[derive(Clone)]
pub(crate) struct ChatDispatcher {
    handler_fn: ChatHandlerFn,
}

impl ChatDispatcher {
    #[inline]
    pub fn new<B: ChatBackend + 'static>(backend: B) -> Self {
        // We have to erase the type `B`, since the actor state doesn't
        // have a generic parameter and we don't want it either.
        let handler_fn: ChatHandlerFn = Arc::new(move |req, on_delta| {
            let fut = backend.send_chat(&req);
            Box::pin(
                async move {
                    trace!("got a request: {req:?}");
                    let resp_or_err = fut.await;
                    handle_response::<B>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("chat backend req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a completion request, invoking `on_delta` for every text
    /// delta as it arrives, and returns the assembled outcome.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// deltas when this operation is cancelled.
    #[inline]
    pub async fn send_chat(
        &self,
        req: ChatRequest,
        on_delta: impl Fn(String) + Send + 'static,
    ) -> ChatResult {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

/// A completely assembled streamed response.
#[derive(Clone, Debug)]
pub(crate) struct ChatOutcome {
    /// The full assistant text, concatenated from the deltas.
    pub text: String,
    /// Whether the backend terminated the stream with an explicit done
    /// marker, as opposed to just running out of data.
    pub saw_done: bool,
}

async fn handle_response<B: ChatBackend + 'static>(
    resp_or_err: Result<B::Response, B::Error>,
    on_delta: Box<dyn Fn(String) + Send + 'static>,
) -> ChatResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err}");
            return Err(Box::new(err));
        }
    };

    let mut text = String::new();
    let mut saw_done = false;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ChatEvent::Delta(delta) => {
                text.push_str(&delta);
                on_delta(delta);
            }
            ChatEvent::Completed => {
                saw_done = true;
            }
        }
    }

    trace!("finished a request");

    Ok(ChatOutcome { text, saw_done })
}

type IngestResult = Result<DocumentId, Box<dyn BackendError>>;
#[rustfmt::skip]
type IngestHandlerFn = Arc<
    dyn Fn(String, String) -> BoxedFuture<IngestResult> + Send + Sync
>;

/// Type-erased wrapper around an ingestion backend.
#[derive(Clone)]
pub(crate) struct IngestDispatcher {
    handler_fn: IngestHandlerFn,
}

impl IngestDispatcher {
    #[inline]
    pub fn new<B: IngestBackend + 'static>(backend: B) -> Self {
        let handler_fn: IngestHandlerFn = Arc::new(move |file_name, text| {
            let fut = backend.ingest_text(&file_name, &text);
            Box::pin(
                async move {
                    match fut.await {
                        Ok(doc_id) => Ok(doc_id),
                        Err(err) => {
                            error!("ingestion failed: {err}");
                            Err(Box::new(err) as Box<dyn BackendError>)
                        }
                    }
                }
                .instrument(trace_span!("ingest req")),
            )
        });
        Self { handler_fn }
    }

    #[inline]
    pub async fn ingest_text(
        &self,
        file_name: String,
        text: String,
    ) -> IngestResult {
        (self.handler_fn)(file_name, text).await
    }
}

type ListResult = Result<Vec<String>, Box<dyn BackendError>>;
type FetchResult = Result<String, Box<dyn BackendError>>;
type ListHandlerFn = Arc<dyn Fn() -> BoxedFuture<ListResult> + Send + Sync>;
#[rustfmt::skip]
type FetchHandlerFn = Arc<
    dyn Fn(String, Granularity) -> BoxedFuture<FetchResult> + Send + Sync
>;

/// Type-erased wrapper around a source provider.
#[derive(Clone)]
pub(crate) struct SourceDispatcher {
    list_fn: ListHandlerFn,
    fetch_fn: FetchHandlerFn,
}

impl SourceDispatcher {
    pub fn new<P: SourceProvider + 'static>(provider: P) -> Self {
        let provider = Arc::new(provider);
        let list_fn: ListHandlerFn = {
            let provider = Arc::clone(&provider);
            Arc::new(move || {
                let fut = provider.list_source_names();
                Box::pin(async move {
                    fut.await
                        .map_err(|err| Box::new(err) as Box<dyn BackendError>)
                })
            })
        };
        let fetch_fn: FetchHandlerFn =
            Arc::new(move |name, granularity| {
                let fut = provider.fetch_source_text(&name, granularity);
                Box::pin(async move {
                    fut.await
                        .map_err(|err| Box::new(err) as Box<dyn BackendError>)
                })
            });
        Self { list_fn, fetch_fn }
    }

    #[inline]
    pub async fn list_source_names(&self) -> ListResult {
        (self.list_fn)().await
    }

    #[inline]
    pub async fn fetch_source_text(
        &self,
        name: String,
        granularity: Granularity,
    ) -> FetchResult {
        (self.fetch_fn)(name, granularity).await
    }
}
