use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use quill_backend::{ChatEvent, ChatResponse, ErrorKind};

use crate::Error;
use crate::io::{EventError, EventReader};
use crate::proto;

/// The literal fragment that explicitly terminates a stream.
const DONE_MARKER: &str = "[DONE]";

struct PartialState {
    events: EventReader,
    saw_done: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ChatEvent>, PartialState), Error>;

pin_project! {
    /// A streamed completion response over the `data: `-framed wire
    /// protocol.
    pub struct HttpChatResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl HttpChatResponse {
    #[inline]
    pub(crate) fn from_events(events: EventReader) -> Self {
        let partial_state = PartialState {
            events,
            saw_done: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ChatResponse for HttpChatResponse {
    type Error = Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            // The stream has been exhausted.
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future
        // for the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ChatEvent>, PartialState), Error> {
    if partial_state.saw_done {
        return Ok((None, partial_state));
    }

    loop {
        let fragment = match partial_state.events.next_fragment().await {
            Ok(Some(fragment)) => fragment,
            // Running out of data without a `[DONE]` marker is an
            // alternate success path, the stream just ends.
            Ok(None) => return Ok((None, partial_state)),
            Err(EventError::ChunksError(err)) => {
                return Err(Error::new(err.message(), ErrorKind::Transport));
            }
            Err(EventError::InvalidUtf8) => {
                return Err(Error::new(
                    "response body is not valid UTF-8",
                    ErrorKind::Protocol,
                ));
            }
        };
        trace!("got stream fragment: {fragment}");

        if fragment == DONE_MARKER {
            partial_state.saw_done = true;
            return Ok((Some(ChatEvent::Completed), partial_state));
        }

        match proto::delta_content(&fragment) {
            Ok(delta) => {
                return Ok((Some(ChatEvent::Delta(delta)), partial_state));
            }
            Err(err) => {
                // A fragment that the decoder cannot handle is dropped on
                // its own, the rest of the stream is still usable.
                warn!("skipping malformed fragment: {err:?}");
            }
        }
    }
}
