use std::pin::Pin;
use std::task::{self, Poll};

use crate::service::BackendError;

/// A streamed response from the chat backend.
pub trait ChatResponse: Sized + Send + 'static {
    /// The error type that may be returned by the backend.
    type Error: BackendError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the response has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ChatEvent>, Self::Error>>;
}

/// The event from a streamed chat response.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatEvent {
    /// Received an incremental text delta.
    Delta(String),
    /// The backend signaled the end of the stream explicitly.
    ///
    /// A response that simply runs out of data without this event is
    /// also considered complete; implementations return `None` in both
    /// cases afterwards.
    Completed,
}
