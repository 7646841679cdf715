use std::sync::{Arc, Weak};

use tracing::Instrument;

use crate::mailbox::{Mailbox, MessageReceiver};
use crate::{ActorDeadError, Message};

/// Handle to an actor.
///
/// Handles are cheap to clone. The actor task terminates once every
/// handle has been dropped, including the clones held by in-flight
/// tasks; messages still queued at that point are discarded.
pub struct Actor<S> {
    mailbox: Arc<Mailbox<S>>,
}

impl<S: Send + Sync + 'static> Actor<S> {
    /// Spawns a new actor with the given state and an optional label for
    /// tracing spans.
    pub fn spawn(state: S, label: Option<&str>) -> Self {
        let (mailbox, msg_rx) = Mailbox::new();
        let mailbox = Arc::new(mailbox);
        tokio::spawn(
            run_actor(Arc::downgrade(&mailbox), state, msg_rx)
                .instrument(trace_span!("actor", label = label)),
        );
        Self { mailbox }
    }

    /// Sends a message to the actor.
    #[inline]
    pub fn send<M: Message<S> + 'static>(
        &self,
        msg: M,
    ) -> Result<(), ActorDeadError> {
        self.mailbox.send(Box::new(msg))
    }

    #[inline]
    fn from_mailbox(mailbox: Arc<Mailbox<S>>) -> Self {
        Self { mailbox }
    }
}

impl<S> Clone for Actor<S> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

async fn run_actor<S: Send + Sync + 'static>(
    mailbox: Weak<Mailbox<S>>,
    mut state: S,
    mut msg_rx: MessageReceiver<S>,
) {
    debug!("started");
    while let Some(msg) = msg_rx.recv().await {
        trace!("received message: {msg:?}");

        // The last handle can go away between the send and this point.
        let Some(mailbox) = mailbox.upgrade() else {
            warn!("last mailbox has been dropped, discard the message");
            break;
        };
        msg.handle(&mut state, &Actor::from_mailbox(mailbox));
    }
    debug!("will terminate");
}
