use std::fmt::Debug;

use tokio::sync::mpsc;

use crate::{Actor, ActorDeadError};

/// Helper trait for handling boxed messages.
pub trait BoxMessage<S>: Send + Debug + 'static {
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>);
}

/// A message that an actor can handle.
pub trait Message<S>: BoxMessage<S> {
    /// Handles the message with mutable access to the actor's state.
    ///
    /// The `handle` argument can be cloned into spawned tasks so that
    /// their results come back to the same actor as further messages.
    fn handle(self, state: &mut S, handle: &Actor<S>);
}

impl<S, M: Message<S>> BoxMessage<S> for M {
    #[inline]
    fn handle_box(self: Box<Self>, state: &mut S, handle: &Actor<S>) {
        (*self).handle(state, handle)
    }
}

impl<S, M: Message<S> + ?Sized> Message<S> for Box<M> {
    #[inline]
    fn handle(self, state: &mut S, handle: &Actor<S>) {
        self.handle_box(state, handle)
    }
}

pub type MessageReceiver<S> = mpsc::UnboundedReceiver<Box<dyn Message<S>>>;

/// The sending half of an actor's message queue.
///
/// The queue closes once every mailbox reference has been dropped,
/// after which the actor task terminates.
pub struct Mailbox<S> {
    msg_tx: mpsc::UnboundedSender<Box<dyn Message<S>>>,
}

impl<S: Send + Sync + 'static> Mailbox<S> {
    #[inline]
    pub fn new() -> (Self, MessageReceiver<S>) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        (Self { msg_tx }, msg_rx)
    }

    #[inline]
    pub fn send(&self, msg: Box<dyn Message<S>>) -> Result<(), ActorDeadError> {
        self.msg_tx.send(msg).map_err(|_| ActorDeadError)
    }
}
