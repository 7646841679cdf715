//! A lightweight single-writer actor runtime.
//!
//! An actor exclusively owns a piece of state and processes messages one
//! at a time, so state transitions are atomic with respect to each other
//! and observers only ever see the state between two messages. This is
//! the concurrency backbone of the client core: every mutation of shared
//! client state is expressed as a message.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod mailbox;

pub use error::ActorDeadError;
pub use handle::Actor;
pub use mailbox::Message;
