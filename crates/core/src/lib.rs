//! Core client logic: the conversation store, the data source registry,
//! the ingestion coordinator, and the response stream assembler, all
//! guarded by a single actor.
//!
//! The actor is the copy-on-write mechanism of the client: every
//! mutation of client state is a message, handled between two suspension
//! points, and each handled message publishes a fresh immutable snapshot
//! over a watch channel. Observers always see either the pre- or the
//! post-mutation state, never a half-applied one.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod backend_client;
mod client;
pub mod conversation;
mod registry;
mod snapshot;
mod store;

pub use client::{ChatClient, ClientBuilder};
pub use conversation::{Conversation, ConversationId};
pub use snapshot::{ClientSnapshot, StreamState};
