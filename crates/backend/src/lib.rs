//! An abstraction layer for the backend services of a grounded chat client.
//!
//! This crate establishes a unified protocol between the client core and
//! the two backend collaborators it talks to: the streaming completion
//! service and the one-shot text ingestion service. It also defines the
//! contract for the external content provider that supplies raw data
//! source text before ingestion.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod request;
mod response;
mod service;
mod source;

pub use error::*;
pub use request::*;
pub use response::*;
pub use service::*;
pub use source::*;
