mod chunks;
mod events;

pub use chunks::{Chunks, ChunksError};
pub use events::{Error as EventError, EventReader};
