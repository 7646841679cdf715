#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

/// An error occurred while reading the next chunk.
#[derive(Debug, PartialEq, Eq)]
pub struct ChunksError {
    message: String,
}

impl ChunksError {
    /// Returns a description of the failed read.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An adapter for streaming byte chunks.
pub enum Chunks {
    Response(Response),
    #[cfg(test)]
    VecDeque(VecDeque<Bytes>),
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        Chunks::Response(response)
    }

    #[cfg(test)]
    pub fn from_vec_deque(vec: VecDeque<Bytes>) -> Self {
        Chunks::VecDeque(vec)
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ChunksError> {
        match self {
            Chunks::Response(response) => {
                response.chunk().await.map_err(|err| ChunksError {
                    message: format!("{err}"),
                })
            }
            #[cfg(test)]
            Chunks::VecDeque(vec) => Ok(vec.pop_front()),
        }
    }
}
