use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidUtf8,
}

/// A type for reading `data: `-framed stream fragments from a chunk
/// stream.
///
/// The reader buffers raw bytes and decodes them incrementally, so a
/// multi-byte UTF-8 character split across two chunks is held back until
/// its remaining bytes arrive. Decoded text is framed into fragments on
/// line boundaries; the `data: ` prefix is stripped, surrounding
/// whitespace is trimmed, and empty fragments are skipped. Whatever text
/// remains at end of stream is delivered as a final fragment.
pub struct EventReader {
    chunks: Chunks,
    bytes: Vec<u8>,
    text: String,
    eof: bool,
}

impl EventReader {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            chunks,
            bytes: Vec::new(),
            text: String::new(),
            eof: false,
        }
    }

    /// Reads the next non-empty fragment, or `None` at end of stream.
    pub async fn next_fragment(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(fragment) = self.take_fragment() {
                return Ok(Some(fragment));
            }
            if self.eof {
                return Ok(self.flush_fragment());
            }

            match self
                .chunks
                .next_chunk()
                .await
                .map_err(Error::ChunksError)?
            {
                Some(bytes) => self.decode(&bytes)?,
                None => self.eof = true,
            }
        }
    }

    /// Appends a chunk to the byte buffer and moves every completed
    /// UTF-8 sequence into the text buffer.
    fn decode(&mut self, chunk: &[u8]) -> Result<(), Error> {
        self.bytes.extend_from_slice(chunk);
        let valid_up_to = match str::from_utf8(&self.bytes) {
            Ok(s) => {
                self.text.push_str(s);
                self.bytes.len()
            }
            Err(err) => {
                // An incomplete trailing sequence stays buffered; an
                // invalid one in the middle is a malformed payload.
                if err.error_len().is_some() {
                    return Err(Error::InvalidUtf8);
                }
                let valid_up_to = err.valid_up_to();
                self.text.push_str(
                    str::from_utf8(&self.bytes[..valid_up_to])
                        .expect("validated prefix"),
                );
                valid_up_to
            }
        };
        self.bytes.drain(..valid_up_to);
        Ok(())
    }

    /// Pops the next complete line that cleans up to a non-empty
    /// fragment.
    fn take_fragment(&mut self) -> Option<String> {
        while let Some(eol_idx) = self.text.find('\n') {
            let fragment = clean_fragment(&self.text[..eol_idx]);
            self.text.drain(..eol_idx + 1);
            if let Some(fragment) = fragment {
                return Some(fragment);
            }
        }
        None
    }

    /// Drains whatever is left in the text buffer at end of stream.
    fn flush_fragment(&mut self) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.text);
        clean_fragment(&rest)
    }
}

fn clean_fragment(line: &str) -> Option<String> {
    let line = line.trim();
    let line = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None => line,
    };
    if line.is_empty() {
        None
    } else {
        Some(line.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn reader(chunks: Vec<Bytes>) -> EventReader {
        EventReader::new(Chunks::from_vec_deque(chunks.into()))
    }

    #[tokio::test]
    async fn test_normal_fragments() {
        let mut reader = reader(vec![
            Bytes::from_static(b"data: hello\n\n"),
            Bytes::from_static(b"data: bye\n\ndata: [DONE]\n\n"),
        ]);
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "hello");
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "bye");
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "[DONE]");
        assert_eq!(reader.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fragment_split_across_chunks() {
        let mut reader = reader(vec![
            Bytes::from_static(b"data:"),
            Bytes::from_static(b" hel"),
            Bytes::from_static(b"lo\n"),
            Bytes::from_static(b"\n"),
        ]);
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "hello");
        assert_eq!(reader.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        // "né" with the two bytes of 'é' in separate chunks.
        let mut reader = reader(vec![
            Bytes::from_static(b"data: n\xc3"),
            Bytes::from_static(b"\xa9\n\n"),
        ]);
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "né");
        assert_eq!(reader.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trailing_fragment_without_newline() {
        let mut reader = reader(vec![Bytes::from_static(b"data: tail")]);
        assert_eq!(reader.next_fragment().await.unwrap().unwrap(), "tail");
        assert_eq!(reader.next_fragment().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut reader = reader(vec![Bytes::from_static(b"data: \xff\n\n")]);
        assert_eq!(
            reader.next_fragment().await.unwrap_err(),
            Error::InvalidUtf8
        );
    }
}
