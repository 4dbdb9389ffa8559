use bytes::{Bytes, BytesMut};

/// Splits an incoming sequence of byte buffers into chunks of a fixed
/// size. Every chunk except the last is exactly `size` bytes long.
pub struct Rechunker {
    size: usize,
    buffer: BytesMut,
}

impl Rechunker {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "chunk size must be positive");

        Rechunker {
            size,
            buffer: BytesMut::with_capacity(size),
        }
    }

    /// Adds data, returning any chunks that are now complete.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut chunks = vec![];

        while self.buffer.len() >= self.size {
            chunks.push(self.buffer.split_to(self.size).freeze());
        }

        chunks
    }

    /// Returns the final partial chunk, if there is one.
    pub fn finish(self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.freeze())
        }
    }
}
