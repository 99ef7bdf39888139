use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};

use super::error::{Result, StreamError};

/// Append-only byte store with an initial capacity and optional limit.
///
/// Holds the replayable window of a marked stream. Bytes are only ever
/// appended at the end or discarded from the front; the read cursor lives
/// with the owning stream.
#[derive(Debug)]
pub(crate) struct ByteStore {
    buffer_limit: Option<usize>,
    buffer: BytesMut,
}

impl ByteStore {
    /// Creates a new store with the provided initial capacity and optional limit.
    pub fn new(buffer_size: usize, buffer_limit: Option<usize>) -> ByteStore {
        ByteStore {
            buffer_limit,
            buffer: BytesMut::with_capacity(buffer_size),
        }
    }

    /// Appends a slice to the end of the store.
    /// If a limit has been imposed and this would exceed it, the store is
    /// left untouched and `BufferLimitExceeded` is returned.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let requested = self.buffer.len() + buf.len();
        if let Some(limit) = self.buffer_limit {
            if requested > limit {
                return Err(StreamError::BufferLimitExceeded { limit, requested });
            }
        }

        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Snapshot of the full contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Copies the given range out of the store.
    pub fn slice(&self, range: Range<usize>) -> Bytes {
        Bytes::copy_from_slice(&self.as_slice()[range])
    }

    /// Drops the first `count` bytes, shifting the remainder to offset zero.
    /// Returns how many bytes were dropped.
    pub fn discard_front(&mut self, count: usize) -> usize {
        let dropped = count.min(self.buffer.len());
        self.buffer.advance(dropped);
        dropped
    }
}
