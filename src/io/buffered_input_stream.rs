use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use super::{
    buffer::ByteStore, InputStream, ReadLength, ReadOutcome, Result, StreamError,
    DEFAULT_MARKER_BUFFER_SIZE,
};

/// Reads bytes from the inner source with the additional ability
/// to `mark` a stream at a point that can be returned to later
/// using a call to `reset()`.
///
/// Once the stream has been marked every subsequent read is returned as
/// usual but is also retained, which is what allows for replaying that part
/// of the stream. Reads are answered from the retained bytes first and only
/// fall through to the source for any shortfall. Calling `mark()` again
/// discards everything before the current position.
///
/// The read position is only committed once the source completes, so if a
/// source read fails, or the read future is dropped, the retained bytes it
/// would have returned are offered again by the next read.
///
/// If a limit is configured and a read would retain more than it allows, the
/// read still delivers every byte but the mark is invalidated: nothing more
/// is retained and `reset()` fails with `BufferLimitExceeded` until the
/// stream is marked again.
pub struct BufferedInputStream<S> {
    source: S,
    closed: bool,
    mark_pos: usize,
    mark_buffer: Option<ByteStore>,
    overflow: Option<(usize, usize)>,
    buffer_capacity: usize,
    buffer_limit: Option<usize>,
}

impl<S> BufferedInputStream<S>
where
    S: InputStream,
{
    /// Creates a new stream with an unbounded mark buffer.
    ///
    /// # Example
    /// ```no_run
    /// # use markable_stream::io::{AsyncReadStream, BufferedInputStream, InputStream, ReadLength};
    /// # async fn run() -> markable_stream::io::Result<()> {
    /// let file = tokio::fs::File::open("path.bin").await?;
    /// let mut stream = BufferedInputStream::new(AsyncReadStream::new(file));
    /// stream.mark()?;
    /// let header = stream.read(ReadLength::Bytes(4), None).await?;
    /// stream.reset()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(source: S) -> BufferedInputStream<S> {
        BufferedInputStream::with_buffer(source, DEFAULT_MARKER_BUFFER_SIZE, None)
    }

    /// Creates a new stream with a limited mark buffer.
    /// A read that would retain more than `limit` bytes invalidates the mark,
    /// and the following `reset()` fails with `StreamError::BufferLimitExceeded`.
    pub fn new_with_limited_back_buffer(source: S, limit: usize) -> BufferedInputStream<S> {
        BufferedInputStream::with_buffer(source, DEFAULT_MARKER_BUFFER_SIZE.min(limit), Some(limit))
    }

    /// Creates a new stream using the provided initial capacity and limit
    /// for the mark buffer.
    pub fn new_with_capacity_and_limit(
        source: S,
        capacity: usize,
        limit: usize,
    ) -> BufferedInputStream<S> {
        BufferedInputStream::with_buffer(source, capacity, Some(limit))
    }

    fn with_buffer(
        source: S,
        buffer_capacity: usize,
        buffer_limit: Option<usize>,
    ) -> BufferedInputStream<S> {
        BufferedInputStream {
            source,
            closed: false,
            mark_pos: 0,
            mark_buffer: None,
            overflow: None,
            buffer_capacity,
            buffer_limit,
        }
    }

    /// Returns the inner source. **IMPORTANT** this will likely result in data loss
    /// of whatever data has been retained in the mark buffer
    pub fn into_inner(self) -> S {
        self.source
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Offset of the next unread byte within the mark buffer.
    pub fn mark_position(&self) -> usize {
        self.mark_pos
    }

    /// Number of bytes held in the mark buffer, or `None` if the stream
    /// has never been marked.
    pub fn buffered_len(&self) -> Option<usize> {
        self.mark_buffer.as_ref().map(ByteStore::len)
    }

    /// Copies out the unread retained bytes a read of `len` may use,
    /// without moving the read position.
    fn peek_buffered(&self, len: ReadLength) -> Bytes {
        match &self.mark_buffer {
            Some(store) if store.len() > self.mark_pos => {
                let end = match len {
                    ReadLength::Available => store.len(),
                    ReadLength::Bytes(n) => store.len().min(self.mark_pos + n),
                };
                store.slice(self.mark_pos..end)
            }
            _ => Bytes::new(),
        }
    }

    /// Commits a read: retains the source bytes if marked, moves the read
    /// position past everything delivered, and joins the two parts.
    fn deliver(&mut self, buffered: Bytes, source_data: Bytes) -> Result<Bytes> {
        match self.mark_buffer.as_mut() {
            Some(store) if self.overflow.is_none() => match store.write(&source_data) {
                Ok(()) => {
                    self.mark_pos += buffered.len() + source_data.len();
                    debug_assert_eq!(self.mark_pos, store.len());
                }
                Err(StreamError::BufferLimitExceeded { limit, requested }) => {
                    // Everything held is delivered by this read, so it can all go.
                    let dropped = store.discard_front(store.len());
                    debug!(limit, requested, dropped, "mark buffer limit exceeded, invalidating mark");
                    self.mark_pos = 0;
                    self.overflow = Some((limit, requested));
                }
                Err(err) => return Err(err),
            },
            _ => {}
        }

        Ok(concatenate(buffered, source_data))
    }
}

fn concatenate(buffered: Bytes, source_data: Bytes) -> Bytes {
    if buffered.is_empty() {
        return source_data;
    }
    if source_data.is_empty() {
        return buffered;
    }

    let mut joined = BytesMut::with_capacity(buffered.len() + source_data.len());
    joined.put(buffered);
    joined.put(source_data);
    joined.freeze()
}

#[async_trait]
impl<S> InputStream for BufferedInputStream<S>
where
    S: InputStream,
{
    async fn read(&mut self, len: ReadLength, timeout: Option<Duration>) -> Result<ReadOutcome> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if len == ReadLength::Bytes(0) {
            return Ok(ReadOutcome::Data(Bytes::new()));
        }

        // Anything unread in the mark buffer goes first.
        let buffered = self.peek_buffered(len);
        let remaining = match len {
            ReadLength::Available if !buffered.is_empty() => None,
            ReadLength::Available => Some(ReadLength::Available),
            ReadLength::Bytes(n) if buffered.len() >= n => None,
            ReadLength::Bytes(n) => Some(ReadLength::Bytes(n - buffered.len())),
        };

        let Some(remaining) = remaining else {
            trace!(bytes = buffered.len(), "read served from mark buffer");
            self.mark_pos += buffered.len();
            return Ok(ReadOutcome::Data(buffered));
        };

        trace!(
            buffered = buffered.len(),
            requested = ?remaining,
            "reading shortfall from source"
        );
        match self.source.read(remaining, timeout).await? {
            ReadOutcome::Data(data) => Ok(ReadOutcome::Data(self.deliver(buffered, data)?)),
            ReadOutcome::TimedOut(data) => {
                Ok(ReadOutcome::TimedOut(self.deliver(buffered, data)?))
            }
            ReadOutcome::EndOfStream if buffered.is_empty() => Ok(ReadOutcome::EndOfStream),
            ReadOutcome::EndOfStream => {
                Ok(ReadOutcome::Data(self.deliver(buffered, Bytes::new())?))
            }
        }
    }

    fn abort(&self) {
        self.source.abort();
    }

    async fn close(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(buffered = ?self.buffered_len(), "closing buffered stream");
        self.source.close(timeout).await
    }

    fn mark(&mut self) -> Result<usize> {
        if self.closed {
            return Err(StreamError::Closed);
        }

        // If there is no current mark, then start buffering.
        let Some(store) = self.mark_buffer.as_mut() else {
            self.mark_buffer = Some(ByteStore::new(self.buffer_capacity, self.buffer_limit));
            self.mark_pos = 0;
            return Ok(0);
        };

        // Otherwise drop what was already delivered. At position zero the
        // buffer already holds the correct data.
        let discarded = store.discard_front(self.mark_pos);
        self.mark_pos = 0;
        self.overflow = None;
        if discarded > 0 {
            debug!(discarded, retained = store.len(), "mark truncated buffer");
        }
        Ok(discarded)
    }

    fn reset(&mut self) -> Result<()> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.mark_buffer.is_none() {
            return Err(StreamError::MarkNotSet);
        }
        if let Some((limit, requested)) = self.overflow {
            return Err(StreamError::BufferLimitExceeded { limit, requested });
        }

        trace!(rewound = self.mark_pos, "reset to mark");
        self.mark_pos = 0;
        Ok(())
    }

    fn mark_supported(&self) -> bool {
        true
    }
}

impl<S> From<S> for BufferedInputStream<S>
where
    S: InputStream,
{
    fn from(value: S) -> Self {
        BufferedInputStream::new(value)
    }
}
