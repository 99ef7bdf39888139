mod async_read_stream;
mod buffer;
mod buffered_input_stream;
mod error;
mod scripted_stream;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use async_read_stream::AsyncReadStream;
pub use buffered_input_stream::BufferedInputStream;
pub use error::{Result, StreamError};
pub use scripted_stream::{ScriptStep, ScriptedStream};

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
const DEFAULT_MARKER_BUFFER_SIZE: usize = 2 * 1024;

/// How many bytes a read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadLength {
    /// Read exactly this many bytes unless the stream ends or times out first.
    Bytes(usize),
    /// Read whatever is currently available, with no minimum.
    Available,
}

/// Successful completion of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes delivered in stream order.
    Data(Bytes),
    /// The deadline expired; carries whatever was collected before it did.
    TimedOut(Bytes),
    /// No bytes remain.
    EndOfStream,
}

impl ReadOutcome {
    /// The delivered bytes, empty for `EndOfStream`.
    pub fn bytes(&self) -> &[u8] {
        match self {
            ReadOutcome::Data(data) | ReadOutcome::TimedOut(data) => data,
            ReadOutcome::EndOfStream => &[],
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ReadOutcome::EndOfStream)
    }
}

/// An asynchronous, forward-only byte source.
///
/// Streams that can replay previously read bytes override `mark`, `reset`
/// and `mark_supported`. Decorators implement this same trait over an inner
/// stream so they can be stacked.
///
/// Callers must not overlap calls on one stream; every mutating operation
/// takes `&mut self`, so the borrow checker enforces this.
#[async_trait]
pub trait InputStream: Send {
    /// Reads up to `len` bytes, waiting at most `timeout` (forever if `None`).
    async fn read(&mut self, len: ReadLength, timeout: Option<Duration>) -> Result<ReadOutcome>;

    /// Aborts any outstanding or future reads.
    fn abort(&self);

    /// Closes the stream. Reads after a close fail with `StreamError::Closed`.
    async fn close(&mut self, timeout: Option<Duration>) -> Result<()>;

    /// Marks the current position of the stream. From this point forward
    /// reads will be cached so they can be replayed with `reset()`.
    ///
    /// Returns the number of already delivered bytes that were discarded as
    /// a result of this operation.
    fn mark(&mut self) -> Result<usize> {
        Err(StreamError::MarkUnsupported)
    }

    /// Returns the stream to the previously marked position.
    fn reset(&mut self) -> Result<()> {
        Err(StreamError::MarkUnsupported)
    }

    /// Whether `mark` and `reset` are supported. Defaults to `false`.
    fn mark_supported(&self) -> bool {
        false
    }
}

#[async_trait]
impl<S> InputStream for Box<S>
where
    S: InputStream + ?Sized,
{
    async fn read(&mut self, len: ReadLength, timeout: Option<Duration>) -> Result<ReadOutcome> {
        (**self).read(len, timeout).await
    }

    fn abort(&self) {
        (**self).abort()
    }

    async fn close(&mut self, timeout: Option<Duration>) -> Result<()> {
        (**self).close(timeout).await
    }

    fn mark(&mut self) -> Result<usize> {
        (**self).mark()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn mark_supported(&self) -> bool {
        (**self).mark_supported()
    }
}
