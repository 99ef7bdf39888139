use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{InputStream, ReadLength, ReadOutcome, Result, StreamError, DEFAULT_BUFFER_SIZE};

/// Adapts a tokio [`AsyncRead`] into an [`InputStream`].
///
/// A read of `n` bytes keeps reading until `n` bytes are collected, the reader
/// reaches EOF, the timeout expires or the stream is aborted. A read of
/// everything available performs a single read of at most the chunk size.
pub struct AsyncReadStream<R> {
    inner: R,
    chunk_size: usize,
    abort: CancellationToken,
    closed: bool,
}

impl<R> AsyncReadStream<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(inner: R) -> AsyncReadStream<R> {
        AsyncReadStream::with_chunk_size(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a stream whose `Available` reads return at most `chunk_size` bytes.
    pub fn with_chunk_size(inner: R, chunk_size: usize) -> AsyncReadStream<R> {
        AsyncReadStream {
            inner,
            chunk_size: chunk_size.max(1),
            abort: CancellationToken::new(),
            closed: false,
        }
    }

    /// Token that aborts this stream when cancelled. It can be moved to
    /// another task to interrupt a read that is in progress.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Returns the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Reads at most `want` more bytes into `buf`, returning how many arrived.
async fn fill<R>(inner: &mut R, buf: &mut BytesMut, want: usize) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    buf.reserve(want);
    inner.take(want as u64).read_buf(buf).await
}

#[async_trait]
impl<R> InputStream for AsyncReadStream<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, len: ReadLength, timeout: Option<Duration>) -> Result<ReadOutcome> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.abort.is_cancelled() {
            return Err(StreamError::Aborted);
        }

        let (target, single_read) = match len {
            ReadLength::Bytes(n) => (n, false),
            ReadLength::Available => (self.chunk_size, true),
        };
        let deadline = timeout.map(|t| Instant::now() + t);
        let abort = self.abort.clone();
        let mut buf = BytesMut::new();

        while buf.len() < target {
            let want = target - buf.len();
            let read = async {
                match deadline {
                    Some(deadline) => {
                        tokio::time::timeout_at(deadline, fill(&mut self.inner, &mut buf, want))
                            .await
                            .ok()
                    }
                    None => Some(fill(&mut self.inner, &mut buf, want).await),
                }
            };

            let read = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(StreamError::Aborted),
                read = read => read,
            };

            match read {
                None => {
                    trace!(collected = buf.len(), "read timed out");
                    return Ok(ReadOutcome::TimedOut(buf.freeze()));
                }
                Some(Ok(0)) => break,
                Some(Ok(_)) if single_read => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
            }
        }

        if buf.is_empty() && target > 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        Ok(ReadOutcome::Data(buf.freeze()))
    }

    fn abort(&self) {
        debug!("aborting reader stream");
        self.abort.cancel();
    }

    async fn close(&mut self, _timeout: Option<Duration>) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use super::AsyncReadStream;
    use crate::io::{InputStream, ReadLength, ReadOutcome, StreamError};

    #[tokio::test]
    async fn test_reads_requested_length_across_chunks() {
        let (mut writer, reader) = tokio::io::duplex(4);
        let mut stream = AsyncReadStream::new(reader);

        let write = tokio::spawn(async move {
            writer.write_all(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).await.unwrap();
        });

        let read = stream.read(ReadLength::Bytes(10), None).await.unwrap();
        assert_eq!(ReadOutcome::Data((0..10).collect::<Vec<u8>>().into()), read);
        write.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_of_stream() {
        let mut stream = AsyncReadStream::new(Cursor::new(vec![1u8, 2, 3]));

        let read = stream.read(ReadLength::Bytes(5), None).await.unwrap();
        assert_eq!(&[1, 2, 3], read.bytes(), "partial read before eof");
        assert!(stream.read(ReadLength::Bytes(5), None).await.unwrap().is_end_of_stream());
        assert!(stream.read(ReadLength::Available, None).await.unwrap().is_end_of_stream());
    }

    #[tokio::test]
    async fn test_available_respects_chunk_size() {
        let mut stream = AsyncReadStream::with_chunk_size(Cursor::new(vec![1u8, 2, 3, 4, 5]), 2);

        let read = stream.read(ReadLength::Available, None).await.unwrap();
        assert_eq!(&[1, 2], read.bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_partial_bytes() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut stream = AsyncReadStream::new(reader);
        writer.write_all(&[7, 8]).await.unwrap();

        let read = stream
            .read(ReadLength::Bytes(4), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(ReadOutcome::TimedOut(vec![7, 8].into()), read);
        drop(writer);
    }

    #[tokio::test]
    async fn test_abort_interrupts_pending_read() {
        let (_writer, reader) = tokio::io::duplex(64);
        let mut stream = AsyncReadStream::new(reader);
        let handle = stream.abort_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        assert!(matches!(
            stream.read(ReadLength::Bytes(1), None).await,
            Err(StreamError::Aborted)
        ));
        assert!(matches!(
            stream.read(ReadLength::Bytes(1), None).await,
            Err(StreamError::Aborted)
        ));
    }

    #[tokio::test]
    async fn test_read_after_close() {
        let mut stream = AsyncReadStream::new(Cursor::new(vec![1u8]));
        stream.close(None).await.unwrap();
        assert!(matches!(
            stream.read(ReadLength::Available, None).await,
            Err(StreamError::Closed)
        ));
    }
}
