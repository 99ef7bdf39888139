//! In-memory source that plays back a fixed script
//!
//! Useful for deterministic tests of stream consumers: every read pops the
//! next step, and the stream records what it was asked for so a test can
//! verify whether (and how) the source was contacted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{InputStream, ReadLength, ReadOutcome, Result, StreamError};

/// One scripted response of a [`ScriptedStream`].
#[derive(Debug)]
pub enum ScriptStep {
    /// Bytes delivered in order. A read of `n` bytes takes at most `n` of
    /// them and leaves the rest for the following read.
    Chunk(Bytes),
    /// Bytes delivered whole, however many were requested.
    Burst(Bytes),
    /// The read times out after delivering these bytes.
    TimeOut(Bytes),
    /// The read fails with this error.
    Fail(StreamError),
    /// The read reports end of stream.
    End,
}

/// Source stream that answers reads from a queue of [`ScriptStep`]s.
///
/// Once the script is exhausted every read reports end of stream.
#[derive(Debug, Default)]
pub struct ScriptedStream {
    script: VecDeque<ScriptStep>,
    reads: Vec<ReadLength>,
    closed: bool,
    aborts: AtomicUsize,
    closes: usize,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream that plays back the given steps in order
    pub fn with_script(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Create a stream that delivers the given chunks and then ends
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::with_script(chunks.into_iter().map(|c| ScriptStep::Chunk(c.into())))
    }

    /// Append a step to the end of the script
    pub fn push(&mut self, step: ScriptStep) {
        self.script.push_back(step);
    }

    /// Every length requested so far, in order.
    pub fn reads(&self) -> &[ReadLength] {
        &self.reads
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> usize {
        self.closes
    }

    fn next_step(&mut self, len: ReadLength) -> Option<ScriptStep> {
        match self.script.pop_front()? {
            ScriptStep::Chunk(mut chunk) => {
                if let ReadLength::Bytes(n) = len {
                    if chunk.len() > n {
                        let rest = chunk.split_off(n);
                        self.script.push_front(ScriptStep::Chunk(rest));
                    }
                }
                Some(ScriptStep::Chunk(chunk))
            }
            step => Some(step),
        }
    }
}

#[async_trait]
impl InputStream for ScriptedStream {
    async fn read(&mut self, len: ReadLength, _timeout: Option<Duration>) -> Result<ReadOutcome> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if self.abort_count() > 0 {
            return Err(StreamError::Aborted);
        }
        self.reads.push(len);

        match self.next_step(len) {
            Some(ScriptStep::Chunk(data)) | Some(ScriptStep::Burst(data)) => {
                Ok(ReadOutcome::Data(data))
            }
            Some(ScriptStep::TimeOut(data)) => Ok(ReadOutcome::TimedOut(data)),
            Some(ScriptStep::Fail(err)) => Err(err),
            Some(ScriptStep::End) | None => Ok(ReadOutcome::EndOfStream),
        }
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    async fn close(&mut self, _timeout: Option<Duration>) -> Result<()> {
        self.closed = true;
        self.closes += 1;
        Ok(())
    }
}
