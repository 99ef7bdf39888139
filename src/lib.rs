//! Asynchronous input streams that can be marked at a position and replayed
//! from it after subsequent reads.
//!
//! [`io::BufferedInputStream`] wraps any [`io::InputStream`] and retains
//! everything read after a call to `mark()`, so `reset()` can deliver it again
//! without going back to the source.
//!
//! ```
//! use markable_stream::io::{BufferedInputStream, InputStream, ReadLength, ScriptedStream};
//!
//! # futures::executor::block_on(async {
//! let source = ScriptedStream::from_chunks([b"MAGIC body".to_vec()]);
//! let mut stream = BufferedInputStream::new(source);
//!
//! stream.mark()?;
//! let peeked = stream.read(ReadLength::Bytes(5), None).await?;
//! assert_eq!(b"MAGIC", peeked.bytes());
//!
//! stream.reset()?;
//! let all = stream.read(ReadLength::Bytes(10), None).await?;
//! assert_eq!(b"MAGIC body", all.bytes());
//! # Ok::<(), markable_stream::io::StreamError>(())
//! # }).unwrap();
//! ```

pub mod io;
