use thiserror::Error;

/// Errors surfaced by streams in this crate.
///
/// Source streams report their own failures through the same type, and the
/// buffering stream passes them through untouched.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Stream is already closed")]
    Closed,
    #[error("Cannot reset before input stream has been marked")]
    MarkNotSet,
    #[error("Stream does not support mark/reset")]
    MarkUnsupported,
    #[error("Mark buffer limit of {limit} bytes exceeded (would hold {requested} bytes)")]
    BufferLimitExceeded { limit: usize, requested: usize },
    #[error("Stream was aborted")]
    Aborted,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
