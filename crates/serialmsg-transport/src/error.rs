/// Errors that can occur in byte transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying device or stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the stream and no buffered bytes remain.
    #[error("transport closed")]
    Closed,

    /// The device accepted fewer bytes than a whole frame.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, TransportError>;
