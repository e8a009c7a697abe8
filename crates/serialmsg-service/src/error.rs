use std::collections::TryReserveError;

/// Errors that can occur in service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] serialmsg_transport::TransportError),

    /// Frame-level error (cursor overflow/underflow, oversized payload).
    #[error("frame error: {0}")]
    Frame(#[from] serialmsg_frame::FrameError),

    /// Storage for a new handler registration could not be allocated.
    #[error("handler registration failed: {0}")]
    Registration(#[from] TryReserveError),

    /// The configuration cannot back a working service.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `poll` was called from inside a message handler.
    #[error("poll called from within a message handler")]
    Reentrant,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
