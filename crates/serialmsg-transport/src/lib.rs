//! Byte transport and clock abstractions.
//!
//! The protocol core never touches a device directly. It consumes:
//! - a [`Transport`] that reports how many bytes are buffered, reads at most
//!   that many without blocking, and writes whole frames
//! - a [`Clock`] that yields a monotonic millisecond counter
//!
//! This is the lowest layer of serialmsg. Everything else builds on top of
//! these two traits.

pub mod clock;
pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use stream::StreamTransport;
pub use traits::Transport;
