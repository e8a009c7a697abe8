//! Framed, typed messages over byte-stream links.
//!
//! serialmsg moves small binary messages between a host and a device over
//! anything that behaves like a serial port. Each message is an 8-byte
//! header, a payload of at most a few hundred bytes and a 2-byte trailer.
//! A polling [`Service`](service::Service) reassembles packets from partial
//! reads and dispatches them by type; a built-in handshake exchanges
//! connection ids so either end can notice that the other restarted.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte transport and clock traits with in-memory and
//!   stream adapters
//! - [`frame`]: header codec, integrity trailer and payload cursors
//! - [`service`]: receive state machine, dispatch and handshake (behind the
//!   `service` feature, on by default)

/// Re-export transport types.
pub mod transport {
    pub use serialmsg_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use serialmsg_frame::*;
}

/// Re-export service types (requires `service` feature).
#[cfg(feature = "service")]
pub mod service {
    pub use serialmsg_service::*;
}
