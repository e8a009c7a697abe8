//! Polling message service for serialmsg.
//!
//! A [`Service`] turns a byte [`Transport`](serialmsg_transport::Transport)
//! into typed, framed messages:
//! - [`Service::poll`] reassembles packets from partial reads, rejects
//!   malformed headers, abandons stalled packets and dispatches complete
//!   ones to every handler registered for their type
//! - [`Service::send`] frames the transmit region and writes it out
//! - the built-in handshake handlers exchange connection ids and receive
//!   limits, and notify reset handlers when the peer restarts
//! - [`Service::check_connection`] keeps requesting a handshake until the
//!   link is up and, on checked links, drops peers that go quiet

pub mod config;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod service;
pub mod stats;

pub use config::{
    ServiceConfig, DEFAULT_BUF_SIZE, DEFAULT_CONNECT_INTERVAL_MS, DEFAULT_QUIET_TIMEOUT_MS,
    DEFAULT_STALL_TIMEOUT_MS, MIN_BUF_SIZE,
};
pub use error::{Result, ServiceError};
pub use handler::{LinkEvent, LinkHandler, MsgHandler, ResetHandler};
pub use handshake::{ConnectHandler, ConnectMsg, ConnectResponseHandler};
pub use service::Service;
pub use stats::ServiceStats;
