//! Header framing and payload cursors for serialmsg.
//!
//! Every frame on the wire is:
//! - an 8-byte header: start marker `'#'`, message type, message id, a reserved
//!   byte, a 2-byte little-endian payload length and two more reserved bytes
//! - the payload
//! - a 2-byte little-endian integrity trailer
//!
//! Payloads are built and consumed through [`TxBuffer`] and [`RxBuffer`],
//! fixed-capacity regions whose typed accessors refuse to step outside the
//! region or the current packet.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod integrity;
pub mod message;

pub use codec::{
    decode_frame, encode_frame, Frame, Header, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD,
    START_BYTE, TRAILER_SIZE,
};
pub use cursor::{RxBuffer, TxBuffer};
pub use error::{FrameError, Result};
pub use integrity::{crc16, Integrity};
pub use message::{type_name, MsgIdAllocator, CONNECT_REQUEST, CONNECT_RESPONSE, USER_TYPE_START};
