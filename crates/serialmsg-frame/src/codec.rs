use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::integrity::Integrity;

/// Frame header: marker (1) + type (1) + id (1) + reserved (1) + length (2) + reserved (2).
pub const HEADER_SIZE: usize = 8;

/// Integrity trailer following the payload.
pub const TRAILER_SIZE: usize = 2;

/// Header plus trailer: the wire size of an empty frame.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + TRAILER_SIZE;

/// Magic start-of-frame byte.
pub const START_BYTE: u8 = b'#';

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// A decoded frame header.
///
/// The reserved fields are carried so that a received header can be
/// inspected verbatim; the protocol assigns them no meaning and always
/// transmits them as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Application message type (0 and 1 belong to the handshake).
    pub msg_type: u8,
    /// Caller-assigned message id, not interpreted by the protocol.
    pub msg_id: u8,
    /// Payload length in bytes.
    pub len: u16,
    pub reserved1: u8,
    pub reserved2: u16,
}

impl Header {
    /// Create a header with zeroed reserved fields.
    pub fn new(msg_type: u8, msg_id: u8, len: u16) -> Self {
        Self {
            msg_type,
            msg_id,
            len,
            reserved1: 0,
            reserved2: 0,
        }
    }

    /// Payload length as a `usize`.
    pub fn payload_len(&self) -> usize {
        usize::from(self.len)
    }

    /// Total wire size of the frame this header announces.
    pub fn frame_len(&self) -> usize {
        self.payload_len() + FRAME_OVERHEAD
    }

    /// Serialize into the first [`HEADER_SIZE`] bytes of `dst`.
    ///
    /// ```text
    /// ┌────────┬──────┬──────┬──────┬────────────┬────────────┐
    /// │ '#'    │ type │ id   │ rsvd │ len (2 LE) │ rsvd (2 LE)│
    /// └────────┴──────┴──────┴──────┴────────────┴────────────┘
    /// ```
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        let limit = dst.len();
        let out = dst.get_mut(..HEADER_SIZE).ok_or(FrameError::Overflow {
            offset: 0,
            needed: HEADER_SIZE,
            limit,
        })?;
        out.copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Serialize into a fresh array.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut dst = &mut out[..];
        dst.put_u8(START_BYTE);
        dst.put_u8(self.msg_type);
        dst.put_u8(self.msg_id);
        dst.put_u8(self.reserved1);
        dst.put_u16_le(self.len);
        dst.put_u16_le(self.reserved2);
        out
    }

    /// Parse the first [`HEADER_SIZE`] bytes of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let Some(mut src) = src.get(..HEADER_SIZE) else {
            return Err(FrameError::Incomplete {
                have: src.len(),
                need: HEADER_SIZE,
            });
        };
        let marker = src.get_u8();
        if marker != START_BYTE {
            return Err(FrameError::InvalidMagic(marker));
        }
        let msg_type = src.get_u8();
        let msg_id = src.get_u8();
        let reserved1 = src.get_u8();
        let len = src.get_u16_le();
        let reserved2 = src.get_u16_le();
        Ok(Self {
            msg_type,
            msg_id,
            len,
            reserved1,
            reserved2,
        })
    }
}

/// A complete frame held outside any service, for host tooling and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame; the header length is taken from the payload.
    pub fn new(msg_type: u8, msg_id: u8, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        })?;
        Ok(Self {
            header: Header::new(msg_type, msg_id, len),
            payload,
        })
    }

    pub fn msg_type(&self) -> u8 {
        self.header.msg_type
    }

    pub fn msg_id(&self) -> u8 {
        self.header.msg_id
    }

    /// The total wire size of this frame (header + payload + trailer).
    pub fn wire_size(&self) -> usize {
        self.header.frame_len()
    }
}

/// Encode a frame into the wire format, appending to `dst`.
pub fn encode_frame(
    msg_type: u8,
    msg_id: u8,
    payload: &[u8],
    integrity: Integrity,
    dst: &mut BytesMut,
) -> Result<()> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })?;
    let start = dst.len();
    dst.reserve(FRAME_OVERHEAD + payload.len());
    dst.put_slice(&Header::new(msg_type, msg_id, len).to_bytes());
    dst.put_slice(payload);
    let trailer = integrity.compute(&dst[start..]);
    dst.put_u16_le(trailer);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Unlike the
/// receive state machine this does not resynchronise: a bad marker or an
/// oversized length is reported and the buffer is left untouched.
pub fn decode_frame(
    src: &mut BytesMut,
    max_payload: usize,
    integrity: Integrity,
) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = Header::decode(&src[..])?;
    if header.payload_len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: header.payload_len(),
            max: max_payload,
        });
    }

    let total = header.frame_len();
    if src.len() < total {
        return Ok(None);
    }

    let body_len = HEADER_SIZE + header.payload_len();
    let received = (&src[body_len..total]).get_u16_le();
    if let Err(err) = integrity.verify(&src[..body_len], received) {
        trace!(msg_type = header.msg_type, error = %err, "rejecting frame");
        return Err(err);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len()).freeze();
    src.advance(TRAILER_SIZE);

    Ok(Some(Frame { header, payload }))
}
