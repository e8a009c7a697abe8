/// Errors that can occur while framing, parsing or cursoring over payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with the `'#'` marker.
    #[error("invalid start marker 0x{0:02x} (expected 0x23 '#')")]
    InvalidMagic(u8),

    /// The payload exceeds what the receiver or the length field can hold.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Fewer bytes than a complete header or frame.
    #[error("incomplete frame ({have} of {need} bytes)")]
    Incomplete { have: usize, need: usize },

    /// A write would run past the end of the transmit region.
    #[error("write overflow: {needed} bytes at offset {offset}, limit {limit}")]
    Overflow {
        offset: usize,
        needed: usize,
        limit: usize,
    },

    /// A read would run past the current packet's payload.
    #[error("read underflow: {needed} bytes at offset {offset}, limit {limit}")]
    Underflow {
        offset: usize,
        needed: usize,
        limit: usize,
    },

    /// The character does not fit in a single byte.
    #[error("character {0:?} is not representable in one byte")]
    UnencodableChar(char),

    /// The integrity trailer did not match the frame contents.
    #[error("checksum mismatch (computed 0x{computed:04x}, trailer 0x{received:04x})")]
    ChecksumMismatch { computed: u16, received: u16 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
