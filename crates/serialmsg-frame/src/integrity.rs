use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

/// How the 2-byte trailer after each payload is produced and checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrity {
    /// Trailer is always zero and never checked. Wire compatible with the
    /// existing device firmware.
    #[default]
    None,
    /// CRC-16 (reflected polynomial 0xA001, initial value 0) over header and
    /// payload, stored little-endian and verified on receipt.
    Crc16,
}

impl Integrity {
    /// Trailer value for a header+payload byte run.
    pub fn compute(self, frame_body: &[u8]) -> u16 {
        match self {
            Integrity::None => 0,
            Integrity::Crc16 => crc16(0, frame_body),
        }
    }

    /// Check a received trailer against the header+payload it follows.
    pub fn verify(self, frame_body: &[u8], received: u16) -> Result<()> {
        match self {
            Integrity::None => Ok(()),
            Integrity::Crc16 => {
                let computed = crc16(0, frame_body);
                if computed == received {
                    Ok(())
                } else {
                    Err(FrameError::ChecksumMismatch { computed, received })
                }
            }
        }
    }
}

/// Update a CRC-16/ARC value with `bytes`.
///
/// Chaining is supported: `crc16(crc16(0, a), b) == crc16(0, a ++ b)`.
pub fn crc16(mut crc: u16, bytes: &[u8]) -> u16 {
    for &byte in bytes {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ 0xA001
            } else {
                crc >> 1
            };
        }
    }
    crc
}
