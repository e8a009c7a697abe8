//! Fixed-capacity payload regions with typed little-endian cursors.
//!
//! Both regions reserve the first [`HEADER_SIZE`] bytes for the frame header,
//! so cursors start at `HEADER_SIZE`. Every accessor checks its bounds and
//! fails with [`FrameError::Overflow`] (transmit) or [`FrameError::Underflow`]
//! (receive) without moving the cursor.

use crate::codec::{Header, FRAME_OVERHEAD, HEADER_SIZE, TRAILER_SIZE};
use crate::error::{FrameError, Result};
use crate::integrity::Integrity;

/// Outgoing frame region.
///
/// Payload writes are limited to `capacity - TRAILER_SIZE` so the trailer of
/// the largest possible frame still fits.
#[derive(Debug, Clone)]
pub struct TxBuffer {
    buf: Box<[u8]>,
    pos: usize,
}

impl TxBuffer {
    /// Allocate a region; capacities below one empty frame are rounded up.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(FRAME_OVERHEAD)].into_boxed_slice(),
            pos: HEADER_SIZE,
        }
    }

    /// Size of the whole region, header and trailer included.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Largest payload a single frame from this region can carry.
    pub fn payload_capacity(&self) -> usize {
        self.buf.len().saturating_sub(FRAME_OVERHEAD)
    }

    /// Payload bytes written since the last reset.
    pub fn payload_len(&self) -> usize {
        self.pos - HEADER_SIZE
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.limit().saturating_sub(self.pos)
    }

    /// Rewind the cursor to the start of the payload.
    pub fn reset(&mut self) {
        self.pos = HEADER_SIZE;
    }

    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.put(v.to_le_bytes())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.put([v])
    }

    /// Write a character as one byte. Only `U+0000..=U+00FF` is representable.
    pub fn write_char(&mut self, v: char) -> Result<()> {
        let byte = u8::try_from(v).map_err(|_| FrameError::UnencodableChar(v))?;
        self.put([byte])
    }

    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.put([u8::from(v)])
    }

    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.put(v.to_le_bytes())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.put(v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.put(v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.put(v.to_le_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.check(bytes.len())?;
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    /// Reserve `n` bytes without writing them, for later patching through
    /// [`TxBuffer::payload_mut`].
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.pos = self.check(n)?;
        Ok(())
    }

    /// Writable space at the cursor, for bulk copies. Follow with
    /// [`TxBuffer::skip`] to commit what was written.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let limit = self.limit();
        &mut self.buf[self.pos..limit]
    }

    /// The payload written so far, for in-place patching.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HEADER_SIZE..self.pos]
    }

    /// Place header and trailer around a `len`-byte payload and return the
    /// complete frame.
    pub fn seal(
        &mut self,
        msg_type: u8,
        msg_id: u8,
        len: usize,
        integrity: Integrity,
    ) -> Result<&[u8]> {
        let max = self.payload_capacity();
        let wire_len = u16::try_from(len)
            .ok()
            .filter(|_| len <= max)
            .ok_or(FrameError::PayloadTooLarge { size: len, max })?;

        Header::new(msg_type, msg_id, wire_len).encode(&mut self.buf)?;
        let body_len = HEADER_SIZE + len;
        let trailer = integrity.compute(&self.buf[..body_len]);
        self.buf[body_len..body_len + TRAILER_SIZE].copy_from_slice(&trailer.to_le_bytes());
        Ok(&self.buf[..body_len + TRAILER_SIZE])
    }

    fn limit(&self) -> usize {
        self.buf.len().saturating_sub(TRAILER_SIZE)
    }

    fn check(&self, needed: usize) -> Result<usize> {
        let limit = self.limit();
        self.pos
            .checked_add(needed)
            .filter(|end| *end <= limit)
            .ok_or(FrameError::Overflow {
                offset: self.pos,
                needed,
                limit,
            })
    }

    fn put<const N: usize>(&mut self, bytes: [u8; N]) -> Result<()> {
        self.write_bytes(&bytes)
    }
}

/// Incoming frame region.
///
/// The receive state machine fills the raw region; once a packet is
/// complete [`RxBuffer::open`] exposes exactly its payload to the readers.
#[derive(Debug, Clone)]
pub struct RxBuffer {
    buf: Box<[u8]>,
    pos: usize,
    limit: usize,
}

impl RxBuffer {
    /// Allocate a region; capacities below one empty frame are rounded up.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(FRAME_OVERHEAD)].into_boxed_slice(),
            pos: HEADER_SIZE,
            limit: HEADER_SIZE,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The whole region as last filled.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    /// Destination for `len` incoming bytes starting at `offset`.
    pub fn fill_slot(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let capacity = self.buf.len();
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= capacity)
            .ok_or(FrameError::Overflow {
                offset,
                needed: len,
                limit: capacity,
            })?;
        Ok(&mut self.buf[offset..end])
    }

    /// Drop the first `n` of `filled` raw bytes, moving the rest to the front.
    pub fn discard_front(&mut self, n: usize, filled: usize) {
        let filled = filled.min(self.buf.len());
        let n = n.min(filled);
        self.buf.copy_within(n..filled, 0);
    }

    /// Expose a `payload_len`-byte payload to the readers and rewind the cursor.
    pub fn open(&mut self, payload_len: usize) {
        self.pos = HEADER_SIZE;
        self.limit = HEADER_SIZE
            .saturating_add(payload_len)
            .min(self.buf.len());
    }

    /// Move the cursor back to the start of the open payload.
    pub fn rewind(&mut self) {
        self.pos = HEADER_SIZE;
    }

    /// Close the payload window; every read fails until the next `open`.
    pub fn reset(&mut self) {
        self.pos = HEADER_SIZE;
        self.limit = HEADER_SIZE;
    }

    /// Length of the currently open payload.
    pub fn payload_len(&self) -> usize {
        self.limit - HEADER_SIZE
    }

    /// Unread payload bytes.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    /// The complete open payload.
    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_SIZE..self.limit]
    }

    /// Unread payload at the cursor, for bulk copies. Follow with
    /// [`RxBuffer::skip`] to consume what was copied.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..self.limit]
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.take().map(i8::from_le_bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.take().map(u8::from_le_bytes)
    }

    /// Read one byte as a character (`U+0000..=U+00FF`).
    pub fn read_char(&mut self) -> Result<char> {
        self.read_u8().map(char::from)
    }

    /// Any nonzero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|b| b != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.take().map(i16::from_le_bytes)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take().map(u16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take().map(i32::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take().map(u32::from_le_bytes)
    }

    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let end = self.check(dst.len())?;
        dst.copy_from_slice(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.pos = self.check(n)?;
        Ok(())
    }

    fn check(&self, needed: usize) -> Result<usize> {
        self.pos
            .checked_add(needed)
            .filter(|end| *end <= self.limit)
            .ok_or(FrameError::Underflow {
                offset: self.pos,
                needed,
                limit: self.limit,
            })
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.read_bytes(&mut out)?;
        Ok(out)
    }
}
