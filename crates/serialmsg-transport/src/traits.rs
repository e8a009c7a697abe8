use crate::error::Result;

/// A byte-oriented, non-blocking link to a single peer (UART, USB-CDC, socket).
///
/// Implementations buffer incoming bytes however the platform does; the
/// protocol only relies on three guarantees:
/// - `available` reports bytes that can be read right now
/// - `read_bytes` never blocks and returns at most `buf.len()` of those bytes
/// - `write` hands a complete frame to the device in one call
pub trait Transport {
    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` already-available bytes. Returns the count copied.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` to the device. Returns the count accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn available(&mut self) -> Result<usize> {
        (**self).available()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn available(&mut self) -> Result<usize> {
        (**self).available()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_bytes(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }
}
