use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

const READ_CHUNK_SIZE: usize = 1024;

/// Adapts a non-blocking `Read + Write` stream (a serial device opened with
/// `O_NONBLOCK`, a socket in non-blocking mode) to [`Transport`].
///
/// `available` drains whatever the stream has ready into an internal buffer
/// and reports its length; `read_bytes` serves from that buffer. A stream in
/// blocking mode will stall `available` until data arrives.
pub struct StreamTransport<S> {
    inner: S,
    pending: BytesMut,
    eof: bool,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap a stream that has already been switched to non-blocking mode.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            eof: false,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the adapter and return the inner stream. Buffered bytes are lost.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn fill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    debug!("stream reached end of file");
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        return Ok(());
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(());
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn available(&mut self) -> Result<usize> {
        self.fill()?;
        if self.eof && self.pending.is_empty() {
            return Err(TransportError::Closed);
        }
        Ok(self.pending.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let count = buf.len().min(self.pending.len());
        self.pending.copy_to_slice(&mut buf[..count]);
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut offset = 0usize;
        while offset < buf.len() {
            match self.inner.write(&buf[offset..]) {
                Ok(0) => {
                    return Err(TransportError::ShortWrite {
                        written: offset,
                        expected: buf.len(),
                    })
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(offset),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Reads one byte per call, then reports `WouldBlock` once between bytes.
    struct TrickleStream {
        bytes: Vec<u8>,
        pos: usize,
        block_next: bool,
        written: Vec<u8>,
    }

    impl Read for TrickleStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.block_next {
                self.block_next = false;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            if self.pos >= self.bytes.len() {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            self.block_next = true;
            Ok(1)
        }
    }

    impl Write for TrickleStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(3);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn available_reports_buffered_bytes() {
        let mut transport = StreamTransport::new(Cursor::new(b"abc".to_vec()));
        assert_eq!(transport.available().unwrap(), 3);

        let mut buf = [0u8; 2];
        assert_eq!(transport.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(transport.available().unwrap(), 1);
    }

    #[test]
    fn closed_after_eof_and_drain() {
        let mut transport = StreamTransport::new(Cursor::new(b"x".to_vec()));
        assert_eq!(transport.available().unwrap(), 1);

        let mut buf = [0u8; 1];
        transport.read_bytes(&mut buf).unwrap();
        assert!(matches!(transport.available(), Err(TransportError::Closed)));
    }

    #[test]
    fn would_block_yields_zero_available() {
        let stream = TrickleStream {
            bytes: b"hi".to_vec(),
            pos: 0,
            block_next: true,
            written: Vec::new(),
        };
        let mut transport = StreamTransport::new(stream);

        assert_eq!(transport.available().unwrap(), 0);
        assert_eq!(transport.available().unwrap(), 1);
        assert_eq!(transport.available().unwrap(), 1);
        assert_eq!(transport.available().unwrap(), 2);
    }

    #[test]
    fn write_loops_over_partial_writes() {
        let stream = TrickleStream {
            bytes: Vec::new(),
            pos: 0,
            block_next: false,
            written: Vec::new(),
        };
        let mut transport = StreamTransport::new(stream);

        assert_eq!(transport.write(b"0123456789").unwrap(), 10);
        assert_eq!(transport.get_ref().written, b"0123456789");
    }

    #[test]
    fn zero_write_is_short_write() {
        struct Stuck;
        impl Read for Stuck {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::WouldBlock))
            }
        }
        impl Write for Stuck {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut transport = StreamTransport::new(Stuck);
        let err = transport.write(b"abc").unwrap_err();
        assert!(matches!(
            err,
            TransportError::ShortWrite {
                written: 0,
                expected: 3
            }
        ));
    }

    #[test]
    #[cfg(unix)]
    fn nonblocking_socket_pair() {
        let (left, mut right) = std::os::unix::net::UnixStream::pair().unwrap();
        left.set_nonblocking(true).unwrap();
        let mut transport = StreamTransport::new(left);

        assert_eq!(transport.available().unwrap(), 0);

        right.write_all(b"frame").unwrap();
        assert_eq!(transport.available().unwrap(), 5);

        transport.write(b"reply").unwrap();
        let mut buf = [0u8; 5];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"reply");
    }
}
