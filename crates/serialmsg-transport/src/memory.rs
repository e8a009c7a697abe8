use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::traits::Transport;

#[derive(Debug, Default)]
struct Pipe {
    bytes: VecDeque<u8>,
    /// Caps what `available` reports, to mimic a slow UART FIFO.
    max_available: Option<usize>,
}

/// In-memory transport backed by shared byte queues.
///
/// Cloning yields another handle onto the same queues, so a test (or a host
/// simulator) can keep feeding bytes after the service has taken ownership.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    incoming: Arc<Mutex<Pipe>>,
    outgoing: Arc<Mutex<Pipe>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Create a transport with its own incoming and outgoing queues.
    pub fn new() -> Self {
        Self {
            incoming: Arc::new(Mutex::new(Pipe::default())),
            outgoing: Arc::new(Mutex::new(Pipe::default())),
        }
    }

    /// Create two cross-wired transports: what one writes, the other reads.
    pub fn pair() -> (Self, Self) {
        let a_to_b = Arc::new(Mutex::new(Pipe::default()));
        let b_to_a = Arc::new(Mutex::new(Pipe::default()));
        let a = Self {
            incoming: Arc::clone(&b_to_a),
            outgoing: Arc::clone(&a_to_b),
        };
        let b = Self {
            incoming: a_to_b,
            outgoing: b_to_a,
        };
        (a, b)
    }

    /// Queue bytes as if they had arrived from the peer.
    pub fn feed(&self, bytes: &[u8]) {
        lock(&self.incoming).bytes.extend(bytes.iter().copied());
    }

    /// Take everything written so far.
    pub fn take_written(&self) -> Vec<u8> {
        lock(&self.outgoing).bytes.drain(..).collect()
    }

    /// Bytes queued for reading that have not been consumed yet.
    pub fn pending(&self) -> usize {
        lock(&self.incoming).bytes.len()
    }

    /// Limit how many bytes a single `available` call reports.
    pub fn set_max_available(&self, max: Option<usize>) {
        lock(&self.incoming).max_available = max;
    }
}

impl Transport for MemoryTransport {
    fn available(&mut self) -> Result<usize> {
        let pipe = lock(&self.incoming);
        let len = pipe.bytes.len();
        Ok(pipe.max_available.map_or(len, |max| len.min(max)))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut pipe = lock(&self.incoming);
        let mut count = buf.len().min(pipe.bytes.len());
        if let Some(max) = pipe.max_available {
            count = count.min(max);
        }
        for (slot, byte) in buf.iter_mut().zip(pipe.bytes.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        lock(&self.outgoing).bytes.extend(buf.iter().copied());
        Ok(buf.len())
    }
}

fn lock(pipe: &Mutex<Pipe>) -> MutexGuard<'_, Pipe> {
    pipe.lock().unwrap_or_else(PoisonError::into_inner)
}
