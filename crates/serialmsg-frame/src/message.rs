//! Built-in message types and message-id allocation.
//!
//! Types 0 and 1 carry the connection handshake. Everything from
//! [`USER_TYPE_START`] up is application-defined and opaque to the protocol.

/// Handshake request: sender's connection id, max payload and type.
pub const CONNECT_REQUEST: u8 = 0;

/// Handshake response, same payload layout as the request.
pub const CONNECT_RESPONSE: u8 = 1;

/// First application-defined message type.
pub const USER_TYPE_START: u8 = 2;

/// Returns a human-readable name for a message type.
pub fn type_name(msg_type: u8) -> &'static str {
    match msg_type {
        CONNECT_REQUEST => "CONNECT_REQUEST",
        CONNECT_RESPONSE => "CONNECT_RESPONSE",
        _ => "USER",
    }
}

/// Cycles message ids within a fixed range.
///
/// The host side allocates from `1..=127` and the device side from
/// `128..=255`, so ids from the two allocators never collide. Id 0 is never
/// handed out; it marks messages that expect no correlation.
#[derive(Debug, Clone)]
pub struct MsgIdAllocator {
    first: u8,
    last: u8,
    next: u8,
}

impl MsgIdAllocator {
    /// Host-side allocator: `1..=127`.
    pub fn host() -> Self {
        Self::with_range(1, 127)
    }

    /// Device-side allocator: `128..=255`.
    pub fn device() -> Self {
        Self::with_range(128, 255)
    }

    fn with_range(first: u8, last: u8) -> Self {
        Self {
            first,
            last,
            next: first,
        }
    }

    /// Hand out the next id, wrapping at the end of the range.
    pub fn next_id(&mut self) -> u8 {
        let id = self.next;
        self.next = if id >= self.last { self.first } else { id + 1 };
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(type_name(CONNECT_REQUEST), "CONNECT_REQUEST");
        assert_eq!(type_name(CONNECT_RESPONSE), "CONNECT_RESPONSE");
        assert_eq!(type_name(USER_TYPE_START), "USER");
    }

    #[test]
    fn host_ids_wrap_and_skip_zero() {
        let mut ids = MsgIdAllocator::host();
        assert_eq!(ids.next_id(), 1);
        for _ in 0..125 {
            ids.next_id();
        }
        assert_eq!(ids.next_id(), 127);
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn device_ids_stay_in_upper_half() {
        let mut ids = MsgIdAllocator::device();
        let seen: Vec<u8> = (0..300).map(|_| ids.next_id()).collect();
        assert!(seen.iter().all(|id| *id >= 128));
        assert_eq!(seen[0], 128);
        assert_eq!(seen[127], 255);
        assert_eq!(seen[128], 128);
    }
}
