use serde::Serialize;

/// Counters kept by a [`Service`](crate::Service) since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Complete packets handed to the dispatch table.
    pub frames_dispatched: u64,
    /// Complete packets whose type had no registered handler.
    pub frames_unhandled: u64,
    /// Frames written to the transport.
    pub frames_sent: u64,
    /// Headers rejected for a wrong start byte.
    pub bad_magic: u64,
    /// Headers rejected for a declared length beyond the receive region.
    pub oversize: u64,
    /// Partial packets abandoned after the stall timeout.
    pub stalls: u64,
    /// Packets dropped because the trailer did not verify.
    pub checksum_failures: u64,
    /// Handler invocations that returned an error.
    pub handler_errors: u64,
    /// Remote connection id changes seen in handshakes.
    pub peer_resets: u64,
    /// Times a connect response brought the link up.
    pub connects: u64,
    /// Times the link was taken down by a quiet peer or the application.
    pub disconnects: u64,
}
