use std::fmt;

use rand::Rng;
use serialmsg_frame::{
    type_name, FrameError, Header, MsgIdAllocator, RxBuffer, TxBuffer, CONNECT_REQUEST,
    CONNECT_RESPONSE, HEADER_SIZE, START_BYTE, TRAILER_SIZE,
};
use serialmsg_transport::{Clock, SystemClock, Transport, TransportError};

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::handler::{
    HandlerTable, LinkEvent, LinkHandler, LinkTable, MsgHandler, ResetHandler, ResetTable,
};
use crate::handshake::{ConnectHandler, ConnectMsg, ConnectResponseHandler};
use crate::stats::ServiceStats;

/// One end of a framed message connection.
///
/// The service owns a [`Transport`], a receive region and a transmit region.
/// Calling [`Service::poll`] from the application's main loop moves buffered
/// bytes into the receive region, reassembles packets across any number of
/// partial reads and hands each complete packet to the handlers registered
/// for its type. Nothing runs in the background.
pub struct Service<T, C = SystemClock> {
    transport: T,
    clock: C,
    config: ServiceConfig,

    conn_id: u32,
    remote_conn_id: u32,
    remote_conn_type: u16,
    remote_max_payload: Option<u16>,

    connected: bool,
    last_response_ms: Option<u64>,
    next_connect_ms: Option<u64>,
    connect_ids: MsgIdAllocator,

    rx: RxBuffer,
    tx: TxBuffer,
    in_pos: usize,
    payload_size: usize,
    packet_size: usize,
    deadline: Option<u64>,

    handlers: HandlerTable<T, C>,
    resets: ResetTable,
    links: LinkTable,
    dispatching: bool,
    stats: ServiceStats,
}

impl<T: Transport> Service<T, SystemClock> {
    /// Create a service timed by the system monotonic clock.
    pub fn new(transport: T, config: ServiceConfig) -> Result<Self> {
        Self::with_clock(transport, SystemClock::new(), config)
    }
}

impl<T: Transport, C: Clock> Service<T, C> {
    /// Create a service with an explicit time source.
    ///
    /// A random nonzero connection id is drawn; the handshake handlers for
    /// message types 0 and 1 are registered before anything else.
    pub fn with_clock(transport: T, clock: C, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        // The extra trailer room lets a payload of exactly in_buf_size - 8
        // complete instead of stalling.
        let rx = RxBuffer::new(config.in_buf_size + TRAILER_SIZE);
        let tx = TxBuffer::new(config.out_buf_size);

        let mut service = Self {
            transport,
            clock,
            config,
            conn_id: random_conn_id(),
            remote_conn_id: 0,
            remote_conn_type: 0,
            remote_max_payload: None,
            connected: false,
            last_response_ms: None,
            next_connect_ms: None,
            connect_ids: MsgIdAllocator::host(),
            rx,
            tx,
            in_pos: 0,
            payload_size: 0,
            packet_size: 0,
            deadline: None,
            handlers: HandlerTable::default(),
            resets: ResetTable::default(),
            links: LinkTable::default(),
            dispatching: false,
            stats: ServiceStats::default(),
        };
        service.add_message_handler(CONNECT_REQUEST, ConnectHandler)?;
        service.add_message_handler(CONNECT_RESPONSE, ConnectResponseHandler)?;

        tracing::debug!(
            conn_id = service.conn_id,
            conn_type = service.config.conn_type,
            in_buf_size = service.config.in_buf_size,
            out_buf_size = service.config.out_buf_size,
            "service created"
        );
        Ok(service)
    }

    /// Replace the random connection id, for reproducible sessions.
    pub fn with_conn_id(mut self, conn_id: u32) -> Self {
        self.conn_id = conn_id;
        self
    }

    /// Register a closure for `msg_type`.
    ///
    /// Handlers accumulate; each matching packet reaches every handler for its
    /// type, most recent registration first.
    pub fn add_handler<F>(&mut self, msg_type: u8, handler: F) -> Result<()>
    where
        F: FnMut(&mut Service<T, C>, &Header) -> Result<()> + 'static,
    {
        self.add_message_handler(msg_type, handler)
    }

    /// Register a [`MsgHandler`] implementation for `msg_type`.
    pub fn add_message_handler<H>(&mut self, msg_type: u8, handler: H) -> Result<()>
    where
        H: MsgHandler<T, C> + 'static,
    {
        self.handlers.register(msg_type, Box::new(handler))
    }

    /// Register a callback for remote peer resets.
    pub fn add_reset_handler<H>(&mut self, handler: H) -> Result<()>
    where
        H: ResetHandler + 'static,
    {
        self.resets.register(Box::new(handler))
    }

    /// Register a callback for the link coming up or going down.
    pub fn add_link_handler<H>(&mut self, handler: H) -> Result<()>
    where
        H: LinkHandler + 'static,
    {
        self.links.register(Box::new(handler))
    }

    /// Number of handlers registered for `msg_type`.
    pub fn handler_count(&self, msg_type: u8) -> usize {
        self.handlers.count_for(msg_type)
    }

    /// Drain what the transport has buffered, dispatching every packet that
    /// completes. Returns the number of packets dispatched.
    ///
    /// Never blocks: each read asks for at most what the transport reports
    /// as available. A partial packet idle for longer than the stall timeout
    /// is abandoned when the next byte shows up. Completing or abandoning a
    /// packet also rewinds the transmit cursor.
    ///
    /// Calling `poll` from inside a handler fails with
    /// [`ServiceError::Reentrant`]. A transport that closes after packets
    /// were dispatched in this call yields the count; the next call reports
    /// [`TransportError::Closed`].
    pub fn poll(&mut self) -> Result<usize> {
        if self.dispatching {
            return Err(ServiceError::Reentrant);
        }

        let mut dispatched = 0;
        loop {
            let available = match self.transport.available() {
                Ok(available) => available,
                Err(TransportError::Closed) if dispatched > 0 => break,
                Err(err) => return Err(err.into()),
            };
            if available == 0 {
                break;
            }

            let now = self.clock.now_millis();
            if self.deadline.is_some_and(|deadline| now > deadline) {
                self.abandon_stalled();
            }
            self.deadline = Some(now.saturating_add(self.config.stall_timeout_ms));

            // Read the header first, then exactly the rest of the packet, so
            // the next frame's bytes stay in the transport.
            let wanted = if self.packet_size > 0 {
                self.packet_size - self.in_pos
            } else {
                HEADER_SIZE - self.in_pos
            };
            let count = available
                .min(self.rx.capacity() - self.in_pos)
                .min(wanted);
            if count == 0 {
                break;
            }

            let slot = self.rx.fill_slot(self.in_pos, count)?;
            let read = self.transport.read_bytes(slot)?.min(count);
            if read == 0 {
                break;
            }

            let before = self.in_pos;
            self.in_pos += read;
            if before < HEADER_SIZE && self.in_pos >= HEADER_SIZE {
                self.accept_header();
            }
            if self.packet_size > 0 && self.in_pos >= self.packet_size && self.complete_packet() {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    /// Frame the first `len` payload bytes of the transmit region and write
    /// them to the transport. The transmit cursor is rewound afterwards,
    /// whether or not the send succeeded.
    pub fn send(&mut self, msg_type: u8, msg_id: u8, len: usize) -> Result<()> {
        let result = self.write_frame(msg_type, msg_id, len);
        self.tx.reset();
        result
    }

    /// Send everything written through [`Service::tx`] since the last send.
    pub fn send_written(&mut self, msg_type: u8, msg_id: u8) -> Result<()> {
        let len = self.tx.payload_len();
        self.send(msg_type, msg_id, len)
    }

    /// Start a handshake by announcing this end to the peer.
    ///
    /// The peer's [`CONNECT_RESPONSE`] is handled by the built-in response
    /// handler, which records the remote limits.
    pub fn send_connect_request(&mut self, msg_id: u8) -> Result<()> {
        let request = self.local_connect_msg();
        self.tx.reset();
        request.write_to(&mut self.tx)?;
        self.send_written(CONNECT_REQUEST, msg_id)
    }

    /// Drive the requesting side of the handshake from the main loop.
    ///
    /// Sends a connect request while the link is down, at most once per
    /// `connect_interval_ms`. A checked link (`quiet_timeout_ms` set) keeps
    /// sending them while connected and is disconnected first when the last
    /// connect response is older than the quiet window. Returns whether a
    /// request went out.
    pub fn check_connection(&mut self) -> Result<bool> {
        let now = self.clock.now_millis();
        let quiet_timeout = self.config.quiet_timeout_ms;
        if let Some(quiet) = quiet_timeout {
            let silent = self
                .last_response_ms
                .is_some_and(|at| now.saturating_sub(at) > quiet);
            if self.connected && silent {
                tracing::warn!(
                    remote_conn_id = self.remote_conn_id,
                    quiet_ms = quiet,
                    "no connect response within quiet window"
                );
                self.disconnect();
            }
        }

        if self.connected && quiet_timeout.is_none() {
            return Ok(false);
        }
        if self.next_connect_ms.is_some_and(|due| now < due) {
            return Ok(false);
        }
        self.next_connect_ms = Some(now.saturating_add(self.config.connect_interval_ms));
        let msg_id = self.connect_ids.next_id();
        self.send_connect_request(msg_id)?;
        Ok(true)
    }

    /// Take the link down and forget the peer.
    ///
    /// A fresh connection id is drawn so the peer sees a new connection on
    /// the next handshake. Does nothing while not connected.
    pub fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        let previous = self.remote_conn_id;
        self.connected = false;
        self.remote_conn_id = 0;
        self.remote_max_payload = None;
        self.last_response_ms = None;
        self.next_connect_ms = None;
        self.conn_id = fresh_conn_id(self.conn_id);
        self.stats.disconnects += 1;
        tracing::info!(
            remote_conn_id = previous,
            conn_id = self.conn_id,
            "disconnected"
        );
        self.links.fire(LinkEvent::Disconnected { conn_id: previous });
    }

    /// True between a connect response and the next disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handshake payload describing this end.
    pub fn local_connect_msg(&self) -> ConnectMsg {
        ConnectMsg {
            conn_id: self.conn_id,
            max_payload: self.config.advertised_max_payload(),
            conn_type: self.config.conn_type,
        }
    }

    /// Transmit cursor.
    pub fn tx(&mut self) -> &mut TxBuffer {
        &mut self.tx
    }

    /// Receive cursor. Inside a handler it spans exactly the current payload.
    pub fn rx(&mut self) -> &mut RxBuffer {
        &mut self.rx
    }

    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn conn_type(&self) -> u16 {
        self.config.conn_type
    }

    /// Max payload this end advertises: `in_buf_size - 12`.
    pub fn max_payload(&self) -> u16 {
        self.config.advertised_max_payload()
    }

    /// Last connection id announced by the peer, 0 before any handshake.
    pub fn remote_conn_id(&self) -> u32 {
        self.remote_conn_id
    }

    pub fn remote_conn_type(&self) -> u16 {
        self.remote_conn_type
    }

    /// Peer receive limit, known once a connect response arrived.
    pub fn remote_max_payload(&self) -> Option<u16> {
        self.remote_max_payload
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Bytes of a partially received packet currently held.
    pub fn buffered(&self) -> usize {
        self.in_pos
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn record_remote(&mut self, conn_id: u32, conn_type: u16) {
        self.remote_conn_type = conn_type;
        if conn_id != self.remote_conn_id {
            tracing::info!(
                previous = self.remote_conn_id,
                conn_id,
                conn_type,
                "remote peer reset"
            );
            self.remote_conn_id = conn_id;
            self.stats.peer_resets += 1;
            self.resets.fire();
        }
    }

    pub(crate) fn accept_connect_response(&mut self, response: &ConnectMsg) {
        self.remote_max_payload = Some(response.max_payload);
        self.last_response_ms = Some(self.clock.now_millis());

        // A new id over a link that never went down means the peer restarted.
        if self.connected && response.conn_id != self.remote_conn_id {
            self.connected = false;
            self.links.fire(LinkEvent::Disconnected {
                conn_id: self.remote_conn_id,
            });
        }
        self.record_remote(response.conn_id, response.conn_type);

        if !self.connected {
            self.connected = true;
            self.stats.connects += 1;
            tracing::info!(
                remote_conn_id = response.conn_id,
                remote_conn_type = response.conn_type,
                remote_max_payload = response.max_payload,
                "connected"
            );
            self.links.fire(LinkEvent::Connected {
                conn_id: response.conn_id,
                conn_type: response.conn_type,
            });
        }
    }

    fn write_frame(&mut self, msg_type: u8, msg_id: u8, len: usize) -> Result<()> {
        if let Some(max) = self.remote_max_payload.filter(|max| *max > 0) {
            let max = usize::from(max);
            if len > max {
                return Err(FrameError::PayloadTooLarge { size: len, max }.into());
            }
        }

        let frame = self
            .tx
            .seal(msg_type, msg_id, len, self.config.integrity)?;
        let expected = frame.len();
        let written = self.transport.write(frame)?;
        if written < expected {
            return Err(TransportError::ShortWrite { written, expected }.into());
        }

        self.stats.frames_sent += 1;
        tracing::debug!(
            msg_type,
            kind = type_name(msg_type),
            msg_id,
            len,
            "frame sent"
        );
        Ok(())
    }

    fn reset_receive_state(&mut self) {
        self.payload_size = 0;
        self.packet_size = 0;
        self.in_pos = 0;
        self.rx.reset();
        self.tx.reset();
        self.deadline = None;
    }

    fn abandon_stalled(&mut self) {
        if self.in_pos > 0 {
            self.stats.stalls += 1;
            tracing::warn!(
                buffered = self.in_pos,
                expected = self.packet_size,
                timeout_ms = self.config.stall_timeout_ms,
                "partial packet stalled, discarding"
            );
        }
        self.reset_receive_state();
    }

    fn accept_header(&mut self) {
        match Header::decode(self.rx.raw()) {
            Ok(header) if header.payload_len() <= self.config.max_declared_len() => {
                self.payload_size = header.payload_len();
                self.packet_size = header.frame_len();
                return;
            }
            Ok(header) => {
                self.stats.oversize += 1;
                tracing::warn!(
                    msg_type = header.msg_type,
                    len = header.len,
                    max = self.config.max_declared_len(),
                    "declared payload exceeds receive region"
                );
            }
            Err(err) => {
                self.stats.bad_magic += 1;
                tracing::debug!(error = %err, "discarding bytes before frame start");
            }
        }
        self.resync();
    }

    /// Keep whatever follows the next start byte in the rejected header, or
    /// start over when there is none.
    fn resync(&mut self) {
        let next = self.rx.raw()[1..self.in_pos]
            .iter()
            .position(|byte| *byte == START_BYTE);
        match next {
            Some(offset) => {
                let skip = offset + 1;
                self.rx.discard_front(skip, self.in_pos);
                self.in_pos -= skip;
                self.payload_size = 0;
                self.packet_size = 0;
            }
            None => self.reset_receive_state(),
        }
    }

    fn complete_packet(&mut self) -> bool {
        let body_len = HEADER_SIZE + self.payload_size;
        let raw = self.rx.raw();
        let trailer = u16::from_le_bytes([raw[body_len], raw[body_len + 1]]);
        let header = Header::decode(raw);
        let verified = self.config.integrity.verify(&raw[..body_len], trailer);

        let delivered = match (header, verified) {
            (Ok(header), Ok(())) => {
                self.rx.open(self.payload_size);
                self.dispatch(&header);
                true
            }
            (_, Err(err)) => {
                self.stats.checksum_failures += 1;
                tracing::warn!(error = %err, "dropping packet with bad trailer");
                false
            }
            (Err(err), _) => {
                tracing::warn!(error = %err, "dropping packet with unreadable header");
                false
            }
        };
        self.reset_receive_state();
        delivered
    }

    fn dispatch(&mut self, header: &Header) {
        tracing::debug!(
            msg_type = header.msg_type,
            kind = type_name(header.msg_type),
            msg_id = header.msg_id,
            len = header.len,
            "dispatching packet"
        );

        // Handlers get `&mut self`, so the table is moved out for the round.
        // Anything registered meanwhile lands in the empty replacement.
        let mut handlers = std::mem::take(&mut self.handlers);
        self.dispatching = true;
        let outcome = handlers.dispatch(self, header);
        self.dispatching = false;
        let added = std::mem::replace(&mut self.handlers, handlers);
        self.handlers.append(added);

        self.stats.frames_dispatched += 1;
        self.stats.handler_errors += outcome.failed as u64;
        if outcome.matched == 0 {
            self.stats.frames_unhandled += 1;
            tracing::debug!(msg_type = header.msg_type, "no handler registered");
        }
    }
}

impl<T: fmt::Debug, C> fmt::Debug for Service<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("transport", &self.transport)
            .field("config", &self.config)
            .field("conn_id", &self.conn_id)
            .field("remote_conn_id", &self.remote_conn_id)
            .field("remote_conn_type", &self.remote_conn_type)
            .field("remote_max_payload", &self.remote_max_payload)
            .field("connected", &self.connected)
            .field("buffered", &self.in_pos)
            .field("packet_size", &self.packet_size)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn random_conn_id() -> u32 {
    rand::thread_rng().gen_range(1..=u32::MAX)
}

fn fresh_conn_id(previous: u32) -> u32 {
    loop {
        let conn_id = random_conn_id();
        if conn_id != previous {
            return conn_id;
        }
    }
}
