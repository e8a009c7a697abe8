//! Dispatch table: message-type handlers, peer-reset and link callbacks.
//!
//! Registrations are never removed. Dispatch visits matching handlers from
//! the most recently registered to the oldest, so the built-in handshake
//! handler (registered at construction) always runs last for its type.

use serialmsg_frame::{type_name, Header};
use serialmsg_transport::{Clock, Transport};

use crate::error::Result;
use crate::service::Service;

/// Reacts to a complete incoming packet.
///
/// While `on_message` runs, `service.rx()` is positioned at the start of the
/// packet payload and `service.tx()` may be used to build and send replies.
/// The receive cursor is rewound for every handler, so each sees the whole
/// payload.
pub trait MsgHandler<T, C> {
    fn on_message(&mut self, service: &mut Service<T, C>, header: &Header) -> Result<()>;
}

impl<T, C, F> MsgHandler<T, C> for F
where
    F: FnMut(&mut Service<T, C>, &Header) -> Result<()>,
{
    fn on_message(&mut self, service: &mut Service<T, C>, header: &Header) -> Result<()> {
        self(service, header)
    }
}

/// Notified when the remote peer announces a new connection id.
pub trait ResetHandler {
    fn on_reset(&mut self);
}

impl<F: FnMut()> ResetHandler for F {
    fn on_reset(&mut self) {
        self()
    }
}

/// Connection state change seen by [`LinkHandler`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect response arrived while the link was down.
    Connected { conn_id: u32, conn_type: u16 },
    /// The link with `conn_id` went down: the peer went quiet, restarted, or
    /// the application disconnected.
    Disconnected { conn_id: u32 },
}

/// Notified when the handshake brings the link up or takes it down.
pub trait LinkHandler {
    fn on_link(&mut self, event: LinkEvent);
}

impl<F: FnMut(LinkEvent)> LinkHandler for F {
    fn on_link(&mut self, event: LinkEvent) {
        self(event)
    }
}

struct Registration<T, C> {
    msg_type: u8,
    handler: Box<dyn MsgHandler<T, C>>,
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DispatchOutcome {
    pub matched: usize,
    pub failed: usize,
}

pub(crate) struct HandlerTable<T, C> {
    entries: Vec<Registration<T, C>>,
}

impl<T, C> Default for HandlerTable<T, C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Transport, C: Clock> HandlerTable<T, C> {
    pub fn register(&mut self, msg_type: u8, handler: Box<dyn MsgHandler<T, C>>) -> Result<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(Registration { msg_type, handler });
        Ok(())
    }

    pub fn count_for(&self, msg_type: u8) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.msg_type == msg_type)
            .count()
    }

    /// Move registrations made during a dispatch round back behind the
    /// existing ones, keeping registration order.
    pub fn append(&mut self, added: HandlerTable<T, C>) {
        self.entries.extend(added.entries);
    }

    /// Run every handler registered for `header.msg_type`, newest first.
    ///
    /// A failing handler is logged and skipped over; the rest still run.
    pub fn dispatch(&mut self, service: &mut Service<T, C>, header: &Header) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for entry in self.entries.iter_mut().rev() {
            if entry.msg_type != header.msg_type {
                continue;
            }
            outcome.matched += 1;
            service.rx().rewind();
            if let Err(err) = entry.handler.on_message(service, header) {
                outcome.failed += 1;
                tracing::warn!(
                    msg_type = header.msg_type,
                    kind = type_name(header.msg_type),
                    msg_id = header.msg_id,
                    error = %err,
                    "message handler failed"
                );
            }
        }
        outcome
    }
}

#[derive(Default)]
pub(crate) struct ResetTable {
    entries: Vec<Box<dyn ResetHandler>>,
}

impl ResetTable {
    pub fn register(&mut self, handler: Box<dyn ResetHandler>) -> Result<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(handler);
        Ok(())
    }

    pub fn fire(&mut self) {
        for handler in self.entries.iter_mut().rev() {
            handler.on_reset();
        }
    }
}

#[derive(Default)]
pub(crate) struct LinkTable {
    entries: Vec<Box<dyn LinkHandler>>,
}

impl LinkTable {
    pub fn register(&mut self, handler: Box<dyn LinkHandler>) -> Result<()> {
        self.entries.try_reserve(1)?;
        self.entries.push(handler);
        Ok(())
    }

    pub fn fire(&mut self, event: LinkEvent) {
        for handler in self.entries.iter_mut().rev() {
            handler.on_link(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serialmsg_frame::HEADER_SIZE;
    use serialmsg_transport::{ManualClock, MemoryTransport};

    use super::*;
    use crate::config::ServiceConfig;

    type TestService = Service<MemoryTransport, ManualClock>;

    fn service_holding(payload: &[u8]) -> TestService {
        let mut service = Service::with_clock(
            MemoryTransport::new(),
            ManualClock::new(0),
            ServiceConfig::with_buffers(64, 64),
        )
        .unwrap();
        let rx = service.rx();
        rx.fill_slot(HEADER_SIZE, payload.len())
            .unwrap()
            .copy_from_slice(payload);
        rx.open(payload.len());
        service
    }

    #[test]
    fn dispatch_rewinds_payload_for_each_handler() {
        let mut service = service_holding(&[0x34, 0x12]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut table = HandlerTable::default();
        for _ in 0..2 {
            let seen = Rc::clone(&seen);
            table
                .register(
                    9,
                    Box::new(move |svc: &mut TestService, _: &Header| -> Result<()> {
                        seen.borrow_mut().push(svc.rx().read_u16()?);
                        Ok(())
                    }),
                )
                .unwrap();
        }

        let outcome = table.dispatch(&mut service, &Header::new(9, 0, 2));
        assert_eq!(outcome, DispatchOutcome { matched: 2, failed: 0 });
        assert_eq!(*seen.borrow(), vec![0x1234, 0x1234]);
    }

    #[test]
    fn dispatch_counts_failures_and_misses() {
        let mut service = service_holding(&[1]);
        let mut table: HandlerTable<MemoryTransport, ManualClock> = HandlerTable::default();
        table
            .register(
                9,
                Box::new(|svc: &mut TestService, _: &Header| -> Result<()> {
                    svc.rx().read_u32().map(drop).map_err(Into::into)
                }),
            )
            .unwrap();

        let outcome = table.dispatch(&mut service, &Header::new(9, 0, 1));
        assert_eq!(outcome, DispatchOutcome { matched: 1, failed: 1 });

        let outcome = table.dispatch(&mut service, &Header::new(10, 0, 1));
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(table.count_for(9), 1);
    }

    #[test]
    fn reset_callbacks_fire_newest_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut resets = ResetTable::default();
        for tag in [1, 2, 3] {
            let order = Rc::clone(&order);
            resets
                .register(Box::new(move || order.borrow_mut().push(tag)))
                .unwrap();
        }
        resets.fire();
        assert_eq!(*order.borrow(), vec![3, 2, 1]);
    }
}
