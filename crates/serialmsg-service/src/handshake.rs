//! Connection handshake.
//!
//! Either side may send a [`CONNECT_REQUEST`] carrying its connection id,
//! the largest payload it can receive and its connection type. The receiver
//! records the sender's id and type, notifies reset handlers when the id
//! changed, and answers with a [`CONNECT_RESPONSE`] describing itself.

use serde::Serialize;
use serialmsg_frame::{Header, RxBuffer, TxBuffer, CONNECT_RESPONSE};
use serialmsg_transport::{Clock, Transport};

use crate::error::Result;
use crate::handler::MsgHandler;
use crate::service::Service;

/// Handshake payload, shared by request and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectMsg {
    pub conn_id: u32,
    pub max_payload: u16,
    pub conn_type: u16,
}

impl ConnectMsg {
    /// Encoded payload size.
    pub const SIZE: usize = 8;

    pub fn read_from(rx: &mut RxBuffer) -> Result<Self> {
        Ok(Self {
            conn_id: rx.read_u32()?,
            max_payload: rx.read_u16()?,
            conn_type: rx.read_u16()?,
        })
    }

    pub fn write_to(&self, tx: &mut TxBuffer) -> Result<()> {
        tx.write_u32(self.conn_id)?;
        tx.write_u16(self.max_payload)?;
        tx.write_u16(self.conn_type)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.conn_id.to_le_bytes());
        out[4..6].copy_from_slice(&self.max_payload.to_le_bytes());
        out[6..].copy_from_slice(&self.conn_type.to_le_bytes());
        out
    }

    /// Parse a raw payload; `None` when it is shorter than [`ConnectMsg::SIZE`].
    pub fn from_bytes(payload: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::SIZE] = payload.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self {
            conn_id: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            max_payload: u16::from_le_bytes([bytes[4], bytes[5]]),
            conn_type: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Built-in handler for [`CONNECT_REQUEST`](serialmsg_frame::CONNECT_REQUEST).
#[derive(Debug, Default)]
pub struct ConnectHandler;

impl<T: Transport, C: Clock> MsgHandler<T, C> for ConnectHandler {
    fn on_message(&mut self, service: &mut Service<T, C>, header: &Header) -> Result<()> {
        let request = ConnectMsg::read_from(service.rx())?;
        tracing::debug!(
            msg_id = header.msg_id,
            remote_conn_id = request.conn_id,
            remote_conn_type = request.conn_type,
            remote_max_payload = request.max_payload,
            "connect request"
        );
        service.record_remote(request.conn_id, request.conn_type);

        let response = service.local_connect_msg();
        service.tx().reset();
        response.write_to(service.tx())?;
        service.send_written(CONNECT_RESPONSE, 0)
    }
}

/// Built-in handler for [`CONNECT_RESPONSE`].
///
/// Learns the peer's receive limit so that [`Service::send`] can refuse
/// frames the peer would drop, and marks the link connected.
#[derive(Debug, Default)]
pub struct ConnectResponseHandler;

impl<T: Transport, C: Clock> MsgHandler<T, C> for ConnectResponseHandler {
    fn on_message(&mut self, service: &mut Service<T, C>, header: &Header) -> Result<()> {
        let response = ConnectMsg::read_from(service.rx())?;
        tracing::debug!(
            msg_id = header.msg_id,
            remote_conn_id = response.conn_id,
            remote_conn_type = response.conn_type,
            remote_max_payload = response.max_payload,
            "connect response"
        );
        service.accept_connect_response(&response);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_layout_is_little_endian() {
        let msg = ConnectMsg {
            conn_id: 0x0403_0201,
            max_payload: 0x0605,
            conn_type: 0x0807,
        };
        assert_eq!(msg.to_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ConnectMsg::from_bytes(&msg.to_bytes()), Some(msg));
    }

    #[test]
    fn short_payload_does_not_parse() {
        assert_eq!(ConnectMsg::from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn cursor_encoding_matches_bytes() {
        let msg = ConnectMsg {
            conn_id: 77,
            max_payload: 244,
            conn_type: 3,
        };
        let mut tx = TxBuffer::new(32);
        msg.write_to(&mut tx).unwrap();
        assert_eq!(tx.payload_mut(), &msg.to_bytes());
    }
}
