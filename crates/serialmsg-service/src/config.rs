use serde::{Deserialize, Serialize};
use serialmsg_frame::{Integrity, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD};

use crate::error::{Result, ServiceError};
use crate::handshake::ConnectMsg;

/// Default receive/transmit region size in bytes.
pub const DEFAULT_BUF_SIZE: usize = 256;

/// Default inactivity window after which a partial packet is abandoned.
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 5;

/// Default spacing between connect requests sent by
/// [`Service::check_connection`](crate::Service::check_connection).
pub const DEFAULT_CONNECT_INTERVAL_MS: u64 = 1_000;

/// Quiet window commonly used for checked links.
pub const DEFAULT_QUIET_TIMEOUT_MS: u64 = 3_000;

/// Smallest region that still holds a complete handshake frame.
pub const MIN_BUF_SIZE: usize = FRAME_OVERHEAD + ConnectMsg::SIZE;

/// Service construction parameters.
///
/// Serializable so the CLI and embedding applications can load it from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Application-defined connection type announced in the handshake.
    pub conn_type: u16,
    /// Receive region size. Declared payloads up to `in_buf_size - 8` are
    /// accepted; the handshake advertises `in_buf_size - 12`.
    pub in_buf_size: usize,
    /// Transmit region size, header and trailer included.
    pub out_buf_size: usize,
    /// Inactivity window in milliseconds before a partial packet is dropped.
    pub stall_timeout_ms: u64,
    /// Trailer mode for sent and received frames.
    pub integrity: Integrity,
    /// Minimum spacing between connect requests.
    pub connect_interval_ms: u64,
    /// Makes the link a checked one: connect requests keep going out while
    /// connected, and the connection is dropped when no connect response
    /// arrived within this many milliseconds. `None` keeps a connection
    /// until the peer restarts or [`Service::disconnect`](crate::Service::disconnect)
    /// is called.
    pub quiet_timeout_ms: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            conn_type: 0,
            in_buf_size: DEFAULT_BUF_SIZE,
            out_buf_size: DEFAULT_BUF_SIZE,
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
            integrity: Integrity::None,
            connect_interval_ms: DEFAULT_CONNECT_INTERVAL_MS,
            quiet_timeout_ms: None,
        }
    }
}

impl ServiceConfig {
    /// Config with the given region sizes and defaults elsewhere.
    pub fn with_buffers(in_buf_size: usize, out_buf_size: usize) -> Self {
        Self {
            in_buf_size,
            out_buf_size,
            ..Self::default()
        }
    }

    /// Check that both regions can carry a handshake and that every size
    /// derived from them fits the 16-bit length field.
    pub fn validate(&self) -> Result<()> {
        if self.in_buf_size < MIN_BUF_SIZE {
            return Err(ServiceError::InvalidConfig(format!(
                "in_buf_size {} is below the minimum of {MIN_BUF_SIZE}",
                self.in_buf_size
            )));
        }
        if self.in_buf_size > MAX_PAYLOAD + HEADER_SIZE {
            return Err(ServiceError::InvalidConfig(format!(
                "in_buf_size {} exceeds the maximum of {}",
                self.in_buf_size,
                MAX_PAYLOAD + HEADER_SIZE
            )));
        }
        if self.out_buf_size < MIN_BUF_SIZE {
            return Err(ServiceError::InvalidConfig(format!(
                "out_buf_size {} is below the minimum of {MIN_BUF_SIZE}",
                self.out_buf_size
            )));
        }
        if self.out_buf_size > MAX_PAYLOAD + FRAME_OVERHEAD {
            return Err(ServiceError::InvalidConfig(format!(
                "out_buf_size {} exceeds the maximum of {}",
                self.out_buf_size,
                MAX_PAYLOAD + FRAME_OVERHEAD
            )));
        }
        if self
            .quiet_timeout_ms
            .is_some_and(|quiet| quiet < self.connect_interval_ms)
        {
            return Err(ServiceError::InvalidConfig(format!(
                "quiet_timeout_ms must be at least connect_interval_ms ({})",
                self.connect_interval_ms
            )));
        }
        Ok(())
    }

    /// Largest declared payload length the receive side accepts.
    pub fn max_declared_len(&self) -> usize {
        self.in_buf_size.saturating_sub(HEADER_SIZE)
    }

    /// Max payload advertised to the peer in the handshake.
    pub fn advertised_max_payload(&self) -> u16 {
        let max = self.in_buf_size.saturating_sub(HEADER_SIZE + 4);
        u16::try_from(max).unwrap_or(u16::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.advertised_max_payload(), 244);
        assert_eq!(config.max_declared_len(), 248);
    }

    #[test]
    fn tiny_buffers_rejected() {
        let config = ServiceConfig::with_buffers(MIN_BUF_SIZE - 1, 64);
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig(msg)) if msg.contains("in_buf_size")
        ));

        let config = ServiceConfig::with_buffers(64, 9);
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig(msg)) if msg.contains("out_buf_size")
        ));
    }

    #[test]
    fn oversized_buffers_rejected() {
        let config = ServiceConfig::with_buffers(MAX_PAYLOAD + HEADER_SIZE + 1, 64);
        assert!(config.validate().is_err());

        let config = ServiceConfig::with_buffers(MAX_PAYLOAD + HEADER_SIZE, 64);
        assert!(config.validate().is_ok());
        assert_eq!(usize::from(config.advertised_max_payload()), MAX_PAYLOAD - 4);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"conn_type": 7, "integrity": "crc16"}"#).unwrap();
        assert_eq!(config.conn_type, 7);
        assert_eq!(config.in_buf_size, DEFAULT_BUF_SIZE);
        assert_eq!(config.stall_timeout_ms, DEFAULT_STALL_TIMEOUT_MS);
        assert_eq!(config.integrity, Integrity::Crc16);
        assert_eq!(config.connect_interval_ms, DEFAULT_CONNECT_INTERVAL_MS);
        assert_eq!(config.quiet_timeout_ms, None);
    }

    #[test]
    fn quiet_window_shorter_than_interval_rejected() {
        let config = ServiceConfig {
            quiet_timeout_ms: Some(500),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig(msg)) if msg.contains("quiet_timeout_ms")
        ));

        let config = ServiceConfig {
            quiet_timeout_ms: Some(DEFAULT_QUIET_TIMEOUT_MS),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
