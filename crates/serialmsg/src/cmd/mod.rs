use clap::{Args, Subcommand};
use std::fs;
use std::path::PathBuf;

use serialmsg_frame::Integrity;
use serialmsg_service::ServiceConfig;

use crate::exit::{io_error, service_error, CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod handshake;
#[cfg(unix)]
pub mod listen;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one frame and print its bytes.
    Encode(EncodeArgs),
    /// Run captured bytes through the receive path and print every frame.
    Decode(DecodeArgs),
    /// Simulate a connect request against an in-memory device.
    Handshake(HandshakeArgs),
    /// Open a serial device, answer handshakes and print received frames.
    #[cfg(unix)]
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Handshake(args) => handshake::run(args, format),
        #[cfg(unix)]
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Service settings shared by every command that builds a [`ServiceConfig`].
#[derive(Args, Debug, Default)]
pub struct ServiceArgs {
    /// JSON file with a service configuration; flags below override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Receive region size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub in_buf_size: Option<usize>,
    /// Transmit region size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub out_buf_size: Option<usize>,
    /// Partial-packet stall timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    pub stall_timeout_ms: Option<u64>,
    /// Connection type announced in handshakes.
    #[arg(long, value_name = "TYPE")]
    pub conn_type: Option<u16>,
    /// Write and verify CRC-16 trailers instead of zero trailers.
    #[arg(long)]
    pub crc: bool,
    /// Treat the link as checked: drop the peer after this many quiet
    /// milliseconds without a connect response.
    #[arg(long, value_name = "MS")]
    pub quiet_timeout_ms: Option<u64>,
}

impl ServiceArgs {
    pub fn to_config(&self) -> CliResult<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|err| {
                    io_error(&format!("failed reading {}", path.display()), err)
                })?;
                serde_json::from_str(&text).map_err(|err| {
                    CliError::new(
                        DATA_INVALID,
                        format!("{} is not a valid service config: {err}", path.display()),
                    )
                })?
            }
            None => ServiceConfig::default(),
        };

        if let Some(size) = self.in_buf_size {
            config.in_buf_size = size;
        }
        if let Some(size) = self.out_buf_size {
            config.out_buf_size = size;
        }
        if let Some(ms) = self.stall_timeout_ms {
            config.stall_timeout_ms = ms;
        }
        if let Some(conn_type) = self.conn_type {
            config.conn_type = conn_type;
        }
        if self.crc {
            config.integrity = Integrity::Crc16;
        }
        if let Some(ms) = self.quiet_timeout_ms {
            config.quiet_timeout_ms = Some(ms);
        }

        config
            .validate()
            .map_err(|err| service_error("bad service settings", err))?;
        Ok(config)
    }
}

/// Payload sources for `encode`.
#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Payload as a UTF-8 string.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Payload as hex digits.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read the payload from a file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Message type.
    #[arg(long = "type", short = 't')]
    pub msg_type: u8,
    /// Message id.
    #[arg(long = "id", short = 'i', default_value = "0")]
    pub msg_id: u8,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Write a CRC-16 trailer.
    #[arg(long)]
    pub crc: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured bytes; stdin when omitted.
    pub input: Option<PathBuf>,
    /// Treat the input as hex text.
    #[arg(long)]
    pub hex: bool,
    /// Do not print the counters after the frames.
    #[arg(long)]
    pub no_stats: bool,
    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug)]
pub struct HandshakeArgs {
    /// Connection id the simulated host announces.
    #[arg(long, value_parser = parse_u32, default_value = "1")]
    pub conn_id: u32,
    /// Connection type the simulated host announces.
    #[arg(long, default_value = "0")]
    pub conn_type: u16,
    /// Connection id of the simulated device.
    #[arg(long, value_parser = parse_u32)]
    pub device_conn_id: Option<u32>,
    /// Connection type of the simulated device.
    #[arg(long, default_value = "0")]
    pub device_conn_type: u16,
    /// Receive region size of the simulated device.
    #[arg(long, default_value = "256")]
    pub device_in_buf_size: usize,
}

#[cfg(unix)]
#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device or FIFO to open, e.g. /dev/ttyACM0.
    pub device: PathBuf,
    /// Keep requesting a handshake until the device answers.
    #[arg(long)]
    pub connect: bool,
    /// Only print frames of these types (comma-separated).
    #[arg(long = "types", value_delimiter = ',')]
    pub msg_types: Option<Vec<u8>>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Sleep between empty polls, in milliseconds.
    #[arg(long, default_value = "1")]
    pub idle_ms: u64,
    #[command(flatten)]
    pub service: ServiceArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Accept decimal or `0x`-prefixed hex.
fn parse_u32(input: &str) -> Result<u32, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid connection id {input:?}: {err}"))
}
