use std::cell::Cell;
use std::rc::Rc;

use bytes::BytesMut;
use serialmsg_frame::{decode_frame, Integrity};
use serialmsg_service::{ConnectMsg, Service, ServiceConfig};
use serialmsg_transport::{ManualClock, MemoryTransport};

use crate::cmd::HandshakeArgs;
use crate::exit::{frame_error, service_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::hex;
use crate::output::{print_handshake, HandshakeReport, OutputFormat};

pub fn run(args: HandshakeArgs, format: OutputFormat) -> CliResult<i32> {
    let report = simulate(&args)?;
    print_handshake(&report, format);
    Ok(SUCCESS)
}

fn simulate(args: &HandshakeArgs) -> CliResult<HandshakeReport> {
    // Separate links so the bytes in each direction can be captured.
    let host_end = MemoryTransport::new();
    let device_end = MemoryTransport::new();
    let clock = ManualClock::default();

    let host_config = ServiceConfig {
        conn_type: args.conn_type,
        ..ServiceConfig::default()
    };
    let mut host = Service::with_clock(host_end.clone(), clock.clone(), host_config)
        .map_err(|err| service_error("host setup failed", err))?
        .with_conn_id(args.conn_id);

    let device_config = ServiceConfig {
        conn_type: args.device_conn_type,
        in_buf_size: args.device_in_buf_size,
        ..ServiceConfig::default()
    };
    let mut device = Service::with_clock(device_end.clone(), clock, device_config)
        .map_err(|err| service_error("device setup failed", err))?;
    if let Some(conn_id) = args.device_conn_id {
        device = device.with_conn_id(conn_id);
    }

    let reset_seen = Rc::new(Cell::new(false));
    let flag = Rc::clone(&reset_seen);
    device
        .add_reset_handler(move || flag.set(true))
        .map_err(|err| service_error("reset handler registration failed", err))?;

    host.check_connection()
        .map_err(|err| service_error("connect request failed", err))?;
    let request_bytes = host_end.take_written();
    device_end.feed(&request_bytes);
    device
        .poll()
        .map_err(|err| service_error("device poll failed", err))?;
    let response_bytes = device_end.take_written();
    host_end.feed(&response_bytes);
    host.poll()
        .map_err(|err| service_error("host poll failed", err))?;

    Ok(HandshakeReport {
        request: parse_connect(&request_bytes)?,
        response: parse_connect(&response_bytes)?,
        request_hex: hex::encode(&request_bytes, " "),
        response_hex: hex::encode(&response_bytes, " "),
        device_saw_reset: reset_seen.get(),
        host_connected: host.is_connected(),
    })
}

fn parse_connect(bytes: &[u8]) -> CliResult<ConnectMsg> {
    let mut buf = BytesMut::from(bytes);
    let frame = decode_frame(&mut buf, usize::from(u16::MAX), Integrity::None)
        .map_err(|err| frame_error("handshake frame unreadable", err))?
        .ok_or_else(|| CliError::new(INTERNAL, "handshake frame incomplete"))?;
    ConnectMsg::from_bytes(&frame.payload)
        .ok_or_else(|| CliError::new(INTERNAL, "handshake payload too short"))
}
