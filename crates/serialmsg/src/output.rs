use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialmsg_frame::{type_name, Header};
use serialmsg_service::{ConnectMsg, ServiceStats};

use crate::hex;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One dispatched frame as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    pub msg_type: u8,
    pub kind: &'static str,
    pub msg_id: u8,
    pub len: usize,
    pub payload: String,
    #[serde(skip)]
    pub raw_payload: Vec<u8>,
    pub received_at: u64,
}

impl FrameRecord {
    pub fn new(header: &Header, payload: &[u8]) -> Self {
        Self {
            msg_type: header.msg_type,
            kind: type_name(header.msg_type),
            msg_id: header.msg_id,
            len: payload.len(),
            payload: payload_preview(payload),
            raw_payload: payload.to_vec(),
            received_at: now_unix_seconds(),
        }
    }
}

/// A frame produced by `encode`.
#[derive(Debug, Clone, Serialize)]
pub struct EncodedFrame {
    pub msg_type: u8,
    pub msg_id: u8,
    pub len: usize,
    pub hex: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Both halves of a simulated handshake.
#[derive(Debug, Clone, Serialize)]
pub struct HandshakeReport {
    pub request: ConnectMsg,
    pub response: ConnectMsg,
    pub request_hex: String,
    pub response_hex: String,
    pub device_saw_reset: bool,
    pub host_connected: bool,
}

pub fn print_frames(frames: &[FrameRecord], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                print_json(frame);
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["TYPE", "KIND", "ID", "SIZE", "PAYLOAD"]);
            for frame in frames {
                table.add_row(vec![
                    frame.msg_type.to_string(),
                    frame.kind.to_string(),
                    frame.msg_id.to_string(),
                    frame.len.to_string(),
                    frame.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "type={} ({}) id={} size={} payload={}",
                    frame.msg_type, frame.kind, frame.msg_id, frame.len, frame.payload
                );
            }
        }
        OutputFormat::Raw => {
            for frame in frames {
                print_raw(&frame.raw_payload);
            }
        }
    }
}

pub fn print_stats(stats: &ServiceStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(stats),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for (name, value) in stat_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line = stat_rows(stats)
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("{line}");
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_encoded(frame: &EncodedFrame, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(frame),
        OutputFormat::Table => {
            let mut table = new_table(vec!["TYPE", "ID", "SIZE", "FRAME"]);
            table.add_row(vec![
                frame.msg_type.to_string(),
                frame.msg_id.to_string(),
                frame.len.to_string(),
                frame.hex.clone(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", frame.hex),
        OutputFormat::Raw => print_raw(&frame.bytes),
    }
}

pub fn print_handshake(report: &HandshakeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["DIRECTION", "CONN ID", "MAX PAYLOAD", "CONN TYPE"]);
            for (direction, msg) in [("request", &report.request), ("response", &report.response)]
            {
                table.add_row(vec![
                    direction.to_string(),
                    format!("0x{:08x}", msg.conn_id),
                    msg.max_payload.to_string(),
                    msg.conn_type.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("request:  {}", report.request_hex);
            println!("response: {}", report.response_hex);
            println!(
                "device: remote conn_id=0x{:08x} reset={}",
                report.request.conn_id, report.device_saw_reset
            );
            println!("host: connected={}", report.host_connected);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn stat_rows(stats: &ServiceStats) -> [(&'static str, u64); 11] {
    [
        ("frames_dispatched", stats.frames_dispatched),
        ("frames_unhandled", stats.frames_unhandled),
        ("frames_sent", stats.frames_sent),
        ("bad_magic", stats.bad_magic),
        ("oversize", stats.oversize),
        ("stalls", stats.stalls),
        ("checksum_failures", stats.checksum_failures),
        ("handler_errors", stats.handler_errors),
        ("peer_resets", stats.peer_resets),
        ("connects", stats.connects),
        ("disconnects", stats.disconnects),
    ]
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => hex::encode(payload, " "),
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
