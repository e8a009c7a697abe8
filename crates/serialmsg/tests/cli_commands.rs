#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::process::{Command, Output, Stdio};

fn serialmsg(args: &[&str], stdin: Option<&[u8]>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_serialmsg"))
        .args(["--log-level", "off"])
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serialmsg should start");

    {
        let mut pipe = child.stdin.take().expect("stdin should be piped");
        if let Some(bytes) = stdin {
            pipe.write_all(bytes).expect("stdin should accept input");
        }
    }
    child.wait_with_output().expect("serialmsg should finish")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn encode_prints_frame_hex() {
    let output = serialmsg(
        &["--format", "pretty", "encode", "--type", "5", "--id", "2", "--data", "hi"],
        None,
    );
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "23 05 02 00 02 00 00 00 68 69 00 00");
}

#[test]
fn encode_then_decode_round_trips() {
    let encoded = serialmsg(
        &["--format", "raw", "encode", "--type", "9", "--id", "4", "--data", "ping"],
        None,
    );
    assert!(encoded.status.success());

    let mut capture = vec![0x00, 0x11];
    capture.extend_from_slice(&encoded.stdout);
    capture.extend_from_slice(&encoded.stdout);

    let decoded = serialmsg(&["--format", "json", "decode"], Some(&capture));
    assert!(decoded.status.success());

    let lines: Vec<serde_json::Value> = stdout(&decoded)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["msg_type"], 9);
    assert_eq!(lines[0]["msg_id"], 4);
    assert_eq!(lines[0]["payload"], "ping");
    assert_eq!(lines[2]["frames_dispatched"], 2);
    assert!(lines[2]["bad_magic"].as_u64().unwrap_or(0) >= 1);
}

#[test]
fn decode_hex_input_with_crc() {
    let encoded = serialmsg(
        &["--format", "pretty", "encode", "--type", "3", "--crc", "--hex", "aa bb"],
        None,
    );
    assert!(encoded.status.success());
    let hex = stdout(&encoded);

    let decoded = serialmsg(
        &["--format", "json", "decode", "--hex", "--crc", "--no-stats"],
        Some(hex.as_bytes()),
    );
    assert!(decoded.status.success());
    let frame: serde_json::Value =
        serde_json::from_str(stdout(&decoded).trim()).expect("frame should be JSON");
    assert_eq!(frame["msg_type"], 3);
    assert_eq!(frame["payload"], "aa bb");

    // Without --crc the nonzero trailer is simply ignored.
    let lenient = serialmsg(
        &["--format", "json", "decode", "--hex", "--no-stats"],
        Some(hex.as_bytes()),
    );
    assert!(lenient.status.success());
}

#[test]
fn decode_garbage_returns_60() {
    let output = serialmsg(&["--format", "json", "decode"], Some(b"no frames here"));
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn decode_rejects_tiny_buffers_with_64() {
    let output = serialmsg(&["decode", "--in-buf-size", "4"], Some(b""));
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("in_buf_size"));
}

#[test]
fn handshake_reports_json() {
    let output = serialmsg(
        &[
            "--format",
            "json",
            "handshake",
            "--conn-id",
            "0x1234",
            "--conn-type",
            "2",
            "--device-conn-id",
            "99",
            "--device-in-buf-size",
            "128",
        ],
        None,
    );
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_str(stdout(&output).trim()).expect("report should be JSON");
    assert_eq!(report["request"]["conn_id"], 0x1234);
    assert_eq!(report["request"]["conn_type"], 2);
    assert_eq!(report["response"]["conn_id"], 99);
    assert_eq!(report["response"]["max_payload"], 116);
    assert_eq!(report["device_saw_reset"], true);
    assert_eq!(report["host_connected"], true);
}

#[test]
fn listen_missing_device_returns_66() {
    let output = serialmsg(&["listen", "/dev/serialmsg-does-not-exist"], None);
    assert_eq!(output.status.code(), Some(66));
}

#[test]
fn version_prints_name() {
    let output = serialmsg(&["version"], None);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("serialmsg "));

    let extended = serialmsg(&["version", "--extended"], None);
    assert!(stdout(&extended).contains("stall_timeout_ms=5"));
}
