//! Host and device services talking over an in-memory link.
//!
//! The host brings the link up, queries three telemetry channels, then the
//! device goes silent and the checked link notices.
//!
//! Run with:
//!   cargo run --example host-device

use serialmsg::service::{LinkEvent, Service, ServiceConfig};
use serialmsg::transport::{ManualClock, MemoryTransport};

const TELEMETRY: u8 = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_end, device_end) = MemoryTransport::pair();
    let clock = ManualClock::new(0);

    let host_config = ServiceConfig {
        quiet_timeout_ms: Some(3_000),
        ..ServiceConfig::default()
    };
    let mut host = Service::with_clock(host_end, clock.clone(), host_config)?;
    let mut device =
        Service::with_clock(device_end, clock.clone(), ServiceConfig::with_buffers(64, 64))?;

    host.add_link_handler(|event: LinkEvent| eprintln!("[host] {event:?}"))?;
    device.add_reset_handler(|| eprintln!("[device] host announced a new connection"))?;

    // The device answers each request with the channel and a reading.
    device.add_handler(TELEMETRY, |svc, header| {
        let channel = svc.rx().read_u8()?;
        svc.tx().write_u8(channel)?;
        svc.tx().write_i16(i16::from(channel) * 10 - 40)?;
        svc.send_written(TELEMETRY, header.msg_id)
    })?;
    host.add_handler(TELEMETRY, |svc, header| {
        let channel = svc.rx().read_u8()?;
        let value = svc.rx().read_i16()?;
        eprintln!("[host] reply {} channel={channel} value={value}", header.msg_id);
        Ok(())
    })?;

    host.check_connection()?;
    device.poll()?;
    host.poll()?;
    eprintln!(
        "[host] connected={} device max payload={:?}",
        host.is_connected(),
        host.remote_max_payload()
    );

    for channel in 0..3u8 {
        host.tx().write_u8(channel)?;
        host.send_written(TELEMETRY, 10 + channel)?;
    }
    device.poll()?;
    host.poll()?;

    // Nobody polls the device from here on.
    for _ in 0..4 {
        clock.advance(1_000);
        host.check_connection()?;
    }
    eprintln!(
        "[host] connected={} frames sent={}",
        host.is_connected(),
        host.stats().frames_sent
    );
    Ok(())
}
