//! Connection handshake between two services and against raw bytes.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::BytesMut;
use serialmsg_frame::{
    decode_frame, encode_frame, Integrity, CONNECT_REQUEST, CONNECT_RESPONSE, HEADER_SIZE,
};
use serialmsg_service::{ConnectMsg, Service, ServiceConfig};
use serialmsg_transport::{ManualClock, MemoryTransport};

type TestService = Service<MemoryTransport, ManualClock>;

fn service(transport: MemoryTransport, conn_id: u32, conn_type: u16, in_buf: usize) -> TestService {
    let config = ServiceConfig {
        conn_type,
        ..ServiceConfig::with_buffers(in_buf, 128)
    };
    Service::with_clock(transport, ManualClock::new(0), config)
        .unwrap()
        .with_conn_id(conn_id)
}

fn connect_frame(msg_type: u8, msg: ConnectMsg) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_frame(msg_type, 0, &msg.to_bytes(), Integrity::None, &mut buf).unwrap();
    buf.to_vec()
}

fn reset_counter(service: &mut TestService) -> Rc<RefCell<u32>> {
    let count = Rc::new(RefCell::new(0));
    let hook = Rc::clone(&count);
    service
        .add_reset_handler(move || *hook.borrow_mut() += 1)
        .unwrap();
    count
}

#[test]
fn request_is_answered_with_local_description() {
    let transport = MemoryTransport::new();
    let mut device = service(transport.clone(), 0xAABB_CCDD, 4, 64);

    let request = ConnectMsg {
        conn_id: 1234,
        max_payload: 500,
        conn_type: 9,
    };
    transport.feed(&connect_frame(CONNECT_REQUEST, request));
    assert_eq!(device.poll().unwrap(), 1);

    assert_eq!(device.remote_conn_id(), 1234);
    assert_eq!(device.remote_conn_type(), 9);

    let mut written = BytesMut::from(&transport.take_written()[..]);
    let response = decode_frame(&mut written, 64, Integrity::None)
        .unwrap()
        .expect("complete response frame");
    assert_eq!(response.msg_type(), CONNECT_RESPONSE);
    assert_eq!(response.msg_id(), 0);
    assert_eq!(
        ConnectMsg::from_bytes(&response.payload),
        Some(ConnectMsg {
            conn_id: 0xAABB_CCDD,
            max_payload: 64 - HEADER_SIZE as u16 - 4,
            conn_type: 4,
        })
    );
    assert!(written.is_empty());
}

#[test]
fn reset_handlers_fire_only_on_new_conn_id() {
    let transport = MemoryTransport::new();
    let mut device = service(transport.clone(), 1, 0, 64);
    let resets = reset_counter(&mut device);

    let first = ConnectMsg {
        conn_id: 7,
        max_payload: 100,
        conn_type: 1,
    };
    transport.feed(&connect_frame(CONNECT_REQUEST, first));
    device.poll().unwrap();
    assert_eq!(*resets.borrow(), 1);

    transport.feed(&connect_frame(CONNECT_REQUEST, first));
    device.poll().unwrap();
    assert_eq!(*resets.borrow(), 1);

    transport.feed(&connect_frame(CONNECT_REQUEST, ConnectMsg { conn_id: 8, ..first }));
    device.poll().unwrap();
    assert_eq!(*resets.borrow(), 2);
    assert_eq!(device.stats().peer_resets, 2);

    // one response per request
    let mut written = BytesMut::from(&transport.take_written()[..]);
    let mut responses = 0;
    while decode_frame(&mut written, 64, Integrity::None).unwrap().is_some() {
        responses += 1;
    }
    assert_eq!(responses, 3);
}

#[test]
fn reset_handlers_run_newest_first() {
    let transport = MemoryTransport::new();
    let mut device = service(transport.clone(), 1, 0, 64);
    let order = Rc::new(RefCell::new(Vec::new()));
    for tag in [1, 2, 3] {
        let order = Rc::clone(&order);
        device
            .add_reset_handler(move || order.borrow_mut().push(tag))
            .unwrap();
    }

    let request = ConnectMsg {
        conn_id: 55,
        max_payload: 10,
        conn_type: 0,
    };
    transport.feed(&connect_frame(CONNECT_REQUEST, request));
    device.poll().unwrap();
    assert_eq!(*order.borrow(), vec![3, 2, 1]);
}

#[test]
fn user_handler_for_connect_runs_before_builtin() {
    let transport = MemoryTransport::new();
    let mut device = service(transport.clone(), 1, 0, 64);
    let seen_remote = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&seen_remote);
    device
        .add_handler(CONNECT_REQUEST, move |svc, _| {
            *seen.borrow_mut() = Some((svc.remote_conn_id(), svc.rx().read_u32()?));
            Ok(())
        })
        .unwrap();

    let request = ConnectMsg {
        conn_id: 99,
        max_payload: 10,
        conn_type: 0,
    };
    transport.feed(&connect_frame(CONNECT_REQUEST, request));
    device.poll().unwrap();

    assert_eq!(*seen_remote.borrow(), Some((0, 99)));
    assert_eq!(device.remote_conn_id(), 99);
    assert_eq!(device.stats().handler_errors, 0);
}

#[test]
fn short_connect_payload_is_ignored() {
    let transport = MemoryTransport::new();
    let mut device = service(transport.clone(), 1, 0, 64);

    let mut buf = BytesMut::new();
    encode_frame(CONNECT_REQUEST, 0, &[1, 2, 3], Integrity::None, &mut buf).unwrap();
    transport.feed(&buf);
    device.poll().unwrap();

    assert_eq!(device.remote_conn_id(), 0);
    assert_eq!(device.stats().handler_errors, 1);
    assert!(transport.take_written().is_empty());
}

#[test]
fn host_and_device_exchange_limits() {
    let (host_end, device_end) = MemoryTransport::pair();
    let mut host = service(host_end, 0x1111, 100, 128);
    let mut device = service(device_end, 0x2222, 200, 64);
    let host_resets = reset_counter(&mut host);
    let device_resets = reset_counter(&mut device);

    host.send_connect_request(1).unwrap();
    assert_eq!(device.poll().unwrap(), 1);
    assert_eq!(host.poll().unwrap(), 1);

    assert_eq!(device.remote_conn_id(), 0x1111);
    assert_eq!(device.remote_conn_type(), 100);
    assert_eq!(device.remote_max_payload(), None);
    assert_eq!(host.remote_conn_id(), 0x2222);
    assert_eq!(host.remote_conn_type(), 200);
    assert_eq!(host.remote_max_payload(), Some(52));
    assert_eq!(*host_resets.borrow(), 1);
    assert_eq!(*device_resets.borrow(), 1);

    // The host now refuses payloads the device would drop.
    host.tx().write_bytes(&[0u8; 53]).unwrap();
    assert!(host.send_written(5, 2).is_err());
    host.tx().write_bytes(&[0u8; 52]).unwrap();
    host.send_written(5, 3).unwrap();

    let got = Rc::new(RefCell::new(0usize));
    let sink = Rc::clone(&got);
    device
        .add_handler(5, move |svc, _| {
            *sink.borrow_mut() = svc.rx().payload_len();
            Ok(())
        })
        .unwrap();
    assert_eq!(device.poll().unwrap(), 1);
    assert_eq!(*got.borrow(), 52);
}

#[test]
fn device_restart_is_detected_by_host() {
    let (host_end, device_end) = MemoryTransport::pair();
    let mut host = service(host_end, 0x1111, 0, 128);
    let resets = reset_counter(&mut host);

    let mut device = service(device_end.clone(), 0x2222, 0, 64);
    host.send_connect_request(1).unwrap();
    device.poll().unwrap();
    host.poll().unwrap();
    assert_eq!(*resets.borrow(), 1);

    // A rebooted device comes back with a fresh id.
    drop(device);
    let mut rebooted = service(device_end, 0x3333, 0, 64);
    host.send_connect_request(2).unwrap();
    rebooted.poll().unwrap();
    host.poll().unwrap();

    assert_eq!(host.remote_conn_id(), 0x3333);
    assert_eq!(*resets.borrow(), 2);
}
