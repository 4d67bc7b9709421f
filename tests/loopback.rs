//! End-to-end over loopback: control datagrams in, OSC bundles out.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rosc::{decoder, encoder, OscPacket, OscType};

use kinect_osc::listener::ControlListener;
use kinect_osc::osc::control::control_message;
use kinect_osc::pump::DataPump;
use kinect_osc::session::{SessionRegistry, SessionSettings};
use kinect_osc::skeleton::{Body, HandState, Position, SkeletalFrame};

fn send_control(to: SocketAddr, addr: &str, client: SocketAddr, payload: &str) {
    let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
    let bytes = encoder::encode(&OscPacket::Message(control_message(addr, client, payload))).unwrap();
    sock.send_to(&bytes, to).unwrap();
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn receive_messages(sock: &UdpSocket) -> Vec<rosc::OscMessage> {
    let mut buf = [0u8; 4096];
    let (n, _) = sock.recv_from(&mut buf).unwrap();
    let (_, packet) = decoder::decode_udp(&buf[..n]).unwrap();
    match packet {
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .filter_map(|p| match p {
                OscPacket::Message(m) => Some(m),
                OscPacket::Bundle(_) => None,
            })
            .collect(),
        OscPacket::Message(m) => vec![m],
    }
}

fn frame() -> SkeletalFrame {
    let mut first = Body::uniform(Position::new(0.0, 0.0, 0.0));
    first.hand_left = HandState::Closed;
    let second = Body::uniform(Position::new(3.0, 4.0, 5.0));
    SkeletalFrame::new(vec![first, second], 2)
}

#[test]
fn test_control_then_stream() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let client = receiver.local_addr().unwrap();

    let registry = Arc::new(SessionRegistry::default());
    let listener = ControlListener::bind("127.0.0.1:0", Arc::clone(&registry))
        .unwrap()
        .spawn()
        .unwrap();
    let control = listener.local_addr();

    // Garbage first; the listener must survive it
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .send_to(b"\x00\x01garbage", control)
        .unwrap();
    send_control(control, "/kinect/handstate/body1", client, "10");
    send_control(control, "/kinect/hld/distance", client, "body1/Head:body2/Head");

    assert!(wait_until(|| registry
        .get(&client)
        .map(|s| s.snapshot().distance_requests().len() == 1)
        .unwrap_or(false)));

    let pump = DataPump::new(Arc::clone(&registry));
    let stats = pump.process_frame(&frame());
    assert_eq!(stats.messages, 2);

    let messages = receive_messages(&receiver);
    let addrs: Vec<&str> = messages.iter().map(|m| m.addr.as_str()).collect();
    // Newest first
    assert_eq!(
        addrs,
        vec!["/kinect/hld/distance/body1/Head:body2/Head", "/kinect/handstate/body1/0"]
    );
    assert_eq!(messages[1].args, vec![OscType::Int(HandState::Closed.code())]);
    match messages[0].args[0] {
        OscType::Float(d) => assert!((d - 409f32.sqrt()).abs() < 1e-4),
        ref other => panic!("unexpected arg {:?}", other),
    }

    listener.shutdown();
}

#[test]
fn test_silent_client_is_dropped() {
    let registry = Arc::new(SessionRegistry::new(
        SessionSettings {
            liveness_period: Duration::from_millis(100),
            max_retries: 2,
        },
        20,
    ));
    let listener = ControlListener::bind("127.0.0.1:0", Arc::clone(&registry))
        .unwrap()
        .spawn()
        .unwrap();
    let client: SocketAddr = "127.0.0.1:9".parse().unwrap();

    // Body count alone does not keep a session alive
    send_control(listener.local_addr(), "/kinect/bodycount", client, "1");
    assert!(wait_until(|| registry.get(&client).is_some()));
    assert!(wait_until(|| registry.is_empty()));

    listener.shutdown();
}
