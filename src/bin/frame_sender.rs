//! Synthetic sensor bridge: streams two moving bodies to a kinect-osc server.
//!
//! Usage: frame_sender [server_addr] [fps]
//! Press 's' + Enter to flip the server's dancer swap.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use kinect_osc::protocol::{self, MessageStream, SensorMessage};
use kinect_osc::skeleton::{Body, HandState, JointType, Position, SkeletalFrame};

const DEFAULT_SERVER: &str = "127.0.0.1:9000";
const DEFAULT_FPS: u32 = 30;

const HAND_CYCLE: [HandState; 3] = [HandState::Open, HandState::Closed, HandState::Lasso];

/// A standing figure centred on `center`, arms swinging with phase `t`
fn figure(center: Position, t: f32) -> Body {
    let mut joints = [center; JointType::COUNT];
    for joint in JointType::ALL {
        let (dx, dy) = match joint {
            JointType::Head => (0.0, 0.6),
            JointType::Neck | JointType::SpineShoulder => (0.0, 0.45),
            JointType::SpineMid => (0.0, 0.2),
            JointType::ShoulderLeft => (-0.2, 0.4),
            JointType::ShoulderRight => (0.2, 0.4),
            JointType::ElbowLeft => (-0.35, 0.2 + 0.1 * t.sin()),
            JointType::ElbowRight => (0.35, 0.2 + 0.1 * t.cos()),
            JointType::WristLeft | JointType::HandLeft | JointType::HandTipLeft | JointType::ThumbLeft => {
                (-0.45, 0.3 * t.sin())
            }
            JointType::WristRight | JointType::HandRight | JointType::HandTipRight | JointType::ThumbRight => {
                (0.45, 0.3 * t.cos())
            }
            JointType::HipLeft => (-0.1, -0.05),
            JointType::HipRight => (0.1, -0.05),
            JointType::KneeLeft => (-0.12, -0.5),
            JointType::KneeRight => (0.12, -0.5),
            JointType::AnkleLeft | JointType::FootLeft => (-0.12, -0.9),
            JointType::AnkleRight | JointType::FootRight => (0.12, -0.9),
            JointType::SpineBase => (0.0, 0.0),
        };
        joints[joint.index()] = Position::new(center.x + dx, center.y + dy, center.z);
    }

    let mut body = Body::new(joints);
    let phase = (t / TAU * 2.0) as usize;
    body.hand_left = HAND_CYCLE[phase % HAND_CYCLE.len()];
    body.hand_right = HAND_CYCLE[(phase + 1) % HAND_CYCLE.len()];
    body
}

fn synthetic_frame(elapsed: f32) -> SkeletalFrame {
    let t = elapsed * 1.5;
    let a = figure(Position::new(-0.8 + 0.2 * (t * 0.3).sin(), 0.0, 2.5), t);
    let b = figure(Position::new(0.8, 0.0, 2.8 + 0.3 * (t * 0.2).cos()), t + 1.0);
    SkeletalFrame::new(vec![a, b], 2)
}

async fn stream_frames(
    stream: &mut MessageStream,
    fps: u32,
    swap_requested: &AtomicBool,
    swapped: &mut bool,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps.max(1) as f64));
    let start = Instant::now();
    let mut sent: u64 = 0;

    loop {
        ticker.tick().await;
        if swap_requested.swap(false, Ordering::Relaxed) {
            *swapped = !*swapped;
            protocol::send_message(stream, &SensorMessage::SetDancerSwap(*swapped)).await?;
            log::info!("Dancer swap -> {}", swapped);
        }
        let frame = synthetic_frame(start.elapsed().as_secs_f32());
        protocol::send_message(stream, &SensorMessage::Frame(frame)).await?;
        sent += 1;
        if sent % (fps as u64 * 10).max(1) == 0 {
            log::info!("{} frames sent", sent);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let server = args.next().unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let fps: u32 = match args.next() {
        Some(s) => s.parse().context("fps must be an integer")?,
        None => DEFAULT_FPS,
    };
    log::info!("frame_sender ({}) -> {} at {} fps", env!("GIT_VERSION"), server, fps);

    let swap_requested = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&swap_requested);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) if line.trim() == "s" => flag.store(true, Ordering::Relaxed),
                    Ok(_) => {}
                }
            }
        });
    }

    let mut swapped = false;
    loop {
        log::info!("Connecting to {}...", server);
        match tokio::net::TcpStream::connect(&server).await {
            Ok(tcp) => {
                tcp.set_nodelay(true)?;
                log::info!("Connected");
                let mut stream = protocol::message_stream(tcp);
                if let Err(e) = stream_frames(&mut stream, fps, &swap_requested, &mut swapped).await {
                    log::warn!("Stream ended: {:#}", e);
                }
            }
            Err(e) => log::warn!("Connection failed: {}", e),
        }
        log::info!("Reconnecting in 2s...");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
