//! Frame ingest: accepts one sensor bridge at a time and drives the pump.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};

use crate::error::FrameError;
use crate::protocol::{self, SensorMessage};
use crate::pump::{DataPump, FrameStats};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Totals for one bridge connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub frames: u64,
    pub messages: u64,
    pub bundles: u64,
}

impl ConnectionStats {
    fn add(&mut self, frame: FrameStats) {
        self.frames += 1;
        self.messages += frame.messages as u64;
        self.bundles += frame.bundles as u64;
    }
}

pub struct FrameServer {
    listener: TcpListener,
    pump: Arc<DataPump>,
}

impl FrameServer {
    pub async fn bind(addr: SocketAddr, pump: Arc<DataPump>) -> Result<Self, FrameError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, pump })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FrameError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept bridges forever, one connection at a time
    pub async fn run(self) -> Result<(), FrameError> {
        log::info!("Waiting for sensor bridge on {}", self.local_addr()?);
        loop {
            let (stream, addr) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            log::info!("Sensor bridge connected: {}", addr);

            match serve_connection(stream, &self.pump).await {
                Ok(stats) => log::info!(
                    "Sensor bridge {} disconnected after {} frames, waiting for next connection...",
                    addr,
                    stats.frames
                ),
                Err(e) => log::warn!("Sensor bridge {} dropped: {}", addr, e),
            }
        }
    }
}

/// Feed every frame from one connection through the pump until the peer closes.
pub async fn serve_connection(stream: TcpStream, pump: &DataPump) -> Result<ConnectionStats, FrameError> {
    let mut framed = protocol::message_stream(stream);
    let mut stats = ConnectionStats::default();
    let mut last_report = Instant::now();

    while let Some(msg) = protocol::recv_message::<SensorMessage>(&mut framed).await? {
        match msg {
            SensorMessage::Frame(frame) => {
                let frame_stats = tokio::task::block_in_place(|| pump.process_frame(&frame));
                stats.add(frame_stats);
            }
            SensorMessage::SetDancerSwap(swapped) => {
                pump.set_dancer_swap(swapped);
                log::info!("Dancer swap set to {} by bridge", swapped);
            }
        }

        if last_report.elapsed() >= STATS_INTERVAL {
            log::info!(
                "{} frames, {} messages in {} bundles so far",
                stats.frames,
                stats.messages,
                stats.bundles
            );
            last_report = Instant::now();
        }
    }
    Ok(stats)
}
