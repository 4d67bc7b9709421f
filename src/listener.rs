//! Control-plane UDP listener.
//!
//! Receives OSC control datagrams, decodes them and hands each request to the
//! client's session. A bad datagram is logged and dropped; the loop keeps going.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rosc::{decoder, OscMessage, OscPacket};

use crate::error::Result;
use crate::osc::control;
use crate::session::SessionRegistry;

const RECV_BUFFER_SIZE: usize = 4096;
const READ_TIMEOUT: Duration = Duration::from_millis(200);

pub struct ControlListener {
    socket: UdpSocket,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<AtomicBool>,
}

/// Running listener thread
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the loop and wait for the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Control listener thread panicked");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ControlListener {
    pub fn bind<A: ToSocketAddrs>(addr: A, registry: Arc<SessionRegistry>) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(Self {
            socket,
            registry,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until shut down. Blocks the calling thread.
    pub fn run(&self) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        log::info!(
            "Control listener on {}",
            self.socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "?".into())
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    log::trace!("{} bytes from {}", n, from);
                    self.handle_datagram(&buf[..n]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => {
                    log::warn!("Control socket receive failed: {}", e);
                }
            }
        }
        log::info!("Control listener stopped");
    }

    /// Run on a dedicated thread
    pub fn spawn(self) -> Result<ListenerHandle> {
        let local_addr = self.socket.local_addr()?;
        let shutdown = Arc::clone(&self.shutdown);
        let thread = thread::Builder::new()
            .name("control-listener".into())
            .spawn(move || self.run())?;
        Ok(ListenerHandle {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Decode and apply one datagram. Returns the number of requests applied.
    pub fn handle_datagram(&self, bytes: &[u8]) -> usize {
        let packet = match decoder::decode_udp(bytes) {
            Ok((_, packet)) => packet,
            Err(e) => {
                log::debug!("Dropping undecodable datagram: {:?}", e);
                return 0;
            }
        };

        let mut messages = Vec::new();
        flatten(packet, &mut messages);
        messages.iter().filter(|m| self.handle_message(m)).count()
    }

    fn handle_message(&self, msg: &OscMessage) -> bool {
        let command = match control::decode(msg) {
            Ok(command) => command,
            Err(e) => {
                log::debug!("Dropping {}: {}", msg.addr, e);
                return false;
            }
        };

        let session = match self.registry.get_or_create(command.client) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("No session for {}: {}", command.client, e);
                return false;
            }
        };

        let kind = command.request.kind();
        match session.apply(command.request) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} request from {} rejected: {}", kind, command.client, e);
                false
            }
        }
    }
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}
