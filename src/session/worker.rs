//! One client session: owned request state, liveness timer, outbound socket.
//!
//! Lifecycle is `Active -> Ended`. A timer ticks every `liveness_period`; each
//! tick bumps the retry counter and the session ends once it exceeds
//! `max_retries`. Joint and hand-state updates reset the counter. Body-count
//! and high level requests do not.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::geometry::Plane;
use crate::osc::control::ControlRequest;
use crate::session::flags::{JointRef, PairRequest, Polygon, SessionConfig, MIN_POLYGON_VERTICES};
use crate::skeleton::{BodySlot, HandType, JointType};

pub const DEFAULT_LIVENESS_PERIOD: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub liveness_period: Duration,
    pub max_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            liveness_period: DEFAULT_LIVENESS_PERIOD,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Ended,
}

/// Called once from the timer thread when a session times out
pub type EndCallback = Box<dyn Fn(SocketAddr) + Send + 'static>;

struct LivenessTimer {
    stop: mpsc::Sender<()>,
    _handle: thread::JoinHandle<()>,
}

pub struct Session {
    client: SocketAddr,
    max_retries: u32,
    config: Mutex<Arc<SessionConfig>>,
    retries: AtomicU32,
    ended: AtomicBool,
    socket: Mutex<Option<UdpSocket>>,
    timer: Mutex<Option<LivenessTimer>>,
}

impl Session {
    /// Session with an outbound socket but no liveness timer
    pub fn new(client: SocketAddr, settings: SessionSettings) -> Result<Self> {
        let bind_addr = if client.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr)?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            config: Mutex::new(Arc::new(SessionConfig::new())),
            retries: AtomicU32::new(0),
            ended: AtomicBool::new(false),
            socket: Mutex::new(Some(socket)),
            timer: Mutex::new(None),
        })
    }

    /// Create the session and arm its liveness timer.
    ///
    /// `on_end` runs on the timer thread after a timeout has ended the session.
    pub fn start(client: SocketAddr, settings: SessionSettings, on_end: EndCallback) -> Result<Arc<Self>> {
        let session = Arc::new(Self::new(client, settings)?);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let weak: Weak<Session> = Arc::downgrade(&session);
        let period = settings.liveness_period;

        let handle = thread::Builder::new()
            .name(format!("liveness-{}", client))
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(session) = weak.upgrade() else { break };
                        if session.tick() {
                            on_end(session.client);
                            break;
                        }
                    }
                    // Stopped or sender dropped
                    _ => break,
                }
            })?;

        *session.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(LivenessTimer {
            stop: stop_tx,
            _handle: handle,
        });
        Ok(session)
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    pub fn state(&self) -> SessionState {
        if self.ended.load(Ordering::Acquire) {
            SessionState::Ended
        } else {
            SessionState::Active
        }
    }

    pub fn is_ended(&self) -> bool {
        self.state() == SessionState::Ended
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    /// One liveness period elapsed. Returns true if this tick ended the session.
    pub fn tick(&self) -> bool {
        if self.is_ended() {
            return false;
        }
        let retries = self.retries.fetch_add(1, Ordering::Relaxed) + 1;
        if retries > self.max_retries {
            log::info!(
                "No liveness update from {} for {} periods, ending session",
                self.client,
                self.max_retries
            );
            return self.end();
        }
        false
    }

    fn reset_liveness(&self) {
        self.retries.store(0, Ordering::Relaxed);
    }

    /// Stop the timer and release the socket. Only the first call does anything.
    pub fn end(&self) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            // The timer thread may already be gone
            let _ = timer.stop.send(());
        }
        self.socket.lock().unwrap_or_else(|e| e.into_inner()).take();
        log::info!("Session {} ended", self.client);
        true
    }

    /// Consistent view of the request state for one frame pass
    pub fn snapshot(&self) -> Arc<SessionConfig> {
        Arc::clone(&self.config.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Copy-on-write update; readers holding a snapshot keep the old one
    fn update<R>(&self, f: impl FnOnce(&mut SessionConfig) -> R) -> Result<R> {
        if self.is_ended() {
            return Err(SessionError::Ended(self.client));
        }
        let mut guard = self.config.lock().unwrap_or_else(|e| e.into_inner());
        Ok(f(Arc::make_mut(&mut guard)))
    }

    /// Send one encoded packet to the client
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let guard = self.socket.lock().unwrap_or_else(|e| e.into_inner());
        let socket = guard.as_ref().ok_or(SessionError::Ended(self.client))?;
        socket.send_to(bytes, self.client)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    pub fn set_joint_flags(&self, slot: BodySlot, flags: &[bool; JointType::COUNT]) -> Result<()> {
        self.update(|c| c.set_joint_flags(slot, flags))?;
        self.reset_liveness();
        log::debug!(
            "{}: body{} joints -> {} on",
            self.client,
            slot.wire(),
            flags.iter().filter(|&&f| f).count()
        );
        Ok(())
    }

    pub fn set_hand_flags(&self, slot: BodySlot, left: bool, right: bool) -> Result<()> {
        self.update(|c| {
            c.set_hand_flag(HandType::Left, slot, left);
            c.set_hand_flag(HandType::Right, slot, right);
        })?;
        self.reset_liveness();
        log::debug!("{}: body{} hands -> left={} right={}", self.client, slot.wire(), left, right);
        Ok(())
    }

    pub fn set_body_count_flag(&self, on: bool) -> Result<()> {
        self.update(|c| c.set_body_count_flag(on))?;
        log::debug!("{}: body count -> {}", self.client, on);
        Ok(())
    }

    fn pair(joints: &[JointRef], kind: &str) -> Result<PairRequest> {
        match joints {
            [from, to] => Ok(PairRequest::new(*from, *to)),
            _ => Err(SessionError::InvalidRequest(format!(
                "{} needs 2 joints, got {}",
                kind,
                joints.len()
            ))),
        }
    }

    pub fn set_vector_request(&self, joints: &[JointRef]) -> Result<()> {
        let request = Self::pair(joints, "vector")?;
        if self.update(|c| c.insert_vector_request(request))? {
            log::debug!("{}: vector {}:{}", self.client, request.from, request.to);
        }
        Ok(())
    }

    pub fn set_distance_request(&self, joints: &[JointRef]) -> Result<()> {
        let request = Self::pair(joints, "distance")?;
        if self.update(|c| c.insert_distance_request(request))? {
            log::debug!("{}: distance {}:{}", self.client, request.from, request.to);
        }
        Ok(())
    }

    pub fn set_area_request(&self, plane: Plane, polygon: Polygon) -> Result<()> {
        if polygon.len() < MIN_POLYGON_VERTICES {
            return Err(SessionError::InvalidRequest(format!(
                "{} needs at least {} joints, got {}",
                plane.address_name(),
                MIN_POLYGON_VERTICES,
                polygon.len()
            )));
        }
        let vertices = polygon.len();
        if self.update(|c| c.insert_area_request(plane, polygon))? {
            log::debug!("{}: {} with {} vertices", self.client, plane.address_name(), vertices);
        }
        Ok(())
    }

    fn require_joints(joints: &[JointRef], kind: &str) -> Result<()> {
        if joints.is_empty() {
            return Err(SessionError::InvalidRequest(format!("{} needs at least 1 joint", kind)));
        }
        Ok(())
    }

    pub fn set_speed_request(&self, joints: &[JointRef]) -> Result<()> {
        Self::require_joints(joints, "speed")?;
        self.update(|c| {
            for j in joints {
                c.insert_speed_request(*j);
            }
        })
    }

    pub fn set_acceleration_request(&self, joints: &[JointRef]) -> Result<()> {
        Self::require_joints(joints, "acceleration")?;
        self.update(|c| {
            for j in joints {
                c.insert_acceleration_request(*j);
            }
        })
    }

    /// Route a decoded control request to its setter
    pub fn apply(&self, request: ControlRequest) -> Result<()> {
        match request {
            ControlRequest::JointFlags { slot, flags } => self.set_joint_flags(slot, &flags),
            ControlRequest::HandFlags { slot, left, right } => self.set_hand_flags(slot, left, right),
            ControlRequest::BodyCount(on) => self.set_body_count_flag(on),
            ControlRequest::Vector(req) => self.set_vector_request(&[req.from, req.to]),
            ControlRequest::Distance(req) => self.set_distance_request(&[req.from, req.to]),
            ControlRequest::Area { plane, polygon } => self.set_area_request(plane, polygon),
            ControlRequest::Speed(joints) => self.set_speed_request(&joints),
            ControlRequest::Acceleration(joints) => self.set_acceleration_request(&joints),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn client() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn session() -> Session {
        Session::new(client(), SessionSettings::default()).unwrap()
    }

    fn jr(joint: JointType, slot: BodySlot) -> JointRef {
        JointRef::new(joint, slot)
    }

    #[test]
    fn test_initial_state() {
        let s = session();
        assert_eq!(s.client(), client());
        assert_eq!(s.state(), SessionState::Active);
        assert!(!s.snapshot().has_any_active_request());
    }

    #[test]
    fn test_set_joint_flags_all_then_none() {
        let s = session();
        s.set_joint_flags(BodySlot::First, &[true; JointType::COUNT]).unwrap();
        let config = s.snapshot();
        assert!(JointType::ALL.iter().all(|&j| config.joint_flag(j, BodySlot::First)));

        s.set_joint_flags(BodySlot::First, &[false; JointType::COUNT]).unwrap();
        assert!(!s.snapshot().has_any_active_request());
    }

    #[test]
    fn test_set_hand_flags() {
        let s = session();
        s.set_hand_flags(BodySlot::First, true, true).unwrap();
        let config = s.snapshot();
        assert!(config.hand_flag(HandType::Left, BodySlot::First));
        assert!(config.hand_flag(HandType::Right, BodySlot::First));
        assert!(!config.hand_flag(HandType::Left, BodySlot::Second));
    }

    #[test]
    fn test_snapshot_is_not_torn_by_later_updates() {
        let s = session();
        let req = [jr(JointType::HandLeft, BodySlot::First), jr(JointType::HandRight, BodySlot::Second)];
        let before = s.snapshot();
        s.set_vector_request(&req).unwrap();
        assert!(before.vector_requests().is_empty());
        assert_eq!(s.snapshot().vector_requests().len(), 1);
    }

    #[test]
    fn test_duplicate_requests_ignored() {
        let s = session();
        let pair = [jr(JointType::Head, BodySlot::First), jr(JointType::Head, BodySlot::Second)];
        s.set_vector_request(&pair).unwrap();
        s.set_vector_request(&pair).unwrap();
        s.set_distance_request(&pair).unwrap();
        s.set_distance_request(&pair).unwrap();
        let tri = vec![
            jr(JointType::HandLeft, BodySlot::First),
            jr(JointType::HandRight, BodySlot::First),
            jr(JointType::Head, BodySlot::First),
        ];
        s.set_area_request(Plane::XY, tri.clone()).unwrap();
        s.set_area_request(Plane::XY, tri).unwrap();

        let config = s.snapshot();
        assert_eq!(config.vector_requests().len(), 1);
        assert_eq!(config.distance_requests().len(), 1);
        assert_eq!(config.area_requests(Plane::XY).len(), 1);
    }

    #[test]
    fn test_setter_validation() {
        let s = session();
        assert!(s.set_vector_request(&[jr(JointType::Head, BodySlot::First)]).is_err());
        assert!(s
            .set_area_request(Plane::XZ, vec![jr(JointType::Head, BodySlot::First); 2])
            .is_err());
        assert!(s.set_speed_request(&[]).is_err());
        assert!(s.set_acceleration_request(&[]).is_err());
        assert!(!s.snapshot().has_any_active_request());
    }

    #[test]
    fn test_speed_request_stores_each_joint() {
        let s = session();
        let joints = [jr(JointType::Head, BodySlot::First), jr(JointType::Head, BodySlot::Second)];
        s.set_speed_request(&joints).unwrap();
        s.set_speed_request(&joints[..1]).unwrap();
        assert_eq!(s.snapshot().speed_requests().len(), 2);
    }

    #[test]
    fn test_liveness_reset_asymmetry() {
        let s = session();
        s.tick();
        s.tick();
        assert_eq!(s.retries(), 2);

        s.set_body_count_flag(true).unwrap();
        s.set_speed_request(&[jr(JointType::Head, BodySlot::First)]).unwrap();
        assert_eq!(s.retries(), 2);

        s.set_hand_flags(BodySlot::First, false, true).unwrap();
        assert_eq!(s.retries(), 0);

        s.tick();
        s.set_joint_flags(BodySlot::Second, &[false; JointType::COUNT]).unwrap();
        assert_eq!(s.retries(), 0);
    }

    #[test]
    fn test_tick_ends_after_retry_budget() {
        let s = session();
        assert!(!s.tick());
        assert!(!s.tick());
        assert_eq!(s.state(), SessionState::Active);
        assert!(s.tick());
        assert_eq!(s.state(), SessionState::Ended);
        assert!(!s.tick());
    }

    #[test]
    fn test_end_is_idempotent() {
        let s = session();
        assert!(s.end());
        assert!(!s.end());
        assert!(matches!(s.send(b"x"), Err(SessionError::Ended(_))));
        assert!(matches!(s.set_body_count_flag(true), Err(SessionError::Ended(_))));
    }

    #[test]
    fn test_apply_dispatch() {
        let s = session();
        s.apply(ControlRequest::BodyCount(true)).unwrap();
        s.apply(ControlRequest::Area {
            plane: Plane::YZ,
            polygon: vec![jr(JointType::Head, BodySlot::First); 3],
        })
        .unwrap();
        let config = s.snapshot();
        assert!(config.body_count_flag());
        assert_eq!(config.area_requests(Plane::YZ).len(), 1);
    }

    #[test]
    fn test_timer_ends_idle_session() {
        let settings = SessionSettings {
            liveness_period: Duration::from_millis(20),
            max_retries: 2,
        };
        let (tx, rx) = mpsc::channel();
        let s = Session::start(
            client(),
            settings,
            Box::new(move |addr| {
                let _ = tx.send(addr);
            }),
        )
        .unwrap();

        let ended = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(ended, client());
        assert!(s.is_ended());
    }

    #[test]
    fn test_timer_kept_alive_by_joint_updates() {
        let settings = SessionSettings {
            liveness_period: Duration::from_millis(20),
            max_retries: 2,
        };
        let s = Session::start(client(), settings, Box::new(|_| {})).unwrap();
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            s.set_joint_flags(BodySlot::First, &[false; JointType::COUNT]).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(s.state(), SessionState::Active);
        s.end();
    }
}
