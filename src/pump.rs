//! Per-frame fan-out to every session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rosc::OscMessage;

use crate::geometry::{self, Plane};
use crate::osc::address;
use crate::osc::bundle::{encode_bundle, BundleBuilder, MAX_BUNDLE_SIZE, MESSAGE_SIZE_ESTIMATE};
use crate::session::{Session, SessionConfig, SessionRegistry};
use crate::skeleton::{HandType, SkeletalFrame, SlottedBodies};

/// Counters for one `process_frame` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub sessions: usize,
    pub messages: usize,
    pub bundles: usize,
}

pub struct DataPump {
    registry: Arc<SessionRegistry>,
    dancer_swap: Arc<AtomicBool>,
    max_bundle_size: usize,
    message_size_estimate: usize,
}

impl DataPump {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self::with_bundle_limits(registry, MAX_BUNDLE_SIZE, MESSAGE_SIZE_ESTIMATE)
    }

    pub fn with_bundle_limits(
        registry: Arc<SessionRegistry>,
        max_bundle_size: usize,
        message_size_estimate: usize,
    ) -> Self {
        Self {
            registry,
            dancer_swap: Arc::new(AtomicBool::new(false)),
            max_bundle_size,
            message_size_estimate,
        }
    }

    /// Shared flag for the operator console and the frame source
    pub fn dancer_swap_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dancer_swap)
    }

    pub fn dancer_swap(&self) -> bool {
        self.dancer_swap.load(Ordering::Relaxed)
    }

    pub fn set_dancer_swap(&self, swapped: bool) {
        self.dancer_swap.store(swapped, Ordering::Relaxed);
    }

    /// Flip the orientation and return the new value
    pub fn toggle_dancer_swap(&self) -> bool {
        !self.dancer_swap.fetch_xor(true, Ordering::Relaxed)
    }

    /// Evaluate every session's requests against `frame` and send the results.
    pub fn process_frame(&self, frame: &SkeletalFrame) -> FrameStats {
        let bodies = frame.slots(self.dancer_swap());
        let mut stats = FrameStats::default();

        for session in self.registry.sessions() {
            if session.is_ended() {
                continue;
            }
            let config = session.snapshot();
            let builder = BundleBuilder::new(self.max_bundle_size, self.message_size_estimate);
            for msg in session_messages(&config, &bodies, frame.visible_bodies) {
                builder.add_message(msg);
                stats.messages += 1;
            }
            stats.bundles += send_bundles(&session, &builder);
            stats.sessions += 1;
        }
        stats
    }
}

/// Encode and send everything in `builder`. Returns the number of bundles sent.
fn send_bundles(session: &Session, builder: &BundleBuilder) -> usize {
    let mut sent = 0;
    for bundle in builder.build_bundles() {
        let result = encode_bundle(&bundle).and_then(|bytes| session.send(&bytes));
        match result {
            Ok(()) => sent += 1,
            Err(e) => log::warn!("Send to {} failed: {}", session.client(), e),
        }
    }
    sent
}

/// Messages one session asked for, in emission order
pub fn session_messages(
    config: &SessionConfig,
    bodies: &SlottedBodies<'_>,
    visible_bodies: u32,
) -> Vec<OscMessage> {
    let mut out = Vec::new();

    for (slot, body) in bodies.present() {
        for joint in config.joints_for(slot) {
            out.push(address::joint_message(joint, slot, body.joint(joint)));
        }
    }

    for (slot, body) in bodies.present() {
        for hand in HandType::ALL {
            if config.hand_flag(hand, slot) {
                out.push(address::hand_state_message(hand, slot, body.hand(hand)));
            }
        }
    }

    if config.body_count_flag() {
        out.push(address::body_count_message(visible_bodies));
    }

    for request in config.vector_requests() {
        if let Some(v) = geometry::evaluate_vector(bodies, request) {
            out.push(address::vector_message(request, v));
        }
    }
    for request in config.distance_requests() {
        if let Some(d) = geometry::evaluate_distance(bodies, request) {
            out.push(address::distance_message(request, d));
        }
    }
    for plane in Plane::ALL {
        for polygon in config.area_requests(plane) {
            if let Some(area) = geometry::evaluate_area(bodies, polygon, plane) {
                out.push(address::area_message(plane, polygon, area));
            }
        }
    }
    out
}
