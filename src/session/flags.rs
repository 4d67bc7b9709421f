//! Per-client request state.
//!
//! A `SessionConfig` is plain data. The worker publishes it copy-on-write, so
//! the data plane always reads a complete snapshot.

use std::fmt;

use crate::geometry::Plane;
use crate::skeleton::{BodySlot, HandType, JointType};

/// A joint on a specific performer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointRef {
    pub joint: JointType,
    pub slot: BodySlot,
}

impl JointRef {
    pub fn new(joint: JointType, slot: BodySlot) -> Self {
        Self { joint, slot }
    }
}

/// Formats as `body{N}/{JointName}`, the joint-list token form
impl fmt::Display for JointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body{}/{}", self.slot.wire(), self.joint)
    }
}

/// Two-joint request (vector, distance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairRequest {
    pub from: JointRef,
    pub to: JointRef,
}

impl PairRequest {
    pub fn new(from: JointRef, to: JointRef) -> Self {
        Self { from, to }
    }
}

/// Ordered polygon vertices for an area request (at least 3)
pub type Polygon = Vec<JointRef>;

pub const MIN_POLYGON_VERTICES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    joint_flags: [[bool; BodySlot::COUNT]; JointType::COUNT],
    hand_flags: [[bool; BodySlot::COUNT]; 2],
    body_count: bool,
    vector_requests: Vec<PairRequest>,
    distance_requests: Vec<PairRequest>,
    area_requests: [Vec<Polygon>; 3],
    // Stored only. No frame computation reads these yet.
    speed_requests: Vec<JointRef>,
    acceleration_requests: Vec<JointRef>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            joint_flags: [[false; BodySlot::COUNT]; JointType::COUNT],
            hand_flags: [[false; BodySlot::COUNT]; 2],
            body_count: false,
            vector_requests: Vec::new(),
            distance_requests: Vec::new(),
            area_requests: [Vec::new(), Vec::new(), Vec::new()],
            speed_requests: Vec::new(),
            acceleration_requests: Vec::new(),
        }
    }
}

fn insert_unique<T: PartialEq>(set: &mut Vec<T>, item: T) -> bool {
    if set.contains(&item) {
        return false;
    }
    set.push(item);
    true
}

fn remove_item<T: PartialEq>(set: &mut Vec<T>, item: &T) -> bool {
    match set.iter().position(|x| x == item) {
        Some(i) => {
            set.remove(i);
            true
        }
        None => false,
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // --- joints ---

    pub fn joint_flag(&self, joint: JointType, slot: BodySlot) -> bool {
        self.joint_flags[joint.index()][slot.index()]
    }

    pub fn set_joint_flag(&mut self, joint: JointType, slot: BodySlot, on: bool) {
        self.joint_flags[joint.index()][slot.index()] = on;
    }

    /// Overwrite every joint flag of one slot, indexed by joint ordinal
    pub fn set_joint_flags(&mut self, slot: BodySlot, flags: &[bool; JointType::COUNT]) {
        for (row, &on) in self.joint_flags.iter_mut().zip(flags.iter()) {
            row[slot.index()] = on;
        }
    }

    /// Flagged joints for a slot, in ordinal order
    pub fn joints_for(&self, slot: BodySlot) -> impl Iterator<Item = JointType> + '_ {
        JointType::ALL
            .into_iter()
            .filter(move |&j| self.joint_flag(j, slot))
    }

    // --- hands / body count ---

    pub fn hand_flag(&self, hand: HandType, slot: BodySlot) -> bool {
        self.hand_flags[hand.wire_index()][slot.index()]
    }

    pub fn set_hand_flag(&mut self, hand: HandType, slot: BodySlot, on: bool) {
        self.hand_flags[hand.wire_index()][slot.index()] = on;
    }

    pub fn body_count_flag(&self) -> bool {
        self.body_count
    }

    pub fn set_body_count_flag(&mut self, on: bool) {
        self.body_count = on;
    }

    // --- high level requests ---

    pub fn vector_requests(&self) -> &[PairRequest] {
        &self.vector_requests
    }

    /// Returns false if the request was already present
    pub fn insert_vector_request(&mut self, request: PairRequest) -> bool {
        insert_unique(&mut self.vector_requests, request)
    }

    pub fn remove_vector_request(&mut self, request: &PairRequest) -> bool {
        remove_item(&mut self.vector_requests, request)
    }

    pub fn distance_requests(&self) -> &[PairRequest] {
        &self.distance_requests
    }

    pub fn insert_distance_request(&mut self, request: PairRequest) -> bool {
        insert_unique(&mut self.distance_requests, request)
    }

    pub fn remove_distance_request(&mut self, request: &PairRequest) -> bool {
        remove_item(&mut self.distance_requests, request)
    }

    pub fn area_requests(&self, plane: Plane) -> &[Polygon] {
        &self.area_requests[plane.index()]
    }

    /// Same vertices in the same order count as a duplicate; a rotation of them does not.
    pub fn insert_area_request(&mut self, plane: Plane, polygon: Polygon) -> bool {
        insert_unique(&mut self.area_requests[plane.index()], polygon)
    }

    pub fn remove_area_request(&mut self, plane: Plane, polygon: &[JointRef]) -> bool {
        let set = &mut self.area_requests[plane.index()];
        match set.iter().position(|p| p.as_slice() == polygon) {
            Some(i) => {
                set.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn speed_requests(&self) -> &[JointRef] {
        &self.speed_requests
    }

    pub fn insert_speed_request(&mut self, joint: JointRef) -> bool {
        insert_unique(&mut self.speed_requests, joint)
    }

    pub fn remove_speed_request(&mut self, joint: &JointRef) -> bool {
        remove_item(&mut self.speed_requests, joint)
    }

    pub fn acceleration_requests(&self) -> &[JointRef] {
        &self.acceleration_requests
    }

    pub fn insert_acceleration_request(&mut self, joint: JointRef) -> bool {
        insert_unique(&mut self.acceleration_requests, joint)
    }

    pub fn remove_acceleration_request(&mut self, joint: &JointRef) -> bool {
        remove_item(&mut self.acceleration_requests, joint)
    }

    pub fn has_any_active_request(&self) -> bool {
        self.joint_flags.iter().flatten().any(|&f| f)
            || self.hand_flags.iter().flatten().any(|&f| f)
            || self.body_count
            || !self.vector_requests.is_empty()
            || !self.distance_requests.is_empty()
            || self.area_requests.iter().any(|set| !set.is_empty())
            || !self.speed_requests.is_empty()
            || !self.acceleration_requests.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
