//! Outbound data messages

use rosc::{OscMessage, OscType};

use crate::geometry::Plane;
use crate::session::flags::{JointRef, PairRequest};
use crate::skeleton::{BodySlot, HandState, HandType, JointType, Position};

pub const BODY_COUNT_ADDR: &str = "/kinect/bodyCount";

/// `/kinect/joint/body{N}/{JointName}` (x, y, z)
pub fn joint_message(joint: JointType, slot: BodySlot, pos: Position) -> OscMessage {
    OscMessage {
        addr: format!("/kinect/joint/body{}/{}", slot.wire(), joint),
        args: vec![OscType::Float(pos.x), OscType::Float(pos.y), OscType::Float(pos.z)],
    }
}

/// `/kinect/handstate/body{N}/{0|1}` (state code)
pub fn hand_state_message(hand: HandType, slot: BodySlot, state: HandState) -> OscMessage {
    OscMessage {
        addr: format!("/kinect/handstate/body{}/{}", slot.wire(), hand.wire_index()),
        args: vec![OscType::Int(state.code())],
    }
}

pub fn body_count_message(count: u32) -> OscMessage {
    OscMessage {
        addr: BODY_COUNT_ADDR.to_string(),
        args: vec![OscType::Int(count as i32)],
    }
}

fn pair_suffix(request: &PairRequest) -> String {
    format!("{}:{}", request.from, request.to)
}

/// `/kinect/hld/vector/body{A}/{JointA}:body{B}/{JointB}` (dx, dy, dz)
pub fn vector_message(request: &PairRequest, v: [f32; 3]) -> OscMessage {
    OscMessage {
        addr: format!("/kinect/hld/vector/{}", pair_suffix(request)),
        args: v.iter().map(|&c| OscType::Float(c)).collect(),
    }
}

pub fn distance_message(request: &PairRequest, distance: f32) -> OscMessage {
    OscMessage {
        addr: format!("/kinect/hld/distance/{}", pair_suffix(request)),
        args: vec![OscType::Float(distance)],
    }
}

/// `/kinect/hld/areaXY/body1/HandLeft:body1/HandRight:...` (area)
pub fn area_message(plane: Plane, polygon: &[JointRef], area: f32) -> OscMessage {
    let vertices: Vec<String> = polygon.iter().map(|v| v.to_string()).collect();
    OscMessage {
        addr: format!("/kinect/hld/{}/{}", plane.address_name(), vertices.join(":")),
        args: vec![OscType::Float(area)],
    }
}
