//! Inbound control protocol.
//!
//! Every control message carries `(ip: string, port: int, payload: string)`;
//! the ip/port pair names where the client wants data sent and keys its session.
//!
//! ```text
//! /kinect/joint/body{1|2}            reversed 25-char '0'/'1' string
//! /kinect/handstate/body{1|2}        2 chars: [LEFT, RIGHT]
//! /kinect/bodycount                  1 char
//! /kinect/hld/vector|distance        joint list, exactly 2
//! /kinect/hld/areaXY|areaXZ|areaYZ   joint list, 3 or more
//! /kinect/hld/speed|acceleration     joint list, 1 or more
//! ```

use std::net::{IpAddr, SocketAddr};

use rosc::{OscMessage, OscType};

use crate::error::ControlError;
use crate::geometry::Plane;
use crate::session::flags::{JointRef, PairRequest, Polygon, MIN_POLYGON_VERTICES};
use crate::skeleton::{BodySlot, JointType};

pub const NAMESPACE: &str = "kinect";

const TRUE_CHAR: char = '1';
const FALSE_CHAR: char = '0';
const JOINT_DELIMITER: char = ':';

/// A typed request for one session
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    JointFlags {
        slot: BodySlot,
        flags: [bool; JointType::COUNT],
    },
    HandFlags {
        slot: BodySlot,
        left: bool,
        right: bool,
    },
    BodyCount(bool),
    Vector(PairRequest),
    Distance(PairRequest),
    Area { plane: Plane, polygon: Polygon },
    Speed(Vec<JointRef>),
    Acceleration(Vec<JointRef>),
}

impl ControlRequest {
    /// Only joint and hand-state updates count as a liveness signal
    pub fn resets_liveness(&self) -> bool {
        matches!(self, Self::JointFlags { .. } | Self::HandFlags { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::JointFlags { .. } => "joint",
            Self::HandFlags { .. } => "handstate",
            Self::BodyCount(_) => "bodycount",
            Self::Vector(_) => "vector",
            Self::Distance(_) => "distance",
            Self::Area { .. } => "area",
            Self::Speed(_) => "speed",
            Self::Acceleration(_) => "acceleration",
        }
    }
}

/// Decoded control message: which client, what it asked for
#[derive(Debug, Clone, PartialEq)]
pub struct ControlCommand {
    pub client: SocketAddr,
    pub request: ControlRequest,
}

/// Decode one control message
pub fn decode(msg: &OscMessage) -> Result<ControlCommand, ControlError> {
    let (client, payload) = client_and_payload(&msg.args)?;
    let request = decode_request(&msg.addr, payload)?;
    Ok(ControlCommand { client, request })
}

/// Decode the address + payload part, ignoring the client arguments
pub fn decode_request(addr: &str, payload: &str) -> Result<ControlRequest, ControlError> {
    let segments: Vec<&str> = addr.trim_start_matches('/').split('/').collect();
    if segments.first() != Some(&NAMESPACE) {
        return Err(ControlError::UnknownNamespace(addr.to_string()));
    }

    match &segments[1..] {
        ["joint", body] => {
            let slot = parse_body_segment(body)?;
            let mut bits = parse_flags(payload, JointType::COUNT)?;
            // Wire order is the mirror of the joint ordinal
            bits.reverse();
            let mut flags = [false; JointType::COUNT];
            flags.copy_from_slice(&bits);
            Ok(ControlRequest::JointFlags { slot, flags })
        }
        ["handstate", body] => {
            let slot = parse_body_segment(body)?;
            // Not reversed: index 0 is LEFT
            let bits = parse_flags(payload, 2)?;
            Ok(ControlRequest::HandFlags {
                slot,
                left: bits[0],
                right: bits[1],
            })
        }
        ["bodycount"] => {
            let bits = parse_flags(payload, 1)?;
            Ok(ControlRequest::BodyCount(bits[0]))
        }
        ["hld", kind] => decode_high_level(kind, payload, addr),
        _ => Err(ControlError::UnknownAddress(addr.to_string())),
    }
}

fn decode_high_level(kind: &str, payload: &str, addr: &str) -> Result<ControlRequest, ControlError> {
    let joints = parse_joint_list(payload)
        .ok_or_else(|| ControlError::InvalidJointList(payload.to_string()))?;

    let count_error = |request: &'static str, expected: &'static str| ControlError::JointCount {
        request,
        expected,
        actual: joints.len(),
    };

    match kind {
        "vector" | "distance" => {
            if joints.len() != 2 {
                return Err(count_error(if kind == "vector" { "vector" } else { "distance" }, "exactly 2"));
            }
            let pair = PairRequest::new(joints[0], joints[1]);
            Ok(if kind == "vector" {
                ControlRequest::Vector(pair)
            } else {
                ControlRequest::Distance(pair)
            })
        }
        "speed" | "acceleration" => {
            if joints.is_empty() {
                return Err(count_error(if kind == "speed" { "speed" } else { "acceleration" }, "at least 1"));
            }
            Ok(if kind == "speed" {
                ControlRequest::Speed(joints)
            } else {
                ControlRequest::Acceleration(joints)
            })
        }
        _ => match Plane::from_address_name(kind) {
            Some(plane) => {
                if joints.len() < MIN_POLYGON_VERTICES {
                    return Err(count_error("area", "at least 3"));
                }
                Ok(ControlRequest::Area {
                    plane,
                    polygon: joints,
                })
            }
            None => Err(ControlError::UnknownAddress(addr.to_string())),
        },
    }
}

/// Parse `body<1|2>/<JointName>` tokens separated by `:`.
///
/// Spaces and double quotes are ignored. Any bad token fails the whole list.
pub fn parse_joint_list(payload: &str) -> Option<Vec<JointRef>> {
    let cleaned: String = payload.chars().filter(|c| *c != ' ' && *c != '"').collect();
    cleaned.split(JOINT_DELIMITER).map(parse_joint_token).collect()
}

fn parse_joint_token(token: &str) -> Option<JointRef> {
    let (body, name) = token.split_once('/')?;
    let joint = JointType::from_name(name)?;
    let number: u32 = body.strip_prefix("body")?.parse().ok()?;
    let slot = BodySlot::from_wire(number)?;
    Some(JointRef::new(joint, slot))
}

fn parse_body_segment(segment: &str) -> Result<BodySlot, ControlError> {
    segment
        .strip_prefix("body")
        .and_then(|n| n.parse::<u32>().ok())
        .and_then(BodySlot::from_wire)
        .ok_or_else(|| ControlError::InvalidBody(segment.to_string()))
}

fn parse_flags(payload: &str, expected: usize) -> Result<Vec<bool>, ControlError> {
    let invalid = || ControlError::InvalidFlags {
        payload: payload.to_string(),
        expected,
    };
    let bits = payload
        .trim_matches('"')
        .chars()
        .map(|c| match c {
            TRUE_CHAR => Ok(true),
            FALSE_CHAR => Ok(false),
            _ => Err(invalid()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if bits.len() != expected {
        return Err(invalid());
    }
    Ok(bits)
}

fn client_and_payload(args: &[OscType]) -> Result<(SocketAddr, &str), ControlError> {
    if args.len() != 3 {
        return Err(ControlError::Arguments(args.len()));
    }

    let ip = match &args[0] {
        OscType::String(s) => s.trim_matches('"'),
        _ => return Err(ControlError::ArgumentType { index: 0 }),
    };
    let ip: IpAddr = ip.parse().map_err(|_| ControlError::InvalidIp(ip.to_string()))?;

    let port = match &args[1] {
        OscType::Int(p) => *p,
        OscType::Long(p) => i32::try_from(*p).map_err(|_| ControlError::ArgumentType { index: 1 })?,
        OscType::String(s) => s
            .trim_matches('"')
            .parse()
            .map_err(|_| ControlError::ArgumentType { index: 1 })?,
        _ => return Err(ControlError::ArgumentType { index: 1 }),
    };
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ControlError::InvalidPort(port))?;

    let payload = match &args[2] {
        OscType::String(s) => s.as_str(),
        _ => return Err(ControlError::ArgumentType { index: 2 }),
    };

    Ok((SocketAddr::new(ip, port), payload))
}

/// Build a control message, as a client would send it
pub fn control_message(addr: &str, client: SocketAddr, payload: &str) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args: vec![
            OscType::String(client.ip().to_string()),
            OscType::Int(client.port() as i32),
            OscType::String(payload.to_string()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ON: &str = "1111111111111111111111111";

    fn client() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn decode_str(addr: &str, payload: &str) -> Result<ControlCommand, ControlError> {
        decode(&control_message(addr, client(), payload))
    }

    #[test]
    fn test_decode_client_address() {
        let cmd = decode_str("/kinect/bodycount", "1").unwrap();
        assert_eq!(cmd.client, client());
        assert_eq!(cmd.request, ControlRequest::BodyCount(true));
    }

    #[test]
    fn test_joint_flags_all_on() {
        let cmd = decode_str("/kinect/joint/body1", ALL_ON).unwrap();
        match cmd.request {
            ControlRequest::JointFlags { slot, flags } => {
                assert_eq!(slot, BodySlot::First);
                assert!(flags.iter().all(|&f| f));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_joint_flags_reversed() {
        // Last character controls ordinal 0 (SpineBase)
        let mut payload = "0".repeat(JointType::COUNT - 1);
        payload.push('1');
        let cmd = decode_str("/kinect/joint/body2", &payload).unwrap();
        let ControlRequest::JointFlags { slot, flags } = cmd.request else {
            panic!("expected joint flags");
        };
        assert_eq!(slot, BodySlot::Second);
        assert!(flags[JointType::SpineBase.index()]);
        assert_eq!(flags.iter().filter(|&&f| f).count(), 1);

        // First character controls the last ordinal (ThumbRight)
        let mut payload = String::from("1");
        payload.push_str(&"0".repeat(JointType::COUNT - 1));
        let ControlRequest::JointFlags { flags, .. } =
            decode_str("/kinect/joint/body1", &payload).unwrap().request
        else {
            panic!("expected joint flags");
        };
        assert!(flags[JointType::ThumbRight.index()]);
        assert!(!flags[JointType::SpineBase.index()]);
    }

    #[test]
    fn test_hand_flags_not_reversed() {
        let cmd = decode_str("/kinect/handstate/body1", "10").unwrap();
        assert_eq!(
            cmd.request,
            ControlRequest::HandFlags {
                slot: BodySlot::First,
                left: true,
                right: false
            }
        );
    }

    #[test]
    fn test_flag_payload_validation() {
        assert!(decode_str("/kinect/joint/body1", "111").is_err());
        assert!(decode_str("/kinect/joint/body1", &"2".repeat(JointType::COUNT)).is_err());
        assert!(decode_str("/kinect/handstate/body1", "1").is_err());
        assert!(decode_str("/kinect/bodycount", "").is_err());
    }

    #[test]
    fn test_body_segment_validation() {
        assert!(decode_str("/kinect/joint/body3", ALL_ON).is_err());
        assert!(decode_str("/kinect/joint/body0", ALL_ON).is_err());
        assert!(decode_str("/kinect/handstate/bodyX", "11").is_err());
        assert!(decode_str("/kinect/joint", ALL_ON).is_err());
    }

    #[test]
    fn test_parse_joint_list() {
        let list = parse_joint_list("body1/WristRight:body2/WristRight").unwrap();
        assert_eq!(
            list,
            vec![
                JointRef::new(JointType::WristRight, BodySlot::First),
                JointRef::new(JointType::WristRight, BodySlot::Second),
            ]
        );
    }

    #[test]
    fn test_parse_joint_list_strips_spaces_and_quotes() {
        let list = parse_joint_list("\"body1/Head : body2/Neck\"").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], JointRef::new(JointType::Neck, BodySlot::Second));
    }

    #[test]
    fn test_parse_joint_list_invalid() {
        assert!(parse_joint_list("body1/Wrist:body2/WristRight").is_none());
        assert!(parse_joint_list("body3/WristRight").is_none());
        assert!(parse_joint_list("body0/WristRight").is_none());
        assert!(parse_joint_list("bodyA/WristRight").is_none());
        assert!(parse_joint_list("body1WristRight").is_none());
        assert!(parse_joint_list("body1/Head:").is_none());
        assert!(parse_joint_list("").is_none());
    }

    #[test]
    fn test_vector_and_distance_arity() {
        let cmd = decode_str("/kinect/hld/vector", "body1/HandLeft:body2/HandRight").unwrap();
        assert_eq!(
            cmd.request,
            ControlRequest::Vector(PairRequest::new(
                JointRef::new(JointType::HandLeft, BodySlot::First),
                JointRef::new(JointType::HandRight, BodySlot::Second),
            ))
        );
        assert!(matches!(
            decode_str("/kinect/hld/distance", "body1/HandLeft"),
            Err(ControlError::JointCount { .. })
        ));
        assert!(decode_str("/kinect/hld/distance", "body1/Head:body1/Neck:body1/SpineMid").is_err());
    }

    #[test]
    fn test_area_arity() {
        let cmd = decode_str("/kinect/hld/areaXZ", "body1/Head:body1/HandLeft:body1/HandRight").unwrap();
        let ControlRequest::Area { plane, polygon } = cmd.request else {
            panic!("expected area");
        };
        assert_eq!(plane, Plane::XZ);
        assert_eq!(polygon.len(), 3);

        assert!(decode_str("/kinect/hld/areaXY", "body1/Head:body1/HandLeft").is_err());
        assert!(decode_str("/kinect/hld/areaAB", "body1/Head:body1/HandLeft:body1/Neck").is_err());
    }

    #[test]
    fn test_speed_and_acceleration() {
        let cmd = decode_str("/kinect/hld/speed", "body1/Head").unwrap();
        assert!(matches!(cmd.request, ControlRequest::Speed(ref j) if j.len() == 1));
        let cmd = decode_str("/kinect/hld/acceleration", "body1/Head:body2/Head").unwrap();
        assert!(matches!(cmd.request, ControlRequest::Acceleration(ref j) if j.len() == 2));
    }

    #[test]
    fn test_resets_liveness() {
        assert!(decode_str("/kinect/joint/body1", ALL_ON).unwrap().request.resets_liveness());
        assert!(decode_str("/kinect/handstate/body1", "11").unwrap().request.resets_liveness());
        assert!(!decode_str("/kinect/bodycount", "1").unwrap().request.resets_liveness());
        assert!(!decode_str("/kinect/hld/speed", "body1/Head")
            .unwrap()
            .request
            .resets_liveness());
    }

    #[test]
    fn test_bad_arguments() {
        let mut msg = control_message("/kinect/bodycount", client(), "1");
        msg.args.pop();
        assert!(matches!(decode(&msg), Err(ControlError::Arguments(2))));

        let mut msg = control_message("/kinect/bodycount", client(), "1");
        msg.args[0] = OscType::String("not-an-ip".into());
        assert!(matches!(decode(&msg), Err(ControlError::InvalidIp(_))));

        let mut msg = control_message("/kinect/bodycount", client(), "1");
        msg.args[1] = OscType::Int(70000);
        assert!(matches!(decode(&msg), Err(ControlError::InvalidPort(70000))));

        let mut msg = control_message("/kinect/bodycount", client(), "1");
        msg.args[1] = OscType::String("9001".into());
        assert_eq!(decode(&msg).unwrap().client.port(), 9001);
    }

    #[test]
    fn test_unknown_addresses() {
        assert!(matches!(
            decode_str("/other/joint/body1", ALL_ON),
            Err(ControlError::UnknownNamespace(_))
        ));
        assert!(matches!(
            decode_str("/kinect/colour", "1"),
            Err(ControlError::UnknownAddress(_))
        ));
    }
}
