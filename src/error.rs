//! Error types for the control plane and session handling

use std::net::SocketAddr;

/// Why an inbound control message was rejected
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("OSC decode failed: {0}")]
    Osc(String),

    #[error("address {0:?} is not under /kinect")]
    UnknownNamespace(String),

    #[error("unknown control address {0:?}")]
    UnknownAddress(String),

    #[error("expected (ip: string, port: int, payload: string), got {0} argument(s)")]
    Arguments(usize),

    #[error("argument {index} has the wrong type")]
    ArgumentType { index: usize },

    #[error("invalid client ip {0:?}")]
    InvalidIp(String),

    #[error("invalid client port {0}")]
    InvalidPort(i32),

    #[error("invalid body segment {0:?}")]
    InvalidBody(String),

    #[error("flag payload {payload:?} must be {expected} characters of '0'/'1'")]
    InvalidFlags { payload: String, expected: usize },

    #[error("joint list {0:?} did not parse")]
    InvalidJointList(String),

    #[error("{request} needs {expected} joint(s), got {actual}")]
    JointCount {
        request: &'static str,
        expected: &'static str,
        actual: usize,
    },
}

impl From<rosc::OscError> for ControlError {
    fn from(e: rosc::OscError) -> Self {
        ControlError::Osc(format!("{:?}", e))
    }
}

/// Session worker and registry errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OSC encode failed: {0}")]
    Encode(String),

    #[error("session {0} has ended")]
    Ended(SocketAddr),

    #[error("session limit of {0} reached")]
    RegistryFull(usize),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<rosc::OscError> for SessionError {
    fn from(e: rosc::OscError) -> Self {
        SessionError::Encode(format!("{:?}", e))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Frame ingest failures. Each one ends the current bridge connection.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame payload did not decode: {0}")]
    Codec(#[from] bincode::Error),
}
