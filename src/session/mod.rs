pub mod flags;
pub mod registry;
pub mod worker;

pub use flags::{JointRef, PairRequest, Polygon, SessionConfig};
pub use registry::{SessionRegistry, DEFAULT_MAX_SESSIONS};
pub use worker::{Session, SessionSettings, SessionState};
