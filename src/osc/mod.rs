pub mod address;
pub mod bundle;
pub mod control;

pub use bundle::{encode_bundle, BundleBuilder, MAX_BUNDLE_SIZE, MESSAGE_SIZE_ESTIMATE};
pub use control::{decode, parse_joint_list, ControlCommand, ControlRequest};
