pub mod frame;
pub mod joint;

pub use frame::{Body, Position, SkeletalFrame, SlottedBodies};
pub use joint::{BodySlot, HandState, HandType, JointType};
