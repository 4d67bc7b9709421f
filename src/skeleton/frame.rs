use serde::{Deserialize, Serialize};

use super::joint::{BodySlot, HandState, HandType, JointType};

/// Camera-space joint position (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One body record as delivered by the sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub tracked: bool,
    pub joints: [Position; JointType::COUNT],
    pub hand_left: HandState,
    pub hand_right: HandState,
}

impl Body {
    pub fn new(joints: [Position; JointType::COUNT]) -> Self {
        Self {
            tracked: true,
            joints,
            hand_left: HandState::Unknown,
            hand_right: HandState::Unknown,
        }
    }

    /// A body the sensor sees but does not skeleton-track
    pub fn untracked() -> Self {
        Self {
            tracked: false,
            ..Self::default()
        }
    }

    /// All joints at the same position
    pub fn uniform(position: Position) -> Self {
        Self::new([position; JointType::COUNT])
    }

    pub fn joint(&self, joint: JointType) -> Position {
        self.joints[joint.index()]
    }

    pub fn hand(&self, hand: HandType) -> HandState {
        match hand {
            HandType::Left => self.hand_left,
            HandType::Right => self.hand_right,
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new([Position::default(); JointType::COUNT])
    }
}

/// One sensor frame: every body record in delivery order plus the visible-body count.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SkeletalFrame {
    pub bodies: Vec<Body>,
    /// Bodies in view, tracked or not
    pub visible_bodies: u32,
}

impl SkeletalFrame {
    pub fn new(bodies: Vec<Body>, visible_bodies: u32) -> Self {
        Self {
            bodies,
            visible_bodies,
        }
    }

    /// Assign slots to the first two tracked bodies.
    ///
    /// `swapped` inverts which of the two is slot 1. Further tracked bodies get no slot.
    pub fn slots(&self, swapped: bool) -> SlottedBodies<'_> {
        let mut tracked = self.bodies.iter().filter(|b| b.tracked);
        let first = tracked.next();
        let second = tracked.next();

        let mut slotted = SlottedBodies { bodies: [None, None] };
        if let Some(body) = first {
            let slot = if swapped { BodySlot::Second } else { BodySlot::First };
            slotted.bodies[slot.index()] = Some(body);
        }
        if let Some(body) = second {
            let slot = if swapped { BodySlot::First } else { BodySlot::Second };
            slotted.bodies[slot.index()] = Some(body);
        }
        slotted
    }
}

/// Bodies of the current frame indexed by slot
#[derive(Debug, Clone, Copy)]
pub struct SlottedBodies<'a> {
    bodies: [Option<&'a Body>; BodySlot::COUNT],
}

impl<'a> SlottedBodies<'a> {
    pub fn get(&self, slot: BodySlot) -> Option<&'a Body> {
        self.bodies[slot.index()]
    }

    pub fn joint(&self, joint: JointType, slot: BodySlot) -> Option<Position> {
        self.get(slot).map(|b| b.joint(joint))
    }

    pub fn present(&self) -> impl Iterator<Item = (BodySlot, &'a Body)> + '_ {
        BodySlot::ALL
            .into_iter()
            .filter_map(move |slot| self.get(slot).map(|b| (slot, b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(x: f32) -> Body {
        Body::uniform(Position::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_slots_first_two_tracked() {
        let frame = SkeletalFrame::new(
            vec![Body::untracked(), body_at(1.0), body_at(2.0), body_at(3.0)],
            4,
        );
        let slots = frame.slots(false);
        assert_eq!(slots.joint(JointType::Head, BodySlot::First).unwrap().x, 1.0);
        assert_eq!(slots.joint(JointType::Head, BodySlot::Second).unwrap().x, 2.0);
        assert_eq!(slots.present().count(), 2);
    }

    #[test]
    fn test_slots_swapped() {
        let frame = SkeletalFrame::new(vec![body_at(1.0), body_at(2.0)], 2);
        let slots = frame.slots(true);
        assert_eq!(slots.joint(JointType::Head, BodySlot::First).unwrap().x, 2.0);
        assert_eq!(slots.joint(JointType::Head, BodySlot::Second).unwrap().x, 1.0);
    }

    #[test]
    fn test_single_body_swapped_lands_in_second_slot() {
        let frame = SkeletalFrame::new(vec![body_at(1.0)], 1);
        let slots = frame.slots(true);
        assert!(slots.get(BodySlot::First).is_none());
        assert!(slots.get(BodySlot::Second).is_some());
    }

    #[test]
    fn test_no_tracked_bodies() {
        let frame = SkeletalFrame::new(vec![Body::untracked(), Body::untracked()], 2);
        assert_eq!(frame.slots(false).present().count(), 0);
    }
}
