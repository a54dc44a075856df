//! Hand tracking data structures and the latest-value hand feed.
//!
//! Models the fixed joint set reported by the tracking runtime.  Joint
//! positions are world-space: the tracking layer has already applied the
//! origin-from-anchor transform before a pose reaches this module.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

// ── Joint definitions ──────────────────────────────────────

/// Tracked hand joints, in runtime order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbKnuckle,
    ThumbIntermediateBase,
    ThumbIntermediateTip,
    ThumbTip,
    IndexFingerMetacarpal,
    IndexFingerKnuckle,
    IndexFingerIntermediateBase,
    IndexFingerIntermediateTip,
    IndexFingerTip,
    MiddleFingerMetacarpal,
    MiddleFingerKnuckle,
    MiddleFingerIntermediateBase,
    MiddleFingerIntermediateTip,
    MiddleFingerTip,
    RingFingerMetacarpal,
    RingFingerKnuckle,
    RingFingerIntermediateBase,
    RingFingerIntermediateTip,
    RingFingerTip,
    LittleFingerMetacarpal,
    LittleFingerKnuckle,
    LittleFingerIntermediateBase,
    LittleFingerIntermediateTip,
    LittleFingerTip,
    ForearmWrist,
    ForearmArm,
}

/// Total number of joints per hand.
pub const JOINT_COUNT: usize = 27;

const ALL_JOINTS: [HandJoint; JOINT_COUNT] = [
    HandJoint::Wrist,
    HandJoint::ThumbKnuckle,
    HandJoint::ThumbIntermediateBase,
    HandJoint::ThumbIntermediateTip,
    HandJoint::ThumbTip,
    HandJoint::IndexFingerMetacarpal,
    HandJoint::IndexFingerKnuckle,
    HandJoint::IndexFingerIntermediateBase,
    HandJoint::IndexFingerIntermediateTip,
    HandJoint::IndexFingerTip,
    HandJoint::MiddleFingerMetacarpal,
    HandJoint::MiddleFingerKnuckle,
    HandJoint::MiddleFingerIntermediateBase,
    HandJoint::MiddleFingerIntermediateTip,
    HandJoint::MiddleFingerTip,
    HandJoint::RingFingerMetacarpal,
    HandJoint::RingFingerKnuckle,
    HandJoint::RingFingerIntermediateBase,
    HandJoint::RingFingerIntermediateTip,
    HandJoint::RingFingerTip,
    HandJoint::LittleFingerMetacarpal,
    HandJoint::LittleFingerKnuckle,
    HandJoint::LittleFingerIntermediateBase,
    HandJoint::LittleFingerIntermediateTip,
    HandJoint::LittleFingerTip,
    HandJoint::ForearmWrist,
    HandJoint::ForearmArm,
];

impl HandJoint {
    /// Convert joint enum to array index.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Every joint, in index order.
    pub fn all() -> &'static [HandJoint; JOINT_COUNT] {
        &ALL_JOINTS
    }

    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbKnuckle => "thumb-knuckle",
            Self::ThumbIntermediateBase => "thumb-intermediate-base",
            Self::ThumbIntermediateTip => "thumb-intermediate-tip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexFingerMetacarpal => "index-finger-metacarpal",
            Self::IndexFingerKnuckle => "index-finger-knuckle",
            Self::IndexFingerIntermediateBase => "index-finger-intermediate-base",
            Self::IndexFingerIntermediateTip => "index-finger-intermediate-tip",
            Self::IndexFingerTip => "index-finger-tip",
            Self::MiddleFingerMetacarpal => "middle-finger-metacarpal",
            Self::MiddleFingerKnuckle => "middle-finger-knuckle",
            Self::MiddleFingerIntermediateBase => "middle-finger-intermediate-base",
            Self::MiddleFingerIntermediateTip => "middle-finger-intermediate-tip",
            Self::MiddleFingerTip => "middle-finger-tip",
            Self::RingFingerMetacarpal => "ring-finger-metacarpal",
            Self::RingFingerKnuckle => "ring-finger-knuckle",
            Self::RingFingerIntermediateBase => "ring-finger-intermediate-base",
            Self::RingFingerIntermediateTip => "ring-finger-intermediate-tip",
            Self::RingFingerTip => "ring-finger-tip",
            Self::LittleFingerMetacarpal => "little-finger-metacarpal",
            Self::LittleFingerKnuckle => "little-finger-knuckle",
            Self::LittleFingerIntermediateBase => "little-finger-intermediate-base",
            Self::LittleFingerIntermediateTip => "little-finger-intermediate-tip",
            Self::LittleFingerTip => "little-finger-tip",
            Self::ForearmWrist => "forearm-wrist",
            Self::ForearmArm => "forearm-arm",
        }
    }

    /// Parse an IPC joint name.
    pub fn parse(s: &str) -> Option<HandJoint> {
        ALL_JOINTS.iter().copied().find(|j| j.as_str() == s)
    }
}

// ── Hand enum ──────────────────────────────────────────────

/// Which hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Hand> {
        match s {
            "left" => Some(Hand::Left),
            "right" => Some(Hand::Right),
            _ => None,
        }
    }
}

// ── Joint pose ─────────────────────────────────────────────

/// Pose data for a single joint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointPose {
    /// World-space position in meters (x, y, z).
    pub position: [f32; 3],
    /// Whether the runtime is tracking this joint.
    pub tracked: bool,
}

// ── Hand pose ──────────────────────────────────────────────

/// Snapshot of one hand at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    /// Which hand this pose represents.
    pub hand: Hand,
    /// Joint poses indexed by `HandJoint`.
    pub joints: [JointPose; JOINT_COUNT],
    /// Whether the hand as a whole is tracked.
    pub tracked: bool,
    /// Runtime timestamp of the sample in nanoseconds.
    pub timestamp_ns: u64,
}

impl HandPose {
    /// A tracked hand with every joint untracked at the origin.
    pub fn new(hand: Hand) -> Self {
        Self {
            hand,
            joints: [JointPose::default(); JOINT_COUNT],
            tracked: true,
            timestamp_ns: 0,
        }
    }

    /// Builder: set a joint position and mark it tracked.
    pub fn with_joint(mut self, joint: HandJoint, position: [f32; 3]) -> Self {
        self.set_joint(joint, position, true);
        self
    }

    /// Builder: set the hand-level tracked flag.
    pub fn with_tracked(mut self, tracked: bool) -> Self {
        self.tracked = tracked;
        self
    }

    pub fn set_joint(&mut self, joint: HandJoint, position: [f32; 3], tracked: bool) {
        self.joints[joint.index()] = JointPose { position, tracked };
    }

    /// Position of a joint, only if both the hand and the joint are tracked.
    pub fn joint(&self, joint: HandJoint) -> Option<[f32; 3]> {
        if !self.tracked {
            return None;
        }
        let pose = &self.joints[joint.index()];
        pose.tracked.then_some(pose.position)
    }
}

// ── Snapshot ───────────────────────────────────────────────

/// Latest known pose of each hand.  Either side may be stale or absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandsSnapshot {
    pub left: Option<HandPose>,
    pub right: Option<HandPose>,
}

impl HandsSnapshot {
    pub fn hand(&self, hand: Hand) -> Option<&HandPose> {
        match hand {
            Hand::Left => self.left.as_ref(),
            Hand::Right => self.right.as_ref(),
        }
    }

    fn slot_mut(&mut self, hand: Hand) -> &mut Option<HandPose> {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }
}

// ── Feed ───────────────────────────────────────────────────

/// Latest-value cell between the tracking stream and the frame loop.
///
/// The writer publishes whole poses; readers take an immutable
/// `Arc<HandsSnapshot>` and never observe a half-written update.
#[derive(Debug, Clone, Default)]
pub struct HandFeed {
    inner: Arc<Mutex<Arc<HandsSnapshot>>>,
}

impl HandFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Arc<HandsSnapshot>> {
        // The guarded value is replaced atomically, so a poisoned lock
        // still holds a complete snapshot.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a new pose for its hand.
    ///
    /// Untracked poses are dropped so the snapshot keeps the last pose the
    /// runtime actually tracked.  Returns whether the pose was stored.
    pub fn publish(&self, pose: HandPose) -> bool {
        if !pose.tracked {
            debug!(hand = pose.hand.as_str(), "dropping untracked hand update");
            return false;
        }
        let mut guard = self.lock();
        let mut next = HandsSnapshot::clone(&guard);
        let hand = pose.hand;
        *next.slot_mut(hand) = Some(pose);
        *guard = Arc::new(next);
        true
    }

    /// The latest snapshot.  Cheap; does not copy joint data.
    pub fn latest(&self) -> Arc<HandsSnapshot> {
        Arc::clone(&self.lock())
    }

    /// Forget a hand entirely (e.g. the runtime reported it removed).
    pub fn remove(&self, hand: Hand) {
        let mut guard = self.lock();
        let mut next = HandsSnapshot::clone(&guard);
        *next.slot_mut(hand) = None;
        *guard = Arc::new(next);
    }

    /// Drop both hands.
    pub fn clear(&self) {
        *self.lock() = Arc::new(HandsSnapshot::default());
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_count() {
        assert_eq!(HandJoint::Wrist.index(), 0);
        assert_eq!(HandJoint::ForearmArm.index(), JOINT_COUNT - 1);
        for (i, j) in HandJoint::all().iter().enumerate() {
            assert_eq!(j.index(), i, "{:?} out of order", j);
        }
    }

    #[test]
    fn test_joint_parse_round_trips_names() {
        for j in HandJoint::all() {
            assert_eq!(HandJoint::parse(j.as_str()), Some(*j));
        }
        assert_eq!(HandJoint::parse("sixth-finger-tip"), None);
    }

    #[test]
    fn test_hand_as_str() {
        assert_eq!(Hand::Left.as_str(), "left");
        assert_eq!(Hand::Right.as_str(), "right");
        assert_eq!(Hand::parse("right"), Some(Hand::Right));
        assert_eq!(Hand::parse("both"), None);
    }

    #[test]
    fn test_joint_requires_joint_tracked() {
        let pose = HandPose::new(Hand::Right).with_joint(HandJoint::ThumbTip, [0.1, 0.2, 0.3]);
        assert_eq!(pose.joint(HandJoint::ThumbTip), Some([0.1, 0.2, 0.3]));
        assert_eq!(pose.joint(HandJoint::IndexFingerTip), None);
    }

    #[test]
    fn test_joint_requires_hand_tracked() {
        let pose = HandPose::new(Hand::Right)
            .with_joint(HandJoint::ThumbTip, [0.1, 0.2, 0.3])
            .with_tracked(false);
        assert_eq!(pose.joint(HandJoint::ThumbTip), None);
    }

    #[test]
    fn test_feed_starts_empty() {
        let feed = HandFeed::new();
        let snap = feed.latest();
        assert!(snap.left.is_none());
        assert!(snap.right.is_none());
    }

    #[test]
    fn test_feed_publish_per_hand() {
        let feed = HandFeed::new();
        assert!(feed.publish(HandPose::new(Hand::Right)));
        let snap = feed.latest();
        assert!(snap.right.is_some());
        assert!(snap.left.is_none());
    }

    #[test]
    fn test_feed_keeps_last_tracked_pose() {
        let feed = HandFeed::new();
        let tracked = HandPose::new(Hand::Left).with_joint(HandJoint::ThumbTip, [1.0, 0.0, 0.0]);
        feed.publish(tracked.clone());

        let lost = HandPose::new(Hand::Left).with_tracked(false);
        assert!(!feed.publish(lost));
        assert_eq!(feed.latest().left.as_ref(), Some(&tracked));
    }

    #[test]
    fn test_feed_snapshot_is_immutable() {
        let feed = HandFeed::new();
        feed.publish(HandPose::new(Hand::Right).with_joint(HandJoint::ThumbTip, [0.0; 3]));
        let before = feed.latest();

        feed.publish(HandPose::new(Hand::Right).with_joint(HandJoint::ThumbTip, [1.0; 3]));
        let thumb = before.right.as_ref().and_then(|p| p.joint(HandJoint::ThumbTip));
        assert_eq!(thumb, Some([0.0; 3]));
    }

    #[test]
    fn test_feed_remove_and_clear() {
        let feed = HandFeed::new();
        feed.publish(HandPose::new(Hand::Left));
        feed.publish(HandPose::new(Hand::Right));
        feed.remove(Hand::Left);
        assert!(feed.latest().left.is_none());
        assert!(feed.latest().right.is_some());
        feed.clear();
        assert!(feed.latest().right.is_none());
    }

    #[test]
    fn test_feed_publish_across_threads() {
        let feed = HandFeed::new();
        let writer = feed.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..100u64 {
                let mut pose = HandPose::new(Hand::Right);
                pose.timestamp_ns = i;
                writer.publish(pose);
            }
        });
        handle.join().unwrap();
        let latest = feed.latest();
        assert_eq!(latest.right.as_ref().map(|p| p.timestamp_ns), Some(99));
    }
}
