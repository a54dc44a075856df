//! Snap and open-palm gesture recognition from hand joint positions.
//!
//! A snap is recognized in three phases on the dominant hand:
//! thumb and finger tips touch (start), the intermediate segments meet
//! within the snap window (finish, latches `snapping`), then the tips spring
//! apart (done).  The open-palm "fireball" pose is accepted shortly after a
//! finished snap and stays latched while the palm keeps facing up.
//!
//! The host calls the `evaluate_*` operations once per frame in a fixed
//! order (or calls [`GestureRecognizer::update`], which does exactly that).
//! Later steps read flags set by earlier ones in the same frame.

use std::time::{Duration, Instant};

use tracing::debug;

use super::geometry::{self, Vec3};
use super::hand_tracking::{Hand, HandJoint, HandPose, HandsSnapshot};

// ── Config enums ───────────────────────────────────────────

/// Finger the thumb snaps against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapFinger {
    Index,
    Middle,
}

impl SnapFinger {
    pub fn tip(&self) -> HandJoint {
        match self {
            Self::Index => HandJoint::IndexFingerTip,
            Self::Middle => HandJoint::MiddleFingerTip,
        }
    }

    pub fn intermediate_tip(&self) -> HandJoint {
        match self {
            Self::Index => HandJoint::IndexFingerIntermediateTip,
            Self::Middle => HandJoint::MiddleFingerIntermediateTip,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Middle => "middle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "index" => Some(Self::Index),
            "middle" => Some(Self::Middle),
            _ => None,
        }
    }
}

/// Where the sparkler effect originates when a snap finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapOrigin {
    /// Midpoint of the two intermediate tips.
    Midpoint,
    /// Thumb tip position.
    ThumbTip,
}

impl SnapOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Midpoint => "midpoint",
            Self::ThumbTip => "thumb-tip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "midpoint" => Some(Self::Midpoint),
            "thumb-tip" => Some(Self::ThumbTip),
            _ => None,
        }
    }
}

/// Which transition bumps the snap counter.  Exactly one per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapCountEdge {
    /// Count when the snap latches (Idle → Snapping).
    Finish,
    /// Count when the snap completes (Snapping → Idle).
    Done,
}

impl SnapCountEdge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finish => "finish",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "finish" => Some(Self::Finish),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Thresholds and timing windows for snap and open-palm recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureConfig {
    /// Enable gesture recognition.
    pub enabled: bool,
    /// Hand whose joints are evaluated.
    pub dominant_hand: Hand,
    /// Finger the thumb snaps against.
    pub snap_finger: SnapFinger,
    /// Maximum thumb-to-finger tip distance (meters) to start a snap.
    pub snap_start_threshold_m: f32,
    /// Maximum intermediate-tip distance (meters) to finish a snap.
    pub snap_finish_threshold_m: f32,
    /// Minimum thumb-to-index tip distance (meters) to complete a snap.
    pub snap_done_threshold_m: f32,
    /// Time after a snap start during which a finish is accepted.
    pub snap_window: Duration,
    /// Time after a snap finish during which an open palm is accepted.
    pub open_palm_window: Duration,
    /// Palm normal Y component must be below this to count as facing up.
    pub open_palm_normal_threshold: f32,
    /// Index-to-thumb tip distance (meters) at or below which the hand is
    /// too closed to define a palm plane.
    pub degenerate_hand_distance_m: f32,
    /// Where the sparkler effect originates.
    pub snap_origin: SnapOrigin,
    /// Which transition increments the snap counter.
    pub count_on: SnapCountEdge,
}

impl GestureConfig {
    /// Reject thresholds no hand pose could be compared against.
    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("snap-start-threshold", self.snap_start_threshold_m),
            ("snap-finish-threshold", self.snap_finish_threshold_m),
            ("snap-done-threshold", self.snap_done_threshold_m),
            ("degenerate-distance", self.degenerate_hand_distance_m),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(format!("{name} must be a non-negative distance in meters, got {v}"));
            }
        }
        let t = self.open_palm_normal_threshold;
        if !(-1.0..=1.0).contains(&t) {
            return Err(format!("open-palm-normal-threshold must be within [-1, 1], got {t}"));
        }
        Ok(())
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dominant_hand: Hand::Right,
            snap_finger: SnapFinger::Index,
            snap_start_threshold_m: 0.02,
            snap_finish_threshold_m: 0.03,
            snap_done_threshold_m: 0.1,
            snap_window: Duration::from_millis(500),
            open_palm_window: Duration::from_millis(1500),
            open_palm_normal_threshold: -0.5,
            degenerate_hand_distance_m: 0.05,
            snap_origin: SnapOrigin::Midpoint,
            count_on: SnapCountEdge::Finish,
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Phase of the snap lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapPhase {
    Idle,
    SnapStarted,
    Snapping,
}

impl SnapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SnapStarted => "snap-started",
            Self::Snapping => "snapping",
        }
    }
}

/// Mutable recognizer state.  Owned and mutated only by the recognizer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GestureState {
    /// Between a confirmed snap finish and a confirmed snap done.
    pub snapping: bool,
    /// While the open-palm pose persists.
    pub fireballing: bool,
    /// Last accepted snap start; `None` until the first one.
    pub last_snap_start: Option<Instant>,
    /// Last snap finish edge; `None` until the first one.
    pub last_snap_finish: Option<Instant>,
    /// Completed snap cycles.
    pub snap_count: u64,
}

/// Radius and center of an open-palm fireball, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenPalm {
    pub radius: f32,
    pub center: Vec3,
}

// ── Events ─────────────────────────────────────────────────

/// Events emitted by [`GestureRecognizer::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum GestureEvent {
    /// Thumb and finger tips touched; the snap window is (re)opened.
    SnapStarted { hand: Hand },
    /// The snap latched.  `count` is the counter after this transition.
    SnapFinished { hand: Hand, origin: Vec3, count: u64 },
    /// Still latched and the finish pose was seen again; the effect moves.
    Sparkle { hand: Hand, origin: Vec3 },
    /// Fingers sprang apart; the snap cycle is over.
    SnapDone { hand: Hand, count: u64 },
    /// Open palm held this frame.
    Fireball { hand: Hand, radius: f32, center: Vec3 },
    /// The palm stopped facing up.
    FireballLost { hand: Hand },
}

impl GestureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SnapStarted { .. } => "snap-started",
            Self::SnapFinished { .. } => "snap-finished",
            Self::Sparkle { .. } => "sparkle",
            Self::SnapDone { .. } => "snap-done",
            Self::Fireball { .. } => "fireball",
            Self::FireballLost { .. } => "fireball-lost",
        }
    }
}

/// The single visual effect a frame should drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameEffect {
    Sparkler { origin: Vec3 },
    Fireball { radius: f32, center: Vec3 },
}

/// Pick the effect that dominates a frame: a held fireball beats a sparkler.
pub fn dominant_effect(events: &[GestureEvent]) -> Option<FrameEffect> {
    let fireball = events.iter().find_map(|e| match e {
        GestureEvent::Fireball { radius, center, .. } => Some(FrameEffect::Fireball {
            radius: *radius,
            center: *center,
        }),
        _ => None,
    });
    fireball.or_else(|| {
        events.iter().find_map(|e| match e {
            GestureEvent::SnapFinished { origin, .. } | GestureEvent::Sparkle { origin, .. } => {
                Some(FrameEffect::Sparkler { origin: *origin })
            }
            _ => None,
        })
    })
}

/// Normal of the plane through thumb, index and little finger tips.
///
/// Oriented so a right hand with the palm facing up yields a negative Y.
pub fn palm_normal(thumb: Vec3, index: Vec3, little: Vec3) -> Vec3 {
    let to_little = geometry::normalize(geometry::sub(little, thumb));
    let to_index = geometry::normalize(geometry::sub(index, thumb));
    geometry::normalize(geometry::cross(to_little, to_index))
}

fn within(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.map_or(false, |t| now.saturating_duration_since(t) < window)
}

fn bool_sexp(b: bool) -> &'static str {
    if b {
        "t"
    } else {
        "nil"
    }
}

// ── Recognizer ─────────────────────────────────────────────

/// Per-frame snap and open-palm state machine.
///
/// Not thread-safe by design of its contract: drive it from the frame loop
/// and feed it snapshots taken from a [`super::hand_tracking::HandFeed`].
#[derive(Debug, Clone)]
pub struct GestureRecognizer {
    /// Configuration.
    pub config: GestureConfig,
    state: GestureState,
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            state: GestureState::default(),
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn snap_count(&self) -> u64 {
        self.state.snap_count
    }

    /// Current phase of the snap lifecycle at `now`.
    pub fn phase(&self, now: Instant) -> SnapPhase {
        if self.state.snapping {
            SnapPhase::Snapping
        } else if within(self.state.last_snap_start, now, self.config.snap_window) {
            SnapPhase::SnapStarted
        } else {
            SnapPhase::Idle
        }
    }

    fn dominant<'a>(&self, hands: &'a HandsSnapshot) -> Option<&'a HandPose> {
        if !self.config.enabled {
            return None;
        }
        hands.hand(self.config.dominant_hand)
    }

    /// Thumb tip touching the snap finger tip.  Records and returns `now`.
    pub fn evaluate_snap_start(&mut self, hands: &HandsSnapshot, now: Instant) -> Option<Instant> {
        let pose = self.dominant(hands)?;
        let thumb = pose.joint(HandJoint::ThumbTip)?;
        let finger = pose.joint(self.config.snap_finger.tip())?;

        let dist = geometry::distance(thumb, finger);
        let touching = dist < self.config.snap_start_threshold_m;
        if !touching {
            return None;
        }

        if !within(self.state.last_snap_start, now, self.config.snap_window) {
            debug!(dist, "snap start");
        }
        self.state.last_snap_start = Some(now);
        Some(now)
    }

    /// Intermediate tips meeting inside the snap window.
    ///
    /// Returns the effect origin.  Only the Idle → Snapping edge mutates
    /// state; repeated detections while latched just report the origin.
    pub fn evaluate_snap_finish(&mut self, hands: &HandsSnapshot, now: Instant) -> Option<Vec3> {
        if !self.state.snapping
            && !within(self.state.last_snap_start, now, self.config.snap_window)
        {
            return None;
        }

        let pose = self.dominant(hands)?;
        let thumb = pose.joint(HandJoint::ThumbIntermediateTip)?;
        let finger = pose.joint(self.config.snap_finger.intermediate_tip())?;

        let dist = geometry::distance(thumb, finger);
        let touching = dist < self.config.snap_finish_threshold_m;
        if !touching {
            return None;
        }

        let origin = match self.config.snap_origin {
            SnapOrigin::Midpoint => geometry::midpoint(thumb, finger),
            SnapOrigin::ThumbTip => pose.joint(HandJoint::ThumbTip)?,
        };

        if !self.state.snapping {
            self.state.snapping = true;
            self.state.last_snap_finish = Some(now);
            if self.config.count_on == SnapCountEdge::Finish {
                self.state.snap_count += 1;
            }
            debug!(dist, count = self.state.snap_count, ?origin, "snap finished");
        }
        Some(origin)
    }

    /// Thumb and index tips sprung apart after a latched snap.
    pub fn evaluate_snap_done(&mut self, hands: &HandsSnapshot, _now: Instant) -> bool {
        if !self.state.snapping {
            return false;
        }
        let Some(pose) = self.dominant(hands) else {
            return false;
        };
        let (Some(thumb), Some(index)) = (
            pose.joint(HandJoint::ThumbTip),
            pose.joint(HandJoint::IndexFingerTip),
        ) else {
            return false;
        };

        let dist = geometry::distance(thumb, index);
        let sprung = dist > self.config.snap_done_threshold_m;
        if !sprung {
            return false;
        }

        self.state.snapping = false;
        if self.config.count_on == SnapCountEdge::Done {
            self.state.snap_count += 1;
        }
        debug!(dist, count = self.state.snap_count, "snap done");
        true
    }

    /// Open palm facing up, shortly after a snap or while already latched.
    ///
    /// A failed orientation check clears `fireballing`; every other miss
    /// leaves state untouched.
    pub fn evaluate_open_palm(&mut self, hands: &HandsSnapshot, now: Instant) -> Option<OpenPalm> {
        if !self.state.fireballing
            && !within(self.state.last_snap_finish, now, self.config.open_palm_window)
        {
            return None;
        }

        let pose = self.dominant(hands)?;
        let thumb = pose.joint(HandJoint::ThumbTip)?;
        let little = pose.joint(HandJoint::LittleFingerTip)?;
        let index = pose.joint(HandJoint::IndexFingerTip)?;

        let spread = geometry::distance(index, thumb) > self.config.degenerate_hand_distance_m;
        if !spread {
            return None;
        }

        let normal = palm_normal(thumb, index, little);
        let facing_up = normal[1] < self.config.open_palm_normal_threshold;
        if !facing_up {
            if self.state.fireballing {
                debug!(normal_y = normal[1], "fireball lost");
            }
            self.state.fireballing = false;
            return None;
        }

        let center = geometry::centroid(&[thumb, little, index]);
        let radius = geometry::distance(thumb, center);
        if !self.state.fireballing {
            debug!(normal_y = normal[1], radius, "fireball started");
        }
        self.state.fireballing = true;
        Some(OpenPalm { radius, center })
    }

    /// Whether the open-palm pose is currently latched.
    pub fn is_fireballing(&self) -> bool {
        self.state.fireballing
    }

    /// Run one frame in the fixed evaluation order and report what changed.
    pub fn update(&mut self, hands: &HandsSnapshot, now: Instant) -> Vec<GestureEvent> {
        let mut events = Vec::new();
        if !self.config.enabled {
            return events;
        }
        let hand = self.config.dominant_hand;

        if self.evaluate_snap_start(hands, now).is_some() {
            events.push(GestureEvent::SnapStarted { hand });
        }

        let was_snapping = self.state.snapping;
        if let Some(origin) = self.evaluate_snap_finish(hands, now) {
            if was_snapping {
                events.push(GestureEvent::Sparkle { hand, origin });
            } else {
                events.push(GestureEvent::SnapFinished {
                    hand,
                    origin,
                    count: self.state.snap_count,
                });
            }
        }

        if self.evaluate_snap_done(hands, now) {
            events.push(GestureEvent::SnapDone {
                hand,
                count: self.state.snap_count,
            });
        }

        let was_fireballing = self.state.fireballing;
        match self.evaluate_open_palm(hands, now) {
            Some(palm) => events.push(GestureEvent::Fireball {
                hand,
                radius: palm.radius,
                center: palm.center,
            }),
            None if was_fireballing && !self.is_fireballing() => {
                events.push(GestureEvent::FireballLost { hand });
            }
            None => {}
        }

        events
    }

    /// Reset all gesture state, keeping the configuration.
    pub fn reset(&mut self) {
        self.state = GestureState::default();
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self, now: Instant) -> String {
        format!(
            "(:enabled {} :hand :{} :phase :{} :snapping {} :fireballing {} :snap-count {})",
            bool_sexp(self.config.enabled),
            self.config.dominant_hand.as_str(),
            self.phase(now).as_str(),
            bool_sexp(self.state.snapping),
            bool_sexp(self.state.fireballing),
            self.state.snap_count,
        )
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        let c = &self.config;
        format!(
            "(:enabled {} :hand :{} :snap-finger :{} :snap-start-threshold {:.3} :snap-finish-threshold {:.3} :snap-done-threshold {:.3} :snap-window-ms {} :open-palm-window-ms {} :open-palm-normal-threshold {:.2} :degenerate-distance {:.3} :snap-origin :{} :count-on :{})",
            bool_sexp(c.enabled),
            c.dominant_hand.as_str(),
            c.snap_finger.as_str(),
            c.snap_start_threshold_m,
            c.snap_finish_threshold_m,
            c.snap_done_threshold_m,
            c.snap_window.as_millis(),
            c.open_palm_window.as_millis(),
            c.open_palm_normal_threshold,
            c.degenerate_hand_distance_m,
            c.snap_origin.as_str(),
            c.count_on.as_str(),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn make_pose(tracked: bool) -> HandPose {
    HandPose::new(Hand::Right).with_tracked(tracked)
}

#[cfg(test)]
fn set_joint(pose: &mut HandPose, joint: HandJoint, x: f32, y: f32, z: f32) {
    pose.set_joint(joint, [x, y, z], true);
}

#[cfg(test)]
fn right_only(pose: HandPose) -> HandsSnapshot {
    HandsSnapshot {
        left: None,
        right: Some(pose),
    }
}

/// Tips touching, intermediates touching.
#[cfg(test)]
fn snap_pose() -> HandPose {
    let mut pose = make_pose(true);
    set_joint(&mut pose, HandJoint::ThumbTip, 0.0, 0.0, 0.0);
    set_joint(&mut pose, HandJoint::IndexFingerTip, 0.0, 0.0, 0.01);
    set_joint(&mut pose, HandJoint::ThumbIntermediateTip, 0.0, 0.0, 0.0);
    set_joint(&mut pose, HandJoint::IndexFingerIntermediateTip, 0.0, 0.0, 0.02);
    pose
}

/// Right hand palm up, rotated about X so the palm normal has Y = -0.7.
#[cfg(test)]
fn open_palm_pose() -> HandPose {
    let mut pose = make_pose(true);
    set_joint(&mut pose, HandJoint::ThumbTip, 0.075, 0.0, 0.0);
    set_joint(&mut pose, HandJoint::IndexFingerTip, 0.0, 0.0856965, -0.084);
    set_joint(&mut pose, HandJoint::LittleFingerTip, -0.075, 0.032136, -0.0315);
    pose
}

// ── Tests ──────────────────────────────────────────────────
