//! Session state: the central struct the IPC surface drives.
//!
//! Single `SparklerState` owns the recognizer, the hand feed and the poses
//! being staged joint by joint, passed as `&mut` to every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::vr::gesture::{GestureConfig, GestureEvent, GestureRecognizer};
use crate::vr::hand_tracking::{Hand, HandFeed, HandPose, HandsSnapshot};

pub struct SparklerState {
    /// Per-frame gesture state machine.
    pub recognizer: GestureRecognizer,
    /// Latest tracked pose of each hand.
    pub feed: HandFeed,
    /// Pose being assembled for each hand before it is published.
    staged_left: HandPose,
    staged_right: HandPose,
    /// Zero point for frame times given in seconds.
    epoch: Instant,
    /// Frames evaluated so far.
    pub frames: u64,
}

impl SparklerState {
    pub fn new(config: GestureConfig) -> Self {
        info!(hand = config.dominant_hand.as_str(), "gesture recognizer ready");
        Self {
            recognizer: GestureRecognizer::new(config),
            feed: HandFeed::new(),
            staged_left: HandPose::new(Hand::Left),
            staged_right: HandPose::new(Hand::Right),
            epoch: Instant::now(),
            frames: 0,
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn staged(&self, hand: Hand) -> &HandPose {
        match hand {
            Hand::Left => &self.staged_left,
            Hand::Right => &self.staged_right,
        }
    }

    pub fn staged_mut(&mut self, hand: Hand) -> &mut HandPose {
        match hand {
            Hand::Left => &mut self.staged_left,
            Hand::Right => &mut self.staged_right,
        }
    }

    /// Publish the staged pose of a hand to the feed.
    pub fn publish(&mut self, hand: Hand, timestamp_ns: u64) -> bool {
        let pose = self.staged_mut(hand);
        pose.timestamp_ns = timestamp_ns;
        let pose = pose.clone();
        self.feed.publish(pose)
    }

    /// Frame time: `epoch + offset`, or the monotonic clock.
    ///
    /// `None` when the offset does not fit in an `Instant`.
    pub fn frame_time(&self, offset: Option<Duration>) -> Option<Instant> {
        match offset {
            Some(d) => self.epoch.checked_add(d),
            None => Some(Instant::now()),
        }
    }

    /// Evaluate one frame against the latest snapshot.
    pub fn run_frame(&mut self, now: Instant) -> (Arc<HandsSnapshot>, Vec<GestureEvent>) {
        let hands = self.feed.latest();
        let events = self.recognizer.update(&hands, now);
        self.frames += 1;
        (hands, events)
    }

    /// Reset gesture state and drop every pose.
    pub fn reset(&mut self) {
        self.recognizer.reset();
        self.feed.clear();
        self.staged_left = HandPose::new(Hand::Left);
        self.staged_right = HandPose::new(Hand::Right);
        self.frames = 0;
    }
}
