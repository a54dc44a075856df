//! Hand tracking model and gesture recognition.
//!
//! Provides:
//! - `hand_tracking`: joint set, per-frame hand poses, latest-value feed
//! - `geometry`: vector helpers over world-space points
//! - `gesture`: snap / open-palm state machine

pub mod geometry;
pub mod gesture;
pub mod hand_tracking;

pub use gesture::{GestureConfig, GestureEvent, GestureRecognizer};
pub use hand_tracking::{Hand, HandFeed, HandJoint, HandPose, HandsSnapshot};
