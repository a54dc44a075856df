//! Sparkler - snap and open-palm gesture recognition from tracked hands.
//!
//! The recognizer consumes the latest known pose of each hand once per
//! frame and reports snap and fireball gestures for a presentation layer.

pub mod config;
pub mod ipc;
pub mod state;
pub mod vr;
