//! TOML configuration file.
//!
//! Every key is optional; anything left out keeps the recognizer default.
//!
//! ```toml
//! [gesture]
//! hand = "right"
//! snap_finger = "index"
//! snap_start_threshold = 0.02
//! snap_window_ms = 500
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::vr::gesture::{GestureConfig, SnapCountEdge, SnapFinger, SnapOrigin};
use crate::vr::hand_tracking::Hand;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gesture: GestureSection,
}

/// Overrides for [`GestureConfig`].
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GestureSection {
    pub enabled: Option<bool>,
    /// "left" or "right"
    pub hand: Option<String>,
    /// "index" or "middle"
    pub snap_finger: Option<String>,
    /// "midpoint" or "thumb-tip"
    pub snap_origin: Option<String>,
    /// "finish" or "done"
    pub count_on: Option<String>,
    pub snap_start_threshold: Option<f32>,
    pub snap_finish_threshold: Option<f32>,
    pub snap_done_threshold: Option<f32>,
    pub snap_window_ms: Option<u64>,
    pub open_palm_window_ms: Option<u64>,
    pub open_palm_normal_threshold: Option<f32>,
    pub degenerate_distance: Option<f32>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Resolve into a recognizer configuration.
    pub fn gesture_config(&self) -> Result<GestureConfig> {
        self.gesture.apply(GestureConfig::default())
    }
}

impl GestureSection {
    pub fn apply(&self, mut config: GestureConfig) -> Result<GestureConfig> {
        if let Some(enabled) = self.enabled {
            config.enabled = enabled;
        }
        if let Some(hand) = &self.hand {
            config.dominant_hand =
                Hand::parse(hand).ok_or_else(|| anyhow!("unknown hand {hand:?}"))?;
        }
        if let Some(finger) = &self.snap_finger {
            config.snap_finger =
                SnapFinger::parse(finger).ok_or_else(|| anyhow!("unknown snap_finger {finger:?}"))?;
        }
        if let Some(origin) = &self.snap_origin {
            config.snap_origin =
                SnapOrigin::parse(origin).ok_or_else(|| anyhow!("unknown snap_origin {origin:?}"))?;
        }
        if let Some(edge) = &self.count_on {
            config.count_on =
                SnapCountEdge::parse(edge).ok_or_else(|| anyhow!("unknown count_on {edge:?}"))?;
        }

        if let Some(v) = self.snap_start_threshold {
            config.snap_start_threshold_m = v;
        }
        if let Some(v) = self.snap_finish_threshold {
            config.snap_finish_threshold_m = v;
        }
        if let Some(v) = self.snap_done_threshold {
            config.snap_done_threshold_m = v;
        }
        if let Some(v) = self.degenerate_distance {
            config.degenerate_hand_distance_m = v;
        }
        if let Some(v) = self.open_palm_normal_threshold {
            config.open_palm_normal_threshold = v;
        }
        if let Some(ms) = self.snap_window_ms {
            config.snap_window = Duration::from_millis(ms);
        }
        if let Some(ms) = self.open_palm_window_ms {
            config.open_palm_window = Duration::from_millis(ms);
        }
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }
}
