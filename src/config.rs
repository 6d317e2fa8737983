use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::types::{Point, Tick};

/// Hand tracking and beat detection thresholds. The defaults were tuned by
/// hand against a 640x480 depth camera at roughly 30 frames per second.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "GestureConfig::default_sampler_capacity")]
    pub sampler_capacity: usize,
    /// Offset of the newer sample of the far velocity window.
    #[serde(default = "GestureConfig::default_far_offset")]
    pub far_offset: usize,
    #[serde(default = "GestureConfig::default_center_x")]
    pub center_x: i32,
    #[serde(default = "GestureConfig::default_center_y")]
    pub center_y: i32,
    /// Pixels the hand must move between the last two frames for a beat.
    #[serde(default = "GestureConfig::default_min_distance")]
    pub min_distance: f64,
    /// Far-window rising speed (pixels per tick) a rebound must exceed.
    #[serde(default = "GestureConfig::default_rebound_threshold")]
    pub rebound_threshold: f64,
}

impl GestureConfig {
    fn default_sampler_capacity() -> usize {
        5
    }
    fn default_far_offset() -> usize {
        3
    }
    fn default_center_x() -> i32 {
        320
    }
    fn default_center_y() -> i32 {
        240
    }
    fn default_min_distance() -> f64 {
        6.0
    }
    fn default_rebound_threshold() -> f64 {
        0.05
    }

    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            sampler_capacity: Self::default_sampler_capacity(),
            far_offset: Self::default_far_offset(),
            center_x: Self::default_center_x(),
            center_y: Self::default_center_y(),
            min_distance: Self::default_min_distance(),
            rebound_threshold: Self::default_rebound_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TempoConfig {
    /// Intervals averaged; 4 covers one bar of common time.
    #[serde(default = "TempoConfig::default_window")]
    pub window: usize,
    /// Ticks per beat assumed before the first interval is measured.
    #[serde(default = "TempoConfig::default_fallback_ticks_per_beat")]
    pub fallback_ticks_per_beat: f64,
}

impl TempoConfig {
    fn default_window() -> usize {
        4
    }
    fn default_fallback_ticks_per_beat() -> f64 {
        500.0
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            window: Self::default_window(),
            fallback_ticks_per_beat: Self::default_fallback_ticks_per_beat(),
        }
    }
}

/// Maps gesture acceleration onto MIDI velocity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DynamicsConfig {
    #[serde(default = "DynamicsConfig::default_velocity_scale")]
    pub velocity_scale: f64,
    #[serde(default = "DynamicsConfig::default_velocity_floor")]
    pub velocity_floor: u8,
    #[serde(default = "DynamicsConfig::default_velocity_ceiling")]
    pub velocity_ceiling: u8,
}

impl DynamicsConfig {
    fn default_velocity_scale() -> f64 {
        6_000.0
    }
    fn default_velocity_floor() -> u8 {
        15
    }
    fn default_velocity_ceiling() -> u8 {
        127
    }
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            velocity_scale: Self::default_velocity_scale(),
            velocity_floor: Self::default_velocity_floor(),
            velocity_ceiling: Self::default_velocity_ceiling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackConfig {
    /// Beat counter value at start and after every loop; the silent beats
    /// before zero seed the tempo tracker.
    #[serde(default = "PlaybackConfig::default_pre_roll")]
    pub pre_roll: i64,
}

impl PlaybackConfig {
    fn default_pre_roll() -> i64 {
        -5
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pre_roll: Self::default_pre_roll(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// How far in the past (ticks) a command may be and still be accepted.
    #[serde(default = "OutputConfig::default_late_tolerance")]
    pub late_tolerance: Tick,
    /// Case-insensitive substring of the MIDI port to open.
    #[serde(default)]
    pub midi_port: Option<String>,
    #[serde(default = "OutputConfig::default_master_gain")]
    pub master_gain: f32,
}

impl OutputConfig {
    fn default_late_tolerance() -> Tick {
        20
    }
    fn default_master_gain() -> f32 {
        0.25
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            late_tolerance: Self::default_late_tolerance(),
            midi_port: None,
            master_gain: Self::default_master_gain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConductorConfig {
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub tempo: TempoConfig,
    #[serde(default)]
    pub dynamics: DynamicsConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ConductorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.gesture;
        if g.sampler_capacity < 2 {
            return Err(ConfigError::TooSmall {
                field: "gesture.sampler_capacity",
                min: 2,
                value: g.sampler_capacity as i64,
            });
        }
        if g.far_offset < 1 {
            return Err(ConfigError::TooSmall {
                field: "gesture.far_offset",
                min: 1,
                value: 0,
            });
        }
        if g.far_offset + 1 >= g.sampler_capacity {
            return Err(ConfigError::WindowExceedsCapacity {
                far_offset: g.far_offset,
                capacity: g.sampler_capacity,
                needed: g.far_offset + 2,
            });
        }
        non_negative("gesture.min_distance", g.min_distance)?;
        non_negative("gesture.rebound_threshold", g.rebound_threshold)?;

        if self.tempo.window < 1 {
            return Err(ConfigError::TooSmall {
                field: "tempo.window",
                min: 1,
                value: 0,
            });
        }
        non_negative("tempo.fallback_ticks_per_beat", self.tempo.fallback_ticks_per_beat)?;
        if self.tempo.fallback_ticks_per_beat == 0.0 {
            return Err(ConfigError::TooSmall {
                field: "tempo.fallback_ticks_per_beat",
                min: 1,
                value: 0,
            });
        }

        let d = &self.dynamics;
        if d.velocity_floor > d.velocity_ceiling || d.velocity_ceiling > 127 {
            return Err(ConfigError::VelocityBounds {
                floor: d.velocity_floor,
                ceiling: d.velocity_ceiling,
            });
        }
        non_negative("dynamics.velocity_scale", d.velocity_scale)?;

        if self.playback.pre_roll >= 0 {
            return Err(ConfigError::PreRoll {
                pre_roll: self.playback.pre_roll,
            });
        }
        Ok(())
    }

    /// Reads `path`, or writes a commented-out default file there when it
    /// does not exist yet. Unreadable or malformed files fall back to the
    /// defaults with a warning.
    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            return match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                        Self::default()
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                    Self::default()
                }
            };
        }

        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, comment_out(&text)) {
                    warn!("Failed to write default config to {path}: {err}");
                } else {
                    info!("Wrote default config to {path}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}"),
        }
        default_cfg
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

/// Keeps section headers live and comments out every key so the file
/// documents the defaults without pinning them.
fn comment_out(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || (trimmed.starts_with('[') && trimmed.ends_with(']')) {
            out.push_str(line);
        } else {
            out.push_str("# ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
