use thiserror::Error;

use crate::types::Tick;

/// Fatal problems found while loading a score. Playback never starts with a
/// score that produced one of these.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScoreError {
    #[error("Failed to read score {path}: {message}")]
    Io { path: String, message: String },

    #[error("Missing {what} (expected {expected} entries, found {found})")]
    Truncated {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Unexpected trailing value '{token}' after the declared entries")]
    TrailingData { token: String },

    #[error("Invalid number '{token}' for {field}")]
    InvalidNumber { field: &'static str, token: String },

    #[error("Channel {channel} is out of range [0, 16)")]
    ChannelOutOfRange { channel: i64 },

    #[error("{field} {value} is out of range [0, 128)")]
    MidiValueOutOfRange { field: &'static str, value: i64 },

    #[error("Beat index {beat_index} is negative")]
    NegativeBeat { beat_index: i64 },

    #[error("Note-on flag must be 0 or 1, found {value}")]
    InvalidNoteFlag { value: i64 },

    #[error("PPQN must be positive, found {ppqn}")]
    InvalidPpqn { ppqn: i64 },

    #[error("Score contains no note events")]
    Empty,

    #[error("Event {index} at ({beat_index}, {tick_offset}) is out of order")]
    Unsorted {
        index: usize,
        beat_index: i64,
        tick_offset: u32,
    },
}

/// Inconsistent configuration values.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be at least {min}, found {value}")]
    TooSmall {
        field: &'static str,
        min: i64,
        value: i64,
    },

    #[error("far window offset {far_offset} needs a sampler capacity of at least {needed}, found {capacity}")]
    WindowExceedsCapacity {
        far_offset: usize,
        capacity: usize,
        needed: usize,
    },

    #[error("velocity floor {floor} must not exceed ceiling {ceiling} (ceiling at most 127)")]
    VelocityBounds { floor: u8, ceiling: u8 },

    #[error("pre-roll must be negative, found {pre_roll}")]
    PreRoll { pre_roll: i64 },

    #[error("{field} must be a finite, non-negative number, found {value}")]
    NotFinite { field: &'static str, value: f64 },
}

/// A single note the sequencer refused. Never fatal: the note is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("tick {tick} is already in the past (now {now})")]
    Late { tick: Tick, now: Tick },

    #[error("sequencer unavailable: {0}")]
    Unavailable(String),
}

/// A frame whose history cannot yield velocities.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionError {
    #[error("zero time delta across the {window} window")]
    ZeroInterval { window: Window },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Near,
    Far,
    Midpoint,
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Window::Near => "near",
            Window::Far => "far",
            Window::Midpoint => "midpoint",
        };
        f.write_str(name)
    }
}

/// Top-level error for everything that aborts before or outside the
/// control loop.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("output device error: {0}")]
    Device(String),
}
