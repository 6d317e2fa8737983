//! Gesture conductor: turns a tracked hand position into beats, follows
//! the performer's tempo and schedules the score's notes on a sequencer.
//!
//! Per frame: [`sampler`] → [`motion`] → [`beat`] → (on a beat) [`tempo`]
//! and [`scheduler`] → [`sequencer::SequencerPort`]. [`session`] owns the
//! whole pipeline.

pub mod audio;
pub mod beat;
pub mod config;
pub mod error;
pub mod gesture;
pub mod midi;
pub mod motion;
pub mod ring;
pub mod sampler;
pub mod scheduler;
pub mod score;
pub mod sequencer;
pub mod session;
pub mod state;
pub mod tempo;
pub mod types;

pub use config::ConductorConfig;
pub use error::{ConductorError, ScoreError};
pub use score::Score;
pub use sequencer::SequencerPort;
pub use session::ConductorSession;
