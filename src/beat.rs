//! Two-phase hysteresis over [`MotionState`].
//!
//! Arming is loose: any reversal from falling to rising will do. Firing is
//! strict: the hand must have travelled at least `min_distance` between the
//! last two frames, be falling now, and have been rising faster than
//! `rebound_threshold` in the far window. Jitter around the bottom of the
//! stroke can re-arm the detector but never fire it, so one rebound gives
//! exactly one beat.

use tracing::trace;

use crate::motion::MotionState;
use crate::sampler::PositionSampler;
use crate::types::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatState {
    /// Armed; waiting for the downward rebound that fires a beat.
    AwaitingTrigger,
    /// Fired (or fresh); waiting for the hand to bottom out and rise.
    AwaitingReset,
}

/// Emitted once per completed down-beat gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatEvent {
    /// Timestamp of the sample that completed the gesture.
    pub tick: Tick,
    /// Acceleration magnitude of the firing frame.
    pub acceleration: f64,
}

#[derive(Debug, Clone)]
pub struct BeatDetector {
    state: BeatState,
    min_distance: f64,
    rebound_threshold: f64,
}

impl BeatDetector {
    pub fn new(min_distance: f64, rebound_threshold: f64) -> Self {
        Self {
            state: BeatState::AwaitingReset,
            min_distance,
            rebound_threshold,
        }
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    pub fn evaluate(&mut self, motion: &MotionState, sampler: &PositionSampler) -> Option<BeatEvent> {
        match self.state {
            BeatState::AwaitingReset => {
                if motion.near_velocity > 0.0 && motion.far_velocity < 0.0 {
                    trace!(near = motion.near_velocity, far = motion.far_velocity, "beat detector armed");
                    self.state = BeatState::AwaitingTrigger;
                }
                None
            }
            BeatState::AwaitingTrigger => {
                let newest = sampler.at(0);
                let travelled = newest.position.distance(&sampler.at(1).position);
                if travelled > self.min_distance
                    && motion.near_velocity < 0.0
                    && motion.far_velocity > self.rebound_threshold
                {
                    self.state = BeatState::AwaitingReset;
                    Some(BeatEvent {
                        tick: newest.timestamp,
                        acceleration: motion.acceleration,
                    })
                } else {
                    None
                }
            }
        }
    }
}
