use crate::error::{MotionError, Window};
use crate::sampler::PositionSampler;

/// Per-frame kinematics. Positive velocity means the hand is rising.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionState {
    /// Pixels per tick across the two newest samples.
    pub near_velocity: f64,
    /// Pixels per tick across the older window.
    pub far_velocity: f64,
    /// Magnitude of the velocity change between the windows, pixels per tick².
    pub acceleration: f64,
}

/// Derives [`MotionState`] from two windows of the sampler history: the
/// near window `at(1) -> at(0)` and the far window
/// `at(far_offset + 1) -> at(far_offset)`.
#[derive(Debug, Clone, Copy)]
pub struct MotionAnalyzer {
    far_offset: usize,
}

impl MotionAnalyzer {
    pub fn new(far_offset: usize) -> Self {
        Self { far_offset }
    }

    pub fn compute(&self, sampler: &PositionSampler) -> Result<MotionState, MotionError> {
        let newest = sampler.at(0);
        let previous = sampler.at(1);
        let far_newer = sampler.at(self.far_offset);
        let far_older = sampler.at(self.far_offset + 1);

        let near_dt = elapsed(previous.timestamp, newest.timestamp, Window::Near)?;
        let far_dt = elapsed(far_older.timestamp, far_newer.timestamp, Window::Far)?;

        // Pixel y grows downward; a rising hand must read positive.
        let near_velocity =
            -(f64::from(newest.position.y) - f64::from(previous.position.y)) / near_dt;
        let far_velocity =
            -(f64::from(far_newer.position.y) - f64::from(far_older.position.y)) / far_dt;

        let near_mid = (newest.timestamp as f64 + previous.timestamp as f64) / 2.0;
        let far_mid = (far_newer.timestamp as f64 + far_older.timestamp as f64) / 2.0;
        let mid_dt = near_mid - far_mid;
        if mid_dt <= 0.0 {
            return Err(MotionError::ZeroInterval {
                window: Window::Midpoint,
            });
        }

        Ok(MotionState {
            near_velocity,
            far_velocity,
            acceleration: (far_velocity - near_velocity).abs() / mid_dt,
        })
    }
}

fn elapsed(from: u64, to: u64, window: Window) -> Result<f64, MotionError> {
    match to.checked_sub(from) {
        Some(dt) if dt > 0 => Ok(dt as f64),
        _ => Err(MotionError::ZeroInterval { window }),
    }
}
