//! Hand-position sources.
//!
//! The conductor only needs one tracked point per frame. Where that point
//! comes from (depth camera, recorded trace, simulation) is hidden behind
//! [`GestureInput`].

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::Point;

/// Produces one frame per call, blocking as long as it needs to.
pub trait GestureInput {
    /// `None` when the input is exhausted; `Some(None)` when this frame has
    /// no hand.
    fn next_frame(&mut self) -> Option<Option<Point>>;
}

impl<G: GestureInput + ?Sized> GestureInput for Box<G> {
    fn next_frame(&mut self) -> Option<Option<Point>> {
        (**self).next_frame()
    }
}

/// Replays a fixed list of frames without delay.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    frames: VecDeque<Option<Point>>,
}

impl ScriptedInput {
    pub fn new(frames: impl IntoIterator<Item = Option<Point>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl GestureInput for ScriptedInput {
    fn next_frame(&mut self) -> Option<Option<Point>> {
        self.frames.pop_front()
    }
}

/// Settings for [`SimulatedConductor`].
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub bpm: f64,
    pub frames_per_second: f64,
    pub center: Point,
    /// Vertical half-travel of the stroke in pixels.
    pub amplitude: f64,
    /// Random amplitude change per beat, as a fraction of `amplitude`.
    pub swell: f64,
    /// Pixel noise added to every frame.
    pub jitter: i32,
    /// Probability that a frame loses the hand.
    pub dropout: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            bpm: 100.0,
            frames_per_second: 30.0,
            center: Point::new(320, 240),
            amplitude: 120.0,
            swell: 0.4,
            jitter: 2,
            dropout: 0.02,
        }
    }
}

/// Synthetic conducting hand: a down-up stroke per beat with some
/// performer-like noise. Runs in real time, one frame period per call.
pub struct SimulatedConductor {
    settings: SimulationSettings,
    rng: StdRng,
    started: Option<Instant>,
    frame_period: Duration,
    frame_limit: Option<u64>,
    frames: u64,
    current_beat: u64,
    beat_amplitude: f64,
}

impl SimulatedConductor {
    pub fn new(settings: SimulationSettings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    /// Reproducible noise for dry runs.
    pub fn with_seed(settings: SimulationSettings, seed: u64) -> Self {
        Self::with_rng(settings, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SimulationSettings, rng: StdRng) -> Self {
        let fps = settings.frames_per_second.max(1.0);
        let amplitude = settings.amplitude;
        Self {
            frame_period: Duration::from_secs_f64(1.0 / fps),
            settings,
            rng,
            started: None,
            frame_limit: None,
            frames: 0,
            current_beat: 0,
            beat_amplitude: amplitude,
        }
    }

    /// Stop after `frames` frames instead of running forever.
    pub fn limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn beat_period_ms(&self) -> f64 {
        60_000.0 / self.settings.bpm.max(1.0)
    }

    /// Noise-free hand position `elapsed_ms` into the performance. Each beat
    /// starts at the bottom of the stroke, rises to the apex at mid-beat
    /// and falls back.
    pub fn position_at(&self, elapsed_ms: f64) -> Point {
        self.stroke(elapsed_ms, self.settings.amplitude)
    }

    fn stroke(&self, elapsed_ms: f64, amplitude: f64) -> Point {
        let phase = (elapsed_ms / self.beat_period_ms()).fract();
        let y = f64::from(self.settings.center.y) + amplitude * (TAU * phase).cos();
        // A little sideways sway, as real hands never move straight.
        let x = f64::from(self.settings.center.x) + 0.15 * amplitude * (TAU * phase).sin();
        Point::new(x.round() as i32, y.round() as i32)
    }
}

impl GestureInput for SimulatedConductor {
    fn next_frame(&mut self) -> Option<Option<Point>> {
        if self.frame_limit.is_some_and(|limit| self.frames >= limit) {
            return None;
        }
        let started = match self.started {
            Some(started) => {
                thread::sleep(self.frame_period);
                started
            }
            None => *self.started.insert(Instant::now()),
        };
        self.frames += 1;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let beat = (elapsed_ms / self.beat_period_ms()) as u64;
        if beat != self.current_beat {
            self.current_beat = beat;
            let swell = self.settings.swell.clamp(0.0, 0.9);
            let factor = if swell > 0.0 {
                self.rng.gen_range(1.0 - swell..=1.0 + swell)
            } else {
                1.0
            };
            self.beat_amplitude = self.settings.amplitude * factor;
        }

        if self.settings.dropout > 0.0 && self.rng.gen_bool(self.settings.dropout.min(1.0)) {
            return Some(None);
        }

        let mut point = self.stroke(elapsed_ms, self.beat_amplitude);
        let jitter = self.settings.jitter.abs();
        if jitter > 0 {
            point.x += self.rng.gen_range(-jitter..=jitter);
            point.y += self.rng.gen_range(-jitter..=jitter);
        }
        Some(Some(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_input_replays_then_ends() {
        let mut input = ScriptedInput::new([Some(Point::new(1, 2)), None]);
        assert_eq!(input.next_frame(), Some(Some(Point::new(1, 2))));
        assert_eq!(input.next_frame(), Some(None));
        assert_eq!(input.next_frame(), None);
    }

    #[test]
    fn stroke_bottoms_at_beat_start_and_peaks_mid_beat() {
        let sim = SimulatedConductor::with_seed(
            SimulationSettings {
                bpm: 120.0,
                ..SimulationSettings::default()
            },
            7,
        );
        assert_eq!(sim.beat_period_ms(), 500.0);
        // Screen-down is positive, so the bottom of the stroke has the largest y.
        assert_eq!(sim.position_at(0.0).y, 360);
        assert_eq!(sim.position_at(250.0).y, 120);
        assert_eq!(sim.position_at(500.0).y, 360);
    }

    #[test]
    fn limited_simulation_stops() {
        let settings = SimulationSettings {
            frames_per_second: 1000.0,
            dropout: 0.0,
            ..SimulationSettings::default()
        };
        let mut sim = SimulatedConductor::with_seed(settings, 1).limit(3);
        for _ in 0..3 {
            assert!(matches!(sim.next_frame(), Some(Some(_))));
        }
        assert_eq!(sim.next_frame(), None);
    }
}
