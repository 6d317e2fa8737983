use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, trace};

use crate::beat::{BeatDetector, BeatState};
use crate::config::ConductorConfig;
use crate::error::{ConductorError, MotionError};
use crate::gesture::GestureInput;
use crate::motion::{MotionAnalyzer, MotionState};
use crate::sampler::PositionSampler;
use crate::scheduler::{NoteScheduler, Phase};
use crate::score::Score;
use crate::sequencer::SequencerPort;
use crate::tempo::TempoTracker;
use crate::types::{Point, PositionSample, Tick};

/// A beat detected on some frame, after the scheduler handled it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatReport {
    pub tick: Tick,
    pub beat: i64,
    pub ticks_per_beat: f64,
    pub velocity: u8,
    pub dispatched: usize,
    pub dropped: usize,
    pub looped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// No hand this frame; nothing was touched.
    HandLost,
    /// The history cannot yield velocities yet; detector and tempo untouched.
    Unsettled(MotionError),
    /// Evaluated, no beat.
    Idle(MotionState),
    Beat(BeatReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub lost_frames: u64,
    pub beats: u64,
    pub notes: u64,
    pub dropped: u64,
    pub loops: u64,
}

/// Everything one performance needs: gesture history, detector, tempo,
/// score cursor and the sequencer handle.
pub struct ConductorSession<P: SequencerPort> {
    sampler: PositionSampler,
    analyzer: MotionAnalyzer,
    detector: BeatDetector,
    tempo: TempoTracker,
    scheduler: NoteScheduler,
    port: P,
    last_beat_tick: Option<Tick>,
    stats: SessionStats,
    shut_down: bool,
}

impl<P: SequencerPort> ConductorSession<P> {
    pub fn new(config: &ConductorConfig, score: Score, mut port: P) -> Result<Self, ConductorError> {
        config.validate()?;
        let g = &config.gesture;
        let scheduler = NoteScheduler::new(score, config.dynamics.clone(), config.playback.pre_roll);
        scheduler.apply_programs(&mut port);
        info!(
            events = scheduler.score().len(),
            ppqn = scheduler.score().ppqn(),
            pre_roll = config.playback.pre_roll,
            "conductor session ready"
        );
        Ok(Self {
            sampler: PositionSampler::new(g.sampler_capacity, g.center()),
            analyzer: MotionAnalyzer::new(g.far_offset),
            detector: BeatDetector::new(g.min_distance, g.rebound_threshold),
            tempo: TempoTracker::new(config.tempo.window, config.tempo.fallback_ticks_per_beat),
            scheduler,
            port,
            last_beat_tick: None,
            stats: SessionStats::default(),
            shut_down: false,
        })
    }

    /// One iteration of the control loop.
    pub fn process_frame(&mut self, frame: Option<Point>) -> FrameOutcome {
        self.stats.frames += 1;
        let Some(position) = frame else {
            self.stats.lost_frames += 1;
            return FrameOutcome::HandLost;
        };

        let timestamp = self.port.now();
        self.sampler.insert(PositionSample::new(position, timestamp));
        trace!(
            history = ?self.sampler.history().map(|s| (s.position.x, s.position.y)).collect::<Vec<_>>(),
            "frame"
        );

        let motion = match self.analyzer.compute(&self.sampler) {
            Ok(motion) => motion,
            Err(err) => {
                trace!("skipping frame: {err}");
                return FrameOutcome::Unsettled(err);
            }
        };

        let Some(event) = self.detector.evaluate(&motion, &self.sampler) else {
            return FrameOutcome::Idle(motion);
        };

        if let Some(previous) = self.last_beat_tick {
            self.tempo.update(event.tick.saturating_sub(previous));
        }
        self.last_beat_tick = Some(event.tick);

        let ticks_per_beat = self.tempo.current_ticks_per_beat();
        let outcome = self
            .scheduler
            .on_beat(event.acceleration, ticks_per_beat, &mut self.port);

        self.stats.beats += 1;
        self.stats.notes += outcome.dispatched as u64;
        self.stats.dropped += outcome.dropped as u64;
        if outcome.looped {
            self.stats.loops += 1;
        }
        debug!(
            tick = event.tick,
            beat = outcome.beat,
            bpm = self.tempo.bpm(),
            "detected beat"
        );

        FrameOutcome::Beat(BeatReport {
            tick: event.tick,
            beat: outcome.beat,
            ticks_per_beat,
            velocity: outcome.velocity,
            dispatched: outcome.dispatched,
            dropped: outcome.dropped,
            looped: outcome.looped,
        })
    }

    /// Pulls frames until `stop` is raised or the input runs dry, then shuts
    /// down. The flag is checked before every frame.
    pub fn run<I: GestureInput + ?Sized>(&mut self, input: &mut I, stop: &AtomicBool) -> SessionStats {
        info!("control loop started");
        while !stop.load(Ordering::SeqCst) {
            let Some(frame) = input.next_frame() else {
                info!("gesture input exhausted");
                break;
            };
            self.process_frame(frame);
        }
        self.shutdown();
        self.stats
    }

    /// Silences the sequencer. Idempotent; also run on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.port.all_notes_off();
        let s = self.stats;
        info!(
            frames = s.frames,
            lost = s.lost_frames,
            beats = s.beats,
            notes = s.notes,
            dropped = s.dropped,
            loops = s.loops,
            "conductor session stopped"
        );
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn current_beat(&self) -> i64 {
        self.scheduler.current_beat()
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn beat_state(&self) -> BeatState {
        self.detector.state()
    }

    pub fn tempo(&self) -> &TempoTracker {
        &self.tempo
    }

    pub fn sampler(&self) -> &PositionSampler {
        &self.sampler
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}

impl<P: SequencerPort> Drop for ConductorSession<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
