#![allow(dead_code)]

use gesture_conductor::error::SchedulingError;
use gesture_conductor::gesture::{SimulatedConductor, SimulationSettings};
use gesture_conductor::score::{ProgramAssignment, Score, ScoreEvent};
use gesture_conductor::sequencer::{NoteCommand, SequencerPort};
use gesture_conductor::session::{BeatReport, ConductorSession, FrameOutcome};
use gesture_conductor::types::{Point, Tick};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Schedule(NoteCommand),
    Program(u8, u8),
    AllOff,
}

/// Sequencer with a hand-driven clock that records every call.
#[derive(Debug, Default)]
pub struct RecordingPort {
    pub now: Tick,
    pub calls: Vec<Call>,
}

impl RecordingPort {
    pub fn scheduled(&self) -> Vec<NoteCommand> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Schedule(cmd) => Some(*cmd),
                _ => None,
            })
            .collect()
    }

    pub fn all_off_count(&self) -> usize {
        self.calls.iter().filter(|c| **c == Call::AllOff).count()
    }
}

impl SequencerPort for RecordingPort {
    fn now(&self) -> Tick {
        self.now
    }

    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError> {
        self.calls.push(Call::Schedule(command));
        Ok(())
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), SchedulingError> {
        self.calls.push(Call::Program(channel, program));
        Ok(())
    }

    fn all_notes_off(&mut self) {
        self.calls.push(Call::AllOff);
    }
}

pub fn note(beat_index: i64, tick_offset: u32, key: u8, is_note_on: bool) -> ScoreEvent {
    ScoreEvent {
        beat_index,
        tick_offset,
        channel: 0,
        key,
        is_note_on,
    }
}

pub fn score(events: Vec<ScoreEvent>) -> Score {
    Score::new(
        24,
        vec![ProgramAssignment {
            channel: 0,
            program: 0,
        }],
        events,
    )
    .unwrap()
}

/// Noise-free conducting stroke sampled every `frame_ms`, as (tick, position).
pub fn stroke(bpm: f64, frame_ms: Tick, frames: usize) -> Vec<(Tick, Point)> {
    let sim = SimulatedConductor::with_seed(
        SimulationSettings {
            bpm,
            ..SimulationSettings::default()
        },
        0,
    );
    (0..frames as Tick)
        .map(|i| {
            let t = i * frame_ms;
            (t, sim.position_at(t as f64))
        })
        .collect()
}

/// Feeds frames with the port clock set to each frame's tick.
pub fn feed(
    session: &mut ConductorSession<RecordingPort>,
    frames: &[(Tick, Point)],
) -> Vec<BeatReport> {
    let mut beats = Vec::new();
    for &(tick, position) in frames {
        session.port_mut().now = tick;
        if let FrameOutcome::Beat(report) = session.process_frame(Some(position)) {
            beats.push(report);
        }
    }
    beats
}

/// Feeds frames until `count` beats have been detected; returns them with the
/// remaining frames.
pub fn feed_beats<'a>(
    session: &mut ConductorSession<RecordingPort>,
    frames: &'a [(Tick, Point)],
    count: usize,
) -> (Vec<BeatReport>, &'a [(Tick, Point)]) {
    let mut beats = Vec::new();
    for (i, &(tick, position)) in frames.iter().enumerate() {
        if beats.len() == count {
            return (beats, &frames[i..]);
        }
        session.port_mut().now = tick;
        if let FrameOutcome::Beat(report) = session.process_frame(Some(position)) {
            beats.push(report);
        }
    }
    (beats, &frames[frames.len()..])
}
