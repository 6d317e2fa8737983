//! Walks the score one detected beat at a time.
//!
//! Beats below zero are the count-in: they advance the counter (and, in the
//! session, feed the tempo tracker) without sounding anything. From beat 0
//! on, every event whose beat has arrived is scheduled ahead of time at
//! `now + ticks_per_beat * tick_offset / ppqn`. One beat after the last
//! event the score loops back to the count-in.
//!
//! The counter rests one below `pre_roll` so the first detected beat of a
//! pass is numbered `pre_roll`: a pre-roll of -5 gives five silent beats and
//! the sixth plays beat 0.

use tracing::{debug, info, warn};

use crate::config::DynamicsConfig;
use crate::score::Score;
use crate::sequencer::{NoteCommand, SequencerPort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CountIn,
    Playing,
}

/// What a single beat did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeatOutcome {
    /// Beat counter after this beat (before any loop reset).
    pub beat: i64,
    pub velocity: u8,
    pub dispatched: usize,
    pub dropped: usize,
    pub looped: bool,
}

#[derive(Debug, Clone)]
pub struct NoteScheduler {
    score: Score,
    dynamics: DynamicsConfig,
    pre_roll: i64,
    current_beat: i64,
    next_event: usize,
}

impl NoteScheduler {
    pub fn new(score: Score, dynamics: DynamicsConfig, pre_roll: i64) -> Self {
        Self {
            score,
            dynamics,
            pre_roll,
            current_beat: pre_roll - 1,
            next_event: 0,
        }
    }

    pub fn current_beat(&self) -> i64 {
        self.current_beat
    }

    pub fn next_event_index(&self) -> usize {
        self.next_event
    }

    pub fn phase(&self) -> Phase {
        if self.current_beat < 0 {
            Phase::CountIn
        } else {
            Phase::Playing
        }
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    /// Sends every program assignment in the score. Failures are logged;
    /// the channel keeps whatever instrument it had.
    pub fn apply_programs<P: SequencerPort + ?Sized>(&self, port: &mut P) {
        for assignment in self.score.programs() {
            if let Err(err) = port.program_change(assignment.channel, assignment.program) {
                warn!(
                    channel = assignment.channel,
                    program = assignment.program,
                    "program change failed: {err}"
                );
            }
        }
    }

    /// Linear map from acceleration magnitude to MIDI velocity, clamped to
    /// the configured floor and ceiling. NaN gives the floor, infinity the
    /// ceiling.
    pub fn velocity_for(&self, acceleration: f64) -> u8 {
        let ceiling = self.dynamics.velocity_ceiling.min(127);
        let floor = self.dynamics.velocity_floor.min(ceiling);
        let scaled = (acceleration.abs() * self.dynamics.velocity_scale).round();
        if !scaled.is_finite() {
            return if scaled.is_nan() { floor } else { ceiling };
        }
        scaled.clamp(f64::from(floor), f64::from(ceiling)) as u8
    }

    pub fn on_beat<P: SequencerPort + ?Sized>(
        &mut self,
        acceleration: f64,
        ticks_per_beat: f64,
        port: &mut P,
    ) -> BeatOutcome {
        self.current_beat += 1;
        let velocity = self.velocity_for(acceleration);
        let mut outcome = BeatOutcome {
            beat: self.current_beat,
            velocity,
            dispatched: 0,
            dropped: 0,
            looped: false,
        };

        if self.phase() == Phase::Playing {
            let now = port.now();
            let ppqn = f64::from(self.score.ppqn());
            let events = self.score.events();
            while let Some(event) = events.get(self.next_event) {
                if event.beat_index > self.current_beat {
                    break;
                }
                let delay = (ticks_per_beat * f64::from(event.tick_offset) / ppqn).round();
                let command = NoteCommand {
                    channel: event.channel,
                    key: event.key,
                    velocity,
                    tick: now + delay.max(0.0) as u64,
                    is_note_on: event.is_note_on,
                };
                match port.schedule(command) {
                    Ok(()) => outcome.dispatched += 1,
                    Err(err) => {
                        warn!(
                            channel = command.channel,
                            key = command.key,
                            tick = command.tick,
                            "dropping note: {err}"
                        );
                        outcome.dropped += 1;
                    }
                }
                // Served exactly once, even when the port refused it.
                self.next_event += 1;
            }
        }

        if self.next_event >= self.score.len() && self.score.last_beat() < self.current_beat {
            self.loop_reset(port);
            outcome.looped = true;
        }

        debug!(
            beat = outcome.beat,
            velocity,
            dispatched = outcome.dispatched,
            dropped = outcome.dropped,
            "beat"
        );
        outcome
    }

    /// Silences everything, restores instruments and rewinds to the
    /// count-in. Runs to completion before the next beat can schedule.
    fn loop_reset<P: SequencerPort + ?Sized>(&mut self, port: &mut P) {
        port.all_notes_off();
        self.apply_programs(port);
        self.current_beat = self.pre_roll - 1;
        self.next_event = 0;
        info!(pre_roll = self.pre_roll, "end of score, looping");
    }
}
