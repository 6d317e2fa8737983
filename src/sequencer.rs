//! The seam between the conductor and whatever makes the sound.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::error::SchedulingError;
use crate::types::Tick;

/// A note-on or note-off due at an absolute sequencer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteCommand {
    pub channel: u8,
    pub key: u8,
    pub velocity: u8,
    pub tick: Tick,
    pub is_note_on: bool,
}

/// Accepts time-stamped note commands. Implementations drain them on their
/// own timeline; callers only enqueue and read the clock.
pub trait SequencerPort {
    /// Current tick. Never decreases.
    fn now(&self) -> Tick;

    /// Queues a command. A late or undeliverable command is refused and
    /// must not be retried.
    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError>;

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), SchedulingError>;

    /// Silences every channel before returning, including anything still
    /// queued.
    fn all_notes_off(&mut self);
}

impl<P: SequencerPort + ?Sized> SequencerPort for Box<P> {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError> {
        (**self).schedule(command)
    }

    fn program_change(&mut self, channel: u8, program: u8) -> Result<(), SchedulingError> {
        (**self).program_change(channel, program)
    }

    fn all_notes_off(&mut self) {
        (**self).all_notes_off()
    }
}

/// Refuses `tick` if it lies more than `tolerance` ticks before `now`.
pub fn check_due(tick: Tick, now: Tick, tolerance: Tick) -> Result<(), SchedulingError> {
    if tick.saturating_add(tolerance) < now {
        Err(SchedulingError::Late { tick, now })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Queued {
    command: NoteCommand,
    seq: u64,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.command.tick, self.seq).cmp(&(other.command.tick, other.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending commands ordered by due tick; equal ticks leave in the order
/// they were pushed.
#[derive(Debug, Default)]
pub struct CommandQueue {
    heap: BinaryHeap<Reverse<Queued>>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: NoteCommand) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Queued { command, seq }));
    }

    /// Tick of the earliest pending command.
    pub fn next_due(&self) -> Option<Tick> {
        self.heap.peek().map(|Reverse(q)| q.command.tick)
    }

    /// Removes and returns every command due at or before `now`, in order.
    pub fn drain_due(&mut self, now: Tick) -> Vec<NoteCommand> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|tick| tick <= now) {
            if let Some(Reverse(q)) = self.heap.pop() {
                due.push(q.command);
            }
        }
        due
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Wall-clock port that discards everything. Used when no output device is
/// available so the conductor can still run.
#[derive(Debug)]
pub struct NullSequencer {
    started: Instant,
    tolerance: Tick,
}

impl NullSequencer {
    pub fn new(tolerance: Tick) -> Self {
        Self {
            started: Instant::now(),
            tolerance,
        }
    }
}

impl SequencerPort for NullSequencer {
    fn now(&self) -> Tick {
        self.started.elapsed().as_millis() as Tick
    }

    fn schedule(&mut self, command: NoteCommand) -> Result<(), SchedulingError> {
        check_due(command.tick, self.now(), self.tolerance)
    }

    fn program_change(&mut self, _channel: u8, _program: u8) -> Result<(), SchedulingError> {
        Ok(())
    }

    fn all_notes_off(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tick: Tick, key: u8) -> NoteCommand {
        NoteCommand {
            channel: 0,
            key,
            velocity: 100,
            tick,
            is_note_on: true,
        }
    }

    #[test]
    fn drains_in_tick_order_fifo_on_ties() {
        let mut queue = CommandQueue::new();
        queue.push(note(30, 1));
        queue.push(note(10, 2));
        queue.push(note(10, 3));
        queue.push(note(50, 4));

        let keys: Vec<_> = queue.drain_due(30).iter().map(|c| c.key).collect();
        assert_eq!(keys, vec![2, 3, 1]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(50));
    }

    #[test]
    fn nothing_due_before_first_tick() {
        let mut queue = CommandQueue::new();
        queue.push(note(10, 1));
        assert!(queue.drain_due(9).is_empty());
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn late_beyond_tolerance_is_refused() {
        assert_eq!(check_due(100, 110, 20), Ok(()));
        assert_eq!(check_due(100, 120, 20), Ok(()));
        assert_eq!(
            check_due(100, 121, 20),
            Err(SchedulingError::Late { tick: 100, now: 121 })
        );
        assert_eq!(check_due(500, 0, 0), Ok(()));
    }
}
