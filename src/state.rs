use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::sequencer::CommandQueue;
use crate::types::Tick;

/// A sounding note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Voice {
    pub velocity: u8,
    /// Oscillator phase in [0, 1).
    pub phase: f32,
}

/// State shared between the control loop and the audio callback.
///
/// Lock order is always `pending` then `voices`; the callback holds both
/// while applying due commands so a panic stop can never interleave with
/// it.
#[derive(Debug)]
pub struct SynthState {
    /// Commands not yet due.
    pub pending: Mutex<CommandQueue>,

    /// Sounding notes keyed by (channel, key).
    pub voices: Mutex<HashMap<(u8, u8), Voice>>,

    /// Current program per MIDI channel.
    pub programs: Mutex<[u8; 16]>,

    /// Frames rendered so far; this is the clock.
    pub frames_rendered: AtomicU64,

    pub sample_rate: AtomicU32,

    /// Set once the output stream is playing.
    pub running: AtomicBool,
}

impl SynthState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(CommandQueue::new()),
            voices: Mutex::new(HashMap::new()),
            programs: Mutex::new([0; 16]),
            frames_rendered: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
            running: AtomicBool::new(false),
        })
    }

    /// Milliseconds of audio rendered.
    pub fn now(&self) -> Tick {
        let rate = u64::from(self.sample_rate.load(Ordering::Acquire));
        if rate == 0 {
            return 0;
        }
        self.frames_rendered.load(Ordering::Acquire) * 1000 / rate
    }
}

/// Locks `mutex`, recovering the data if another thread panicked while
/// holding it. The audio callback must never panic on a poisoned lock.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
