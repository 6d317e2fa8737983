use crate::ring::RingBuffer;
use crate::types::Tick;

/// Moving average of the last few inter-beat intervals.
///
/// The average only ever covers completed intervals, so notes placed on a
/// beat use the tempo measured up to that beat and nothing later.
#[derive(Debug, Clone)]
pub struct TempoTracker {
    intervals: RingBuffer<Tick>,
    fallback_ticks_per_beat: f64,
    average: Option<f64>,
}

impl TempoTracker {
    pub fn new(window: usize, fallback_ticks_per_beat: f64) -> Self {
        Self {
            intervals: RingBuffer::with_capacity(window),
            fallback_ticks_per_beat,
            average: None,
        }
    }

    /// Records one beat-to-beat interval. Zero-length intervals carry no
    /// tempo information and are ignored.
    pub fn update(&mut self, interval: Tick) {
        if interval == 0 {
            return;
        }
        self.intervals.push(interval);
        let sum: u64 = self.intervals.iter().sum();
        self.average = Some(sum as f64 / self.intervals.len() as f64);
    }

    pub fn current_ticks_per_beat(&self) -> f64 {
        self.average.unwrap_or(self.fallback_ticks_per_beat)
    }

    pub fn bpm(&self) -> f64 {
        60_000.0 / self.current_ticks_per_beat()
    }

    /// Number of intervals currently averaged.
    pub fn observed(&self) -> usize {
        self.intervals.len()
    }
}
