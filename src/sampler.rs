use crate::ring::RingBuffer;
use crate::types::{Point, PositionSample};

/// Recent hand positions, newest first.
///
/// Every slot starts at the neutral `center` with timestamp 0 so the first
/// frames read a flat, well-defined history instead of garbage.
#[derive(Debug, Clone)]
pub struct PositionSampler {
    samples: RingBuffer<PositionSample>,
}

impl PositionSampler {
    pub fn new(capacity: usize, center: Point) -> Self {
        Self {
            samples: RingBuffer::filled(capacity, PositionSample::new(center, 0)),
        }
    }

    pub fn insert(&mut self, sample: PositionSample) {
        self.samples.push(sample);
    }

    /// The sample `offset` frames behind the most recent one, wrapping at
    /// capacity.
    pub fn at(&self, offset: usize) -> PositionSample {
        let offset = offset % self.samples.capacity();
        // The buffer is pre-filled, so every offset below capacity exists.
        *self
            .samples
            .peek(offset)
            .expect("pre-filled sampler holds every offset below capacity")
    }

    pub fn latest(&self) -> PositionSample {
        self.at(0)
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Samples from oldest to newest, for trace output.
    pub fn history(&self) -> impl Iterator<Item = &PositionSample> + '_ {
        self.samples.iter()
    }
}
