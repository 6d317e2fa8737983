/// Milliseconds on the sequencer clock.
pub type Tick = u64;

/// Pixel coordinate of the tracked hand. Screen-down is positive `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// One detected hand position and the tick it was captured at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSample {
    pub position: Point,
    pub timestamp: Tick,
}

impl PositionSample {
    pub const fn new(position: Point, timestamp: Tick) -> Self {
        Self {
            position,
            timestamp,
        }
    }
}
