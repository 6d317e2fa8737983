/// Fixed-capacity ring buffer. Once full, every push overwrites the oldest
/// entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Index the next push writes to.
    head: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// A full buffer with every slot set to `value`.
    pub fn filled(capacity: usize, value: T) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            slots: vec![value; capacity],
            capacity,
            head: 0,
        }
    }
}

impl<T> RingBuffer<T> {
    /// An empty buffer that grows up to `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.head] = item;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// The entry `offset` pushes behind the newest one (`0` is the newest).
    pub fn peek(&self, offset: usize) -> Option<&T> {
        let len = self.slots.len();
        if offset >= len {
            return None;
        }
        // While filling, head == len, so this lands inside the pushed range.
        let newest = (self.head + self.capacity - 1) % self.capacity;
        let index = (newest + self.capacity - offset) % self.capacity;
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).rev().filter_map(move |offset| self.peek(offset))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}
