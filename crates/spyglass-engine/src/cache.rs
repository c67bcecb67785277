//! Bounded recent-event cache.
//!
//! One instance per live session, used to replay recent history to newly
//! attached subscribers without touching the log. Fixed capacity chosen at
//! construction; once full, each push overwrites the logically oldest slot.
//! Losing the oldest entries is deliberate — long-running sessions must not
//! grow this buffer.

use spyglass_core::AgentEvent;

/// Default cache capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity circular buffer of the most recent events.
#[derive(Debug)]
pub struct RecentEventCache {
    slots: Vec<Option<AgentEvent>>,
    /// Next write position.
    head: usize,
    len: usize,
}

impl RecentEventCache {
    /// Create a cache holding at most `capacity` events (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// The fixed capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of events currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been pushed (or the cache was cleared).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store an event, overwriting the oldest once full. O(1).
    pub fn push(&mut self, event: AgentEvent) {
        self.slots[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// All held events in insertion order, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AgentEvent> {
        let capacity = self.capacity();
        // When not yet full the oldest entry is slot 0; once full it is
        // the slot `head` is about to overwrite.
        let start = if self.len < capacity { 0 } else { self.head };
        (0..self.len)
            .filter_map(|i| self.slots[(start + i) % capacity].clone())
            .collect()
    }

    /// Drop all held events.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl Default for RecentEventCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
