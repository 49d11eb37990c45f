// MeshTail - core/ring.rs
//
// Fixed-capacity circular store of text lines with a monotonic sequence
// counter.
//
// Concurrency:
//   - Slots, write cursor, held count and generation sit behind one mutex.
//     Every critical section is O(1) or O(line length): append copies one
//     capped line, `window` copies three integers, `read_line` copies one
//     line, `clear` swaps in a pre-built slot vector. Snapshots are
//     assembled outside the lock, one line at a time.
//   - Nothing in this module logs. The log recorder appends from inside the
//     tracing pipeline, so an event emitted here would re-enter `append`.
//
// Generations: `clear` advances a generation number. Readers and
// conditional writers carry the generation they observed so that a line
// from before the most recent clear can never be served or stored after it.

use crate::core::model::bound_line;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identifies one epoch of the ring between two clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Generation(pub u64);

/// Point-in-time view of the ring's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Sequence of the oldest line still retrievable.
    pub earliest: u64,
    /// Sequence the next appended line will receive.
    pub next: u64,
    /// Epoch this view belongs to.
    pub generation: Generation,
}

impl Window {
    /// Number of retrievable lines.
    pub fn len(&self) -> u64 {
        self.next - self.earliest
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, seq: u64) -> bool {
        seq >= self.earliest && seq < self.next
    }
}

/// Why `read_line` could not hand out a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMiss {
    /// The ring was cleared since the caller's window was taken.
    Cleared,
    /// The slot has been overwritten by a newer line.
    Evicted,
    /// The sequence has not been written yet.
    NotYetWritten,
}

/// Result of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored under this sequence number.
    Stored(u64),
    /// Rejected because the ring moved to a newer generation.
    StaleGeneration,
}

struct RingInner {
    slots: Vec<String>,
    write: u64,
    held: usize,
    generation: Generation,
}

impl RingInner {
    fn push(&mut self, line: &str) -> u64 {
        let capacity = self.slots.len();
        let seq = self.write;
        let slot = &mut self.slots[(seq % capacity as u64) as usize];
        slot.clear();
        slot.push_str(bound_line(line));
        self.write += 1;
        if self.held < capacity {
            self.held += 1;
        }
        seq
    }

    fn window(&self) -> Window {
        let held = self.held as u64;
        Window {
            earliest: self.write - held.min(self.write),
            next: self.write,
            generation: self.generation,
        }
    }
}

/// Bounded line history shared by every producer and reader.
pub struct RingStore {
    inner: Mutex<RingInner>,
    capacity: usize,
}

impl RingStore {
    /// Create an empty ring with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(RingInner {
                slots: vec![String::new(); capacity],
                write: 0,
                held: 0,
                generation: Generation::default(),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // A panic while holding the guard cannot leave the ring half-written:
    // `push` touches the slot before the counters, and a stale slot is
    // simply overwritten later. Recover the guard rather than propagate.
    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one line, overwriting the oldest slot once full.
    /// Returns the sequence assigned to the line.
    pub fn append(&self, line: &str) -> u64 {
        self.lock().push(line)
    }

    /// Append only if the ring is still in `generation`.
    ///
    /// Used by producers whose acceptance decision was taken against a
    /// selection epoch: if a clear slipped in between the decision and the
    /// append, the line belongs to a stream that is no longer buffered.
    pub fn append_in(&self, generation: Generation, line: &str) -> AppendOutcome {
        let mut inner = self.lock();
        if inner.generation != generation {
            return AppendOutcome::StaleGeneration;
        }
        AppendOutcome::Stored(inner.push(line))
    }

    /// Reset cursor and held count to zero, erase all stored text and
    /// advance to a new generation, which is returned.
    pub fn clear(&self) -> Generation {
        // Fresh slots are built and the old ones freed outside the lock.
        let fresh = vec![String::new(); self.capacity];
        let (generation, _stale) = {
            let mut inner = self.lock();
            let stale = std::mem::replace(&mut inner.slots, fresh);
            inner.write = 0;
            inner.held = 0;
            inner.generation = Generation(inner.generation.0 + 1);
            (inner.generation, stale)
        };
        generation
    }

    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    /// Consistent view of earliest/next/generation taken in one lock.
    pub fn window(&self) -> Window {
        self.lock().window()
    }

    /// Hand line `seq` of `generation` to `f` while the slot is pinned.
    ///
    /// `f` runs under the ring lock and must only copy the line.
    pub fn read_line<R>(
        &self,
        generation: Generation,
        seq: u64,
        f: impl FnOnce(&str) -> R,
    ) -> Result<R, SlotMiss> {
        let inner = self.lock();
        if inner.generation != generation {
            return Err(SlotMiss::Cleared);
        }
        let window = inner.window();
        if seq >= window.next {
            return Err(SlotMiss::NotYetWritten);
        }
        if seq < window.earliest {
            return Err(SlotMiss::Evicted);
        }
        let idx = (seq % self.capacity as u64) as usize;
        Ok(f(&inner.slots[idx]))
    }
}

impl std::fmt::Debug for RingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let window = self.window();
        f.debug_struct("RingStore")
            .field("capacity", &self.capacity)
            .field("earliest", &window.earliest)
            .field("next", &window.next)
            .field("generation", &window.generation.0)
            .finish()
    }
}
