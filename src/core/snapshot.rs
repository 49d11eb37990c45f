// MeshTail - core/snapshot.rs
//
// Cursor-based extraction of new lines from the ring.
//
// Protocol:
//   - The client holds a cursor: the next sequence it has not seen.
//   - A cursor older than the earliest retained line, or newer than the
//     write cursor, is stale: it is clamped to the earliest line and the
//     response carries `truncated = true` ("discard your view").
//   - `next` is where the client resumes. It equals the write cursor when
//     the whole range fitted, or the first undelivered sequence when the
//     byte bound stopped the copy early, so tailing is gap-free and
//     duplicate-free while the client keeps up with the ring capacity.
//
// Exactly one allocation is made per snapshot, before any line is copied.
// The ring window is re-validated after it, and each line is copied under
// its own short lock, so no critical section grows with snapshot size.

use crate::core::ring::{RingStore, SlotMiss, Window};
use crate::util::constants::MAX_LINE_BYTES;
use crate::util::error::SnapshotError;

/// One polling response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Newline-delimited lines, possibly empty.
    pub payload: String,
    /// Cursor to send as `from` on the next call.
    pub next: u64,
    /// The caller's cursor was stale; it must drop its local view first.
    pub truncated: bool,
}

impl Snapshot {
    /// Iterate the delivered lines without their terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.payload.lines()
    }
}

/// Builds bounded snapshots of a ring.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotBuilder {
    max_bytes: usize,
}

impl SnapshotBuilder {
    /// `max_bytes` bounds the payload. It is raised to fit at least one
    /// full line so a client can always make progress.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes: max_bytes.max(MAX_LINE_BYTES + 1),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Extract lines `[from, write_cursor)` from `ring`.
    pub fn build(&self, ring: &RingStore, from: u64) -> Result<Snapshot, SnapshotError> {
        self.build_with(ring, from, |buf, n| buf.try_reserve_exact(n).is_ok())
    }

    // `reserve` stands in for the allocator so exhaustion can be exercised.
    fn build_with(
        &self,
        ring: &RingStore,
        from: u64,
        reserve: impl FnOnce(&mut String, usize) -> bool,
    ) -> Result<Snapshot, SnapshotError> {
        let observed = ring.window();
        let (start, mut truncated) = normalise(from, &observed);

        let wanted = observed
            .next
            .saturating_sub(start)
            .saturating_mul(MAX_LINE_BYTES as u64 + 1)
            .min(self.max_bytes as u64) as usize;

        let mut payload = String::new();
        if !reserve(&mut payload, wanted) {
            return Err(SnapshotError::OutOfMemory { requested: wanted });
        }

        // The ring may have moved while we were allocating.
        let current = ring.window();
        let mut seq = if current.generation != observed.generation {
            truncated = true;
            current.earliest
        } else {
            let (resumed, stale) = normalise(start, &current);
            truncated |= stale;
            resumed
        };

        while seq < current.next {
            // Bounded by the reservation, not `max_bytes`: lines that
            // arrived during allocation must not grow the buffer again.
            let copied = ring.read_line(current.generation, seq, |line| {
                if payload.len() + line.len() + 1 > wanted {
                    return false;
                }
                payload.push_str(line);
                payload.push('\n');
                true
            });
            match copied {
                Ok(true) => seq += 1,
                // Byte bound reached: resume here next time.
                Ok(false) => break,
                // Overtaken by writers: the next call sees a stale cursor
                // and reports the gap.
                Err(SlotMiss::Evicted) | Err(SlotMiss::NotYetWritten) => break,
                Err(SlotMiss::Cleared) => {
                    return Ok(Snapshot {
                        payload: String::new(),
                        next: 0,
                        truncated: true,
                    });
                }
            }
        }

        Ok(Snapshot {
            payload,
            next: seq,
            truncated,
        })
    }
}

/// Clamp a client cursor into `window`, reporting whether it was stale.
fn normalise(from: u64, window: &Window) -> (u64, bool) {
    if from < window.earliest || from > window.next {
        (window.earliest, true)
    } else {
        (from, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(capacity: usize, lines: &[&str]) -> RingStore {
        let ring = RingStore::new(capacity);
        for l in lines {
            ring.append(l);
        }
        ring
    }

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(64 * 1024)
    }

    #[test]
    fn test_snapshot_from_zero_returns_everything_in_order() {
        let ring = ring_with(8, &["one", "two", "three"]);
        let snap = builder().build(&ring, 0).unwrap();
        assert_eq!(snap.lines().collect::<Vec<_>>(), vec!["one", "two", "three"]);
        assert_eq!(snap.next, 3);
        assert!(!snap.truncated);
    }

    #[test]
    fn test_snapshot_after_wrap_reports_truncation() {
        let ring = ring_with(4, &["a", "b", "c", "d", "e"]);
        let snap = builder().build(&ring, 0).unwrap();
        assert!(snap.truncated);
        assert_eq!(snap.lines().collect::<Vec<_>>(), vec!["b", "c", "d", "e"]);
        assert_eq!(snap.next, 5);
    }

    #[test]
    fn test_cursor_in_window_is_incremental() {
        let ring = ring_with(8, &["a", "b"]);
        let first = builder().build(&ring, 0).unwrap();
        ring.append("c");
        let second = builder().build(&ring, first.next).unwrap();
        assert_eq!(second.payload, "c\n");
        assert_eq!(second.next, 3);
        assert!(!second.truncated);
    }

    #[test]
    fn test_cursor_ahead_of_writer_is_stale() {
        let ring = ring_with(8, &["a"]);
        let snap = builder().build(&ring, 42).unwrap();
        assert!(snap.truncated);
        assert_eq!(snap.payload, "a\n");
        assert_eq!(snap.next, 1);
    }

    #[test]
    fn test_caught_up_cursor_returns_empty_payload() {
        let ring = ring_with(8, &["a", "b"]);
        let snap = builder().build(&ring, 2).unwrap();
        assert!(snap.payload.is_empty());
        assert_eq!(snap.next, 2);
        assert!(!snap.truncated);
    }

    #[test]
    fn test_repeated_snapshot_is_identical() {
        let ring = ring_with(4, &["a", "b", "c", "d", "e", "f"]);
        let first = builder().build(&ring, 3).unwrap();
        let second = builder().build(&ring, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_byte_bound_stops_between_lines_and_resumes() {
        let line = "x".repeat(200);
        let ring = RingStore::new(16);
        for _ in 0..10 {
            ring.append(&line);
        }
        let small = SnapshotBuilder::new(1024);
        let first = small.build(&ring, 0).unwrap();
        // 201 bytes per line: five fit in 1024.
        assert_eq!(first.lines().count(), 5);
        assert_eq!(first.next, 5);
        assert!(!first.truncated);
        let second = small.build(&ring, first.next).unwrap();
        assert_eq!(second.lines().count(), 5);
        assert_eq!(second.next, 10);
    }

    #[test]
    fn test_allocation_failure_is_reported_without_data() {
        let ring = ring_with(4, &["a"]);
        let result = builder().build_with(&ring, 0, |_, _| false);
        assert!(matches!(result, Err(SnapshotError::OutOfMemory { .. })));
    }

    #[test]
    fn test_lines_arriving_during_allocation_stay_within_reservation() {
        let ring = ring_with(8, &["a"]);
        let long = "y".repeat(MAX_LINE_BYTES);
        let reserved = std::cell::Cell::new(0);
        let result = builder()
            .build_with(&ring, 0, |buf, n| {
                reserved.set(n);
                for _ in 0..7 {
                    ring.append(&long);
                }
                buf.try_reserve_exact(n).is_ok()
            })
            .unwrap();
        assert_eq!(reserved.get(), MAX_LINE_BYTES + 1);
        assert!(result.payload.len() <= reserved.get());
        assert_eq!(result.payload, "a\n");
        assert_eq!(result.next, 1);
        assert!(!result.truncated);

        // The rest is picked up by the next poll.
        let rest = builder().build(&ring, result.next).unwrap();
        assert_eq!(rest.lines().count(), 7);
        assert_eq!(rest.next, 8);
    }

    #[test]
    fn test_concurrent_tail_is_gap_free_and_ordered() {
        const TOTAL: usize = 3_000;
        let ring = RingStore::new(crate::util::constants::MAX_RING_LINES);
        let small = SnapshotBuilder::new(2 * 1024);
        let mut seen: Vec<String> = Vec::with_capacity(TOTAL);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..TOTAL {
                    ring.append(&format!("line {i}"));
                }
            });

            let mut cursor = 0;
            while seen.len() < TOTAL {
                let snap = small.build(&ring, cursor).unwrap();
                assert!(!snap.truncated, "reset at cursor {cursor}");
                seen.extend(snap.lines().map(str::to_string));
                cursor = snap.next;
                std::thread::yield_now();
            }
        });

        let expected: Vec<String> = (0..TOTAL).map(|i| format!("line {i}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_clear_during_allocation_restarts_from_new_epoch() {
        let ring = ring_with(4, &["old-1", "old-2"]);
        let result = builder()
            .build_with(&ring, 1, |buf, n| {
                ring.clear();
                ring.append("fresh");
                buf.try_reserve_exact(n).is_ok()
            })
            .unwrap();
        assert!(result.truncated);
        assert_eq!(result.payload, "fresh\n");
        assert_eq!(result.next, 1);
    }

    #[test]
    fn test_wrap_during_allocation_reclamps_cursor() {
        let ring = ring_with(4, &["a", "b", "c"]);
        let result = builder()
            .build_with(&ring, 0, |buf, n| {
                for l in ["d", "e", "f"] {
                    ring.append(l);
                }
                buf.try_reserve_exact(n).is_ok()
            })
            .unwrap();
        assert!(result.truncated);
        assert_eq!(result.lines().collect::<Vec<_>>(), vec!["c", "d", "e", "f"]);
        assert_eq!(result.next, 6);
    }
}
