//! Time and sequence sources for CRDT metadata.
//!
//! Two kinds of "timestamp" appear in the system:
//! - a wall-clock-derived microsecond count used by the LWW register,
//!   best-effort monotonic (the register enforces local monotonicity
//!   itself by taking `max(current + 1, wall_clock_micros())`);
//! - a strictly increasing per-process counter used for OR-set tags,
//!   where uniqueness within the originating process is the only
//!   property correctness depends on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microseconds since the Unix epoch.
///
/// Saturates to 0 if the system clock reads before the epoch rather
/// than panicking in library code.
#[must_use]
pub fn wall_clock_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A strictly increasing per-process sequence source.
///
/// Every call to [`SeqGen::next`] returns a value greater than all
/// previous values from the same generator. Different processes draw
/// from disjoint tag domains by author identity, so no cross-process
/// coordination is needed.
#[derive(Debug, Default)]
pub struct SeqGen(AtomicU64);

impl SeqGen {
    /// Creates a generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next sequence value.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Advances the generator past `seen`, so locally generated
    /// sequences never collide with ones replayed from the wire.
    pub fn observe(&self, seen: u64) {
        self.0.fetch_max(seen, Ordering::Relaxed);
    }
}
