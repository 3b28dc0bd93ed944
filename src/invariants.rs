//! Debug assertion macros for the channel's concurrency invariants.
//!
//! These macros provide runtime checks for invariants that must hold across
//! every interleaving of producers and subscribers. They are only active in
//! debug builds (`#[cfg(debug_assertions)]`), so there is zero overhead in
//! release builds.
//!
//! Used by [`crate::ring`], [`crate::subscriber_table`] and [`crate::channel`].

// =============================================================================
// INV-RING-01: Bounded backpressure
// =============================================================================

/// Assert that the writer never outruns the slowest live subscriber by more
/// than the ring's capacity.
///
/// **Invariant**: `write - slowest_live_read ≤ capacity`
///
/// Used in: `Channel::send`/`fast_send`'s backpressure wait, once the gap
/// check has passed
macro_rules! debug_assert_backpressure_bound {
    ($write:expr, $slowest_read:expr, $capacity:expr) => {
        debug_assert!(
            $write.wrapping_sub($slowest_read) as usize <= $capacity,
            "INV-RING-01 violated: write {} outran slowest read {} beyond capacity {}",
            $write,
            $slowest_read,
            $capacity
        )
    };
}

// =============================================================================
// INV-RING-02: Monotonic cursors
// =============================================================================

/// Assert that a cursor (`write` or `committed`) only ever increases.
///
/// Used in: `Ring::claim()` for `write`, coalescer loop for `committed`
macro_rules! debug_assert_monotonic {
    ($name:literal, $old:expr, $new:expr) => {
        debug_assert!(
            $new >= $old,
            "INV-RING-02 violated: {} decreased from {} to {}",
            $name,
            $old,
            $new
        )
    };
}

// =============================================================================
// INV-RING-03: committed never outruns write
// =============================================================================

/// Assert that the committed watermark never exceeds the write cursor.
///
/// Used in: coalescer loop, after advancing `committed`
macro_rules! debug_assert_committed_not_past_write {
    ($committed:expr, $write:expr) => {
        debug_assert!(
            $committed <= $write,
            "INV-RING-03 violated: committed {} exceeds write {}",
            $committed,
            $write
        )
    };
}

// =============================================================================
// INV-SEQ-01: Slot rendezvous
// =============================================================================

/// Assert that a slot's published sequence matches the index a reader expects.
/// Overrun detection relies on this holding at publish time; it should never
/// fire on the writer side.
///
/// Used in: `Ring::write_value()`, just before retiring the occupant one lap
/// behind the index being published (called from `publish`/`fast_publish`)
macro_rules! debug_assert_slot_sequence {
    ($observed:expr, $expected:expr) => {
        debug_assert!(
            $observed == $expected,
            "INV-SEQ-01 violated: slot sequence {} does not match expected index {}",
            $observed,
            $expected
        )
    };
}

// =============================================================================
// INV-SUB-01: Subscriber read cursor bound
// =============================================================================

/// Assert that a subscriber's read cursor never runs ahead of the committed
/// watermark.
///
/// Used in: `Subscriber::drain()` before reading a slot
macro_rules! debug_assert_read_not_past_committed {
    ($read:expr, $committed:expr) => {
        debug_assert!(
            $read <= $committed,
            "INV-SUB-01 violated: subscriber read {} ahead of committed {}",
            $read,
            $committed
        )
    };
}

pub(crate) use debug_assert_backpressure_bound;
pub(crate) use debug_assert_committed_not_past_write;
pub(crate) use debug_assert_monotonic;
pub(crate) use debug_assert_read_not_past_committed;
pub(crate) use debug_assert_slot_sequence;
