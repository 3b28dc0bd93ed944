use crate::invariants::{
    debug_assert_committed_not_past_write, debug_assert_monotonic, debug_assert_slot_sequence,
};
use crate::metrics::Metrics;
use crate::Config;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This is a multi-producer, multi-consumer ring: any number of producers may
// claim and publish slots concurrently, and any number of subscribers may
// read the same committed slot concurrently. There is no single "consumer
// side" cursor — each subscriber owns its own `read` cursor (see
// `crate::subscriber_table`).
//
// ## Cursors
//
// - `write`: next logical index to hand out. Advanced by `fetch_add` in the
//   multi-producer path, or by a plain store in the single-producer
//   (`fast_send`) path.
// - `committed`: highest index such that every index below it has been fully
//   written and is safe for any subscriber to read. Advanced by a
//   compare-exchange loop (the "commit coalescer", see `Ring::coalesce`)
//   because producers may finish writing out of claim order.
//
// ## Per-slot rendezvous
//
// A slot's `sequence` field is initialized to `physical_index - capacity`
// (so it can never collide with a real logical index near zero) and is
// release-stored with the slot's logical index once that index's value has
// been written. A reader accepts a slot iff its observed `sequence` equals
// the index it expects; this single field collapses what would otherwise be
// a three-state {empty, writing, committed} tag, since "writing" and
// "committed" are distinguished purely by whether that store has happened.
//
// ## Memory reclamation
//
// A slot's previous occupant (from `index - capacity`) is dropped in place
// immediately before the new value is written. This is safe because the
// backpressure invariant (`write - slowest_live_read <= capacity`, enforced
// by callers of `claim`) guarantees no live subscriber can still be reading
// that physical slot.
//
// =============================================================================

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    sequence: AtomicU64,
    timestamp: AtomicU64,
}

// Safety: access to `value` is gated entirely by the `sequence` rendezvous
// protocol described above, which is the same contract Send<T> + Sync
// relies on elsewhere in this crate.
unsafe impl<T: Send> Sync for Slot<T> {}

impl<T> Slot<T> {
    fn new(physical_index: u64, capacity: u64) -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            sequence: AtomicU64::new(physical_index.wrapping_sub(capacity)),
            timestamp: AtomicU64::new(0),
        }
    }
}

/// A reference to a committed slot's contents, valid for as long as no
/// producer has yet overwritten it (guaranteed by the caller's backpressure
/// check before this was obtained).
pub(crate) struct SlotView<'a, T> {
    pub value: &'a T,
    pub timestamp: u64,
}

/// Fixed-capacity circular array of slot records.
///
/// `buffer_capacity` is always a power of two (see `Config`), so index
/// wrapping is a mask rather than a modulo.
pub(crate) struct Ring<T> {
    write: CachePadded<AtomicU64>,
    committed: CachePadded<AtomicU64>,
    capacity: u64,
    mask: u64,
    slots: Box<[Slot<T>]>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    pub(crate) fn new(config: Config) -> Self {
        let capacity = config.capacity() as u64;
        let slots = (0..capacity).map(|i| Slot::new(i, capacity)).collect();
        Self {
            write: CachePadded::new(AtomicU64::new(0)),
            committed: CachePadded::new(AtomicU64::new(0)),
            capacity,
            mask: config.mask() as u64,
            slots,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub(crate) fn write(&self) -> u64 {
        self.write.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    #[inline]
    fn index(&self, logical: u64) -> usize {
        (logical & self.mask) as usize
    }

    // -------------------------------------------------------------------
    // Multi-producer path (`send`)
    // -------------------------------------------------------------------

    /// Atomically hands out the next logical index. The caller must publish
    /// it (eventually) or the commit watermark stalls forever at this index.
    #[inline]
    pub(crate) fn claim(&self) -> u64 {
        self.write.fetch_add(1, Ordering::Relaxed)
    }

    /// Writes `value` into the slot for `index` and release-stores its
    /// sequence, making it visible to the coalescer. Does not touch
    /// `committed`; call `coalesce` afterwards.
    pub(crate) fn publish(&self, index: u64, value: T, timestamp: u64, metrics: Option<&Metrics>) {
        self.write_value(index, value, timestamp);
        self.slots[self.index(index)]
            .sequence
            .store(index, Ordering::Release);
        self.coalesce(metrics);
    }

    /// Advances `committed` over every contiguous run of slots whose
    /// `sequence` has caught up to the watermark. Safe to call from any
    /// number of concurrent producers; at most one will win each step.
    fn coalesce(&self, metrics: Option<&Metrics>) {
        let mut c = self.committed.load(Ordering::Acquire);
        loop {
            let observed = self.slots[self.index(c)].sequence.load(Ordering::Acquire);
            if observed != c {
                break;
            }
            let next = c.wrapping_add(1);
            debug_assert_monotonic!("committed", c, next);
            debug_assert_committed_not_past_write!(next, self.write.load(Ordering::Relaxed));
            match self
                .committed
                .compare_exchange_weak(c, next, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => c = next,
                Err(actual) => {
                    if let Some(m) = metrics {
                        m.add_watermark_cas_retry();
                    }
                    if actual == c {
                        // Spurious failure; retry the same step.
                        continue;
                    }
                    c = actual;
                }
            }
        }
    }

    // -------------------------------------------------------------------
    // Single-producer path (`fast_send`)
    // -------------------------------------------------------------------

    /// Writes `value` into the slot for `index` (no timestamp recorded) and
    /// directly advances both `write` and `committed`. Caller must guarantee
    /// no concurrent caller of `fast_publish`/`claim` exists.
    pub(crate) fn fast_publish(&self, index: u64, value: T) {
        self.write_value(index, value, 0);
        let slot = &self.slots[self.index(index)];
        slot.sequence.store(index, Ordering::Release);
        let next = index.wrapping_add(1);
        debug_assert_monotonic!("write", index, next);
        self.write.store(next, Ordering::Release);
        self.committed.store(next, Ordering::Release);
    }

    fn write_value(&self, index: u64, value: T, timestamp: u64) {
        let slot = &self.slots[self.index(index)];
        if index >= self.capacity {
            // The occupant being retired must be the one published exactly
            // one lap ago; anything else means this slot was claimed while
            // still in use, which the backpressure check must have prevented.
            let expected_retiring = index.wrapping_sub(self.capacity);
            let observed = slot.sequence.load(Ordering::Relaxed);
            debug_assert_slot_sequence!(observed, expected_retiring);
            // SAFETY: the backpressure invariant guarantees no live
            // subscriber still references the occupant at `index - capacity`,
            // and that occupant was fully initialized when it was published.
            unsafe {
                std::ptr::drop_in_place((*slot.value.get()).as_mut_ptr());
            }
        }
        // SAFETY: this physical slot is exclusively owned by the claimer of
        // `index` until it is published below; no other writer can alias it.
        unsafe {
            (*slot.value.get()).write(value);
        }
        slot.timestamp.store(timestamp, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------
    // Reader path (shared by every subscriber)
    // -------------------------------------------------------------------

    /// Reads the slot at `index` if it is still the one published there.
    /// Returns `None` if the slot has already been overwritten (the
    /// subscriber has been lapped) or — which should not happen once
    /// `index < committed` has been checked — not yet published.
    pub(crate) fn try_read(&self, index: u64) -> Option<SlotView<'_, T>> {
        let slot = &self.slots[self.index(index)];
        if slot.sequence.load(Ordering::Acquire) != index {
            return None;
        }
        // SAFETY: the sequence match confirms this physical slot currently
        // holds the value published for `index`, and it cannot be
        // overwritten until a producer claims `index + capacity`, which the
        // backpressure invariant forbids while any subscriber still needs it.
        let value = unsafe { &*(*slot.value.get()).as_ptr() };
        let timestamp = slot.timestamp.load(Ordering::Relaxed);
        Some(SlotView { value, timestamp })
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let committed = *self.committed.get_mut();
        let oldest = committed.saturating_sub(self.capacity);
        let mut i = oldest;
        while i < committed {
            let idx = self.index(i);
            let slot = &mut self.slots[idx];
            if *slot.sequence.get_mut() == i {
                // SAFETY: still-committed slots within the retained window
                // hold a live, fully initialized value.
                unsafe {
                    std::ptr::drop_in_place((*slot.value.get_mut()).as_mut_ptr());
                }
            }
            i = i.wrapping_add(1);
        }
    }
}

fn clock_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic wall-clock in microseconds since this process first sent a
/// timestamped message, offset by one so a real timestamp is never `0` —
/// `0` is reserved as `fast_send`'s "no timestamp recorded" sentinel (see
/// `Subscriber::drain`'s age-filter skip check), and the raw epoch-elapsed
/// value can otherwise legitimately read `0` for the very first call. Used
/// for `send`'s per-message timestamp and the `max_age` filter in `drain`.
pub(crate) fn now_micros() -> u64 {
    clock_epoch().elapsed().as_micros() as u64 + 1
}
