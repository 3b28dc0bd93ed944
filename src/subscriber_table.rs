use crate::invariants::debug_assert_monotonic;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct SubscriberSlot {
    occupied: AtomicBool,
    cancelled: AtomicBool,
    read: AtomicU64,
    generation: AtomicU64,
}

impl SubscriberSlot {
    fn new() -> Self {
        Self {
            occupied: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            read: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }
}

/// Identifies one claimed table slot together with the generation it was
/// claimed under, so a stale handle can be told apart from a live one after
/// its slot has been recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubscriberHandle {
    pub index: usize,
    pub generation: u64,
}

/// Fixed-capacity collection of subscriber cursors.
///
/// Claim and release are both lock-free: occupancy is a single `AtomicBool`
/// CAS, and every claim is stamped with a fresh generation drawn from a
/// table-wide counter. A stale handle — one whose slot was released and
/// claimed by a different subscriber in the meantime — fails every
/// subsequent lookup instead of silently operating on the new occupant.
/// This is the table's substitute for a mutex-guarded enumeration: no scan
/// ever needs to lock the table, because every field it reads is either
/// independently atomic or gated by the generation check.
pub(crate) struct SubscriberTable {
    slots: Box<[CachePadded<SubscriberSlot>]>,
    activity: AtomicU64,
}

impl SubscriberTable {
    pub(crate) fn new(max_subscribers: usize) -> Self {
        let slots = (0..max_subscribers)
            .map(|_| CachePadded::new(SubscriberSlot::new()))
            .collect();
        Self {
            slots,
            activity: AtomicU64::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claims the first free slot and stamps it with a fresh generation.
    pub(crate) fn claim(&self, initial_read: u64) -> Option<SubscriberHandle> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .occupied
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let generation = self.activity.fetch_add(1, Ordering::AcqRel) + 1;
                slot.read.store(initial_read, Ordering::Release);
                slot.cancelled.store(false, Ordering::Release);
                slot.generation.store(generation, Ordering::Release);
                return Some(SubscriberHandle { index, generation });
            }
        }
        None
    }

    fn slot(&self, handle: SubscriberHandle) -> Option<&SubscriberSlot> {
        let slot = &self.slots[handle.index];
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return None;
        }
        Some(slot)
    }

    /// Returns this subscriber's read cursor, or `None` if its slot has
    /// since been recycled (treat exactly like cancellation).
    pub(crate) fn read(&self, handle: SubscriberHandle) -> Option<u64> {
        self.slot(handle).map(|s| s.read.load(Ordering::Acquire))
    }

    pub(crate) fn set_read(&self, handle: SubscriberHandle, value: u64) {
        if let Some(slot) = self.slot(handle) {
            debug_assert_monotonic!("subscriber read", slot.read.load(Ordering::Relaxed), value);
            slot.read.store(value, Ordering::Release);
        }
    }

    /// `true` if the handle is cancelled or its slot is stale.
    pub(crate) fn is_cancelled(&self, handle: SubscriberHandle) -> bool {
        self.slot(handle)
            .map_or(true, |s| s.cancelled.load(Ordering::Acquire))
    }

    /// Marks cancelled and immediately frees the slot for reuse — there is
    /// no background scanner to do this later.
    pub(crate) fn cancel(&self, handle: SubscriberHandle) {
        if let Some(slot) = self.slot(handle) {
            slot.cancelled.store(true, Ordering::Release);
            slot.occupied.store(false, Ordering::Release);
        }
    }

    /// Number of occupied, non-cancelled slots.
    pub(crate) fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.occupied.load(Ordering::Acquire) && !s.cancelled.load(Ordering::Acquire))
            .count()
    }

    /// Minimum `read` cursor over every live, non-cancelled subscriber, or
    /// `fallback` (the channel's current write cursor) if there are none —
    /// an empty table applies no backpressure.
    pub(crate) fn slowest_live_read(&self, fallback: u64) -> u64 {
        let mut slowest: Option<u64> = None;
        for slot in self.slots.iter() {
            if !slot.occupied.load(Ordering::Acquire) || slot.cancelled.load(Ordering::Acquire) {
                continue;
            }
            let r = slot.read.load(Ordering::Acquire);
            slowest = Some(slowest.map_or(r, |s| s.min(r)));
        }
        slowest.unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_fills_and_rejects_when_full() {
        let table = SubscriberTable::new(2);
        assert!(table.claim(0).is_some());
        assert!(table.claim(0).is_some());
        assert!(table.claim(0).is_none());
    }

    #[test]
    fn cancel_frees_slot_with_fresh_generation() {
        let table = SubscriberTable::new(1);
        let h1 = table.claim(0).unwrap();
        table.cancel(h1);
        assert!(table.read(h1).is_none());
        assert!(table.is_cancelled(h1));

        let h2 = table.claim(9).unwrap();
        assert_eq!(h2.index, h1.index);
        assert_ne!(h2.generation, h1.generation);
        assert_eq!(table.read(h2), Some(9));
        assert!(!table.is_cancelled(h2));
    }

    #[test]
    fn slowest_live_read_ignores_cancelled_and_empty_table() {
        let table = SubscriberTable::new(4);
        assert_eq!(table.slowest_live_read(42), 42);

        let a = table.claim(10).unwrap();
        let b = table.claim(3).unwrap();
        assert_eq!(table.slowest_live_read(42), 3);

        table.cancel(b);
        assert_eq!(table.slowest_live_read(42), 10);

        table.cancel(a);
        assert_eq!(table.slowest_live_read(42), 42);
    }

    #[test]
    fn set_read_is_visible_through_same_handle() {
        let table = SubscriberTable::new(1);
        let h = table.claim(0).unwrap();
        table.set_read(h, 5);
        assert_eq!(table.read(h), Some(5));
    }
}
