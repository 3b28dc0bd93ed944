//! Channel facade: ties the ring, the subscriber table and the subscriber
//! state machine together and is the only module collaborators touch
//! directly (`Channel::new`, `send`/`fast_send`, `close`, `subscribe`).
//!
//! # Close-error storage
//!
//! A channel's close error is written at most once, by whichever `close()`
//! call wins a CAS on `closed`. It is stored in a plain `UnsafeCell` guarded
//! by that same one-way flag plus a second flag recording whether an error
//! was actually supplied (`close(None)` is the common case and must not
//! require `E: Default`). This mirrors the slot rendezvous in `ring.rs`:
//! one atomic gates visibility of data behind an `UnsafeCell`.

use crate::backoff::Backoff;
use crate::error::SubscribeError;
use crate::invariants::debug_assert_backpressure_bound;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ring::{now_micros, Ring};
use crate::subscriber::Subscriber;
use crate::subscriber_table::SubscriberTable;
use crate::Config;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sentinel for [`Channel::subscribe`]'s `replay` argument meaning "the
/// oldest index still resident in the ring", i.e. replay everything kept.
pub const REPLAY_ALL: u64 = u64::MAX;

struct CloseSlot<E> {
    closed: AtomicBool,
    has_error: AtomicBool,
    error: UnsafeCell<MaybeUninit<E>>,
}

// Safety: `error` is written at most once, behind the `closed` CAS below,
// before any other thread can observe `has_error == true` via `Acquire`.
unsafe impl<E: Send> Sync for CloseSlot<E> {}

impl<E> CloseSlot<E> {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            has_error: AtomicBool::new(false),
            error: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns `true` if this call was the one that closed the channel.
    fn close(&self, error: Option<E>) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(e) = error {
            // SAFETY: we just won the one-way `closed` CAS; no other caller
            // of `close` can be writing here concurrently, and readers only
            // look at `error` after observing `has_error == true`.
            unsafe {
                (*self.error.get()).write(e);
            }
            self.has_error.store(true, Ordering::Release);
        }
        true
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn error(&self) -> Option<&E> {
        if !self.has_error.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: `has_error` is only set after `error` was fully written,
        // and is never unset.
        Some(unsafe { (*self.error.get()).assume_init_ref() })
    }
}

impl<E> Drop for CloseSlot<E> {
    fn drop(&mut self) {
        if *self.has_error.get_mut() {
            // SAFETY: `has_error` confirms the cell was initialized.
            unsafe {
                (*self.error.get_mut()).assume_init_drop();
            }
        }
    }
}

pub(crate) struct ChannelInner<T, E> {
    pub(crate) ring: Ring<T>,
    pub(crate) subs: SubscriberTable,
    close_slot: CloseSlot<E>,
    pub(crate) metrics: Option<Metrics>,
}

impl<T, E> ChannelInner<T, E> {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.close_slot.is_closed()
    }

    pub(crate) fn close_error(&self) -> Option<&E> {
        self.close_slot.error()
    }
}

/// A bounded, in-memory multicast broadcast channel with replay.
///
/// Any number of producers may call [`send`](Channel::send) concurrently;
/// any number of consumers may [`subscribe`](Channel::subscribe) and each
/// receives the full committed sequence (or a tail of it) independently.
/// There is no internal dispatcher thread — all coordination happens inline,
/// via atomics, on whichever thread calls in.
pub struct Channel<T, E = ()> {
    inner: Arc<ChannelInner<T, E>>,
}

impl<T, E> Channel<T, E> {
    /// Creates a new channel with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let metrics = config.enable_metrics.then(Metrics::new);
        Self {
            inner: Arc::new(ChannelInner {
                ring: Ring::new(config),
                subs: SubscriberTable::new(config.max_subscribers),
                close_slot: CloseSlot::new(),
                metrics,
            }),
        }
    }

    /// Single-producer send. Not safe for concurrent callers — serialize
    /// external to the channel if more than one thread needs to call this.
    /// Records no timestamp, so `max_age` filtering never skips it.
    ///
    /// No-op if the channel is closed.
    pub fn fast_send(&self, value: T) {
        let mut backoff = Backoff::new();
        loop {
            if self.inner.is_closed() {
                return;
            }
            let i = self.inner.ring.write();
            let slowest = self.inner.subs.slowest_live_read(i);
            let capacity = self.inner.ring.capacity();
            if i.wrapping_sub(slowest) < capacity {
                debug_assert_backpressure_bound!(i, slowest, capacity as usize);
                self.inner.ring.fast_publish(i, value);
                if let Some(m) = &self.inner.metrics {
                    m.add_messages_sent(1);
                }
                return;
            }
            backoff.snooze();
        }
    }

    /// Multi-producer send. Safe to call concurrently from any number of
    /// threads; commit order follows claim (fetch-add) order, not the order
    /// writes finish in.
    ///
    /// No-op if the channel is observed closed *before* a slot is claimed.
    /// Once a slot has been claimed this call always publishes it — aborting
    /// mid-wait would strand that index and stall the commit watermark for
    /// every later index forever (see `DESIGN.md`).
    pub fn send(&self, value: T) {
        if self.inner.is_closed() {
            return;
        }
        let i = self.inner.ring.claim();
        self.wait_for_space(i);
        let ts = now_micros();
        self.inner.ring.publish(i, value, ts, self.inner.metrics.as_ref());
        if let Some(m) = &self.inner.metrics {
            m.add_messages_sent(1);
        }
    }

    fn wait_for_space(&self, claimed: u64) {
        let mut backoff = Backoff::new();
        loop {
            // Fallback to `claimed` itself, not the current `write` cursor:
            // with an empty subscriber table this must mean "no backpressure",
            // and `write` has already moved past `claimed` (it was incremented
            // by this call's own `claim()`), which would make the gap look
            // permanently over capacity.
            let slowest = self.inner.subs.slowest_live_read(claimed);
            let capacity = self.inner.ring.capacity();
            if claimed.wrapping_sub(slowest) < capacity {
                debug_assert_backpressure_bound!(claimed, slowest, capacity as usize);
                return;
            }
            backoff.snooze();
        }
    }

    /// Closes the channel. Idempotent: only the first call's `error` (if
    /// any) is retained and later delivered to every subscriber's terminal
    /// [`DrainEvent::Done`](crate::DrainEvent::Done). Returns `true` if this
    /// call was the one that closed it.
    pub fn close(&self, error: Option<E>) -> bool {
        let first = self.inner.close_slot.close(error);
        if first {
            tracing::debug!("channel closed");
        }
        first
    }

    /// Returns `true` once `close` has been called (by any thread).
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Registers a new subscriber with the given replay depth. `0` means
    /// "only future messages"; [`REPLAY_ALL`] means "everything still
    /// resident in the ring". Succeeds even after `close` — a late
    /// subscriber may still replay the buffered tail and then observe close.
    ///
    /// # Errors
    ///
    /// Returns [`SubscribeError::OutOfSubscribers`] if the table has no free
    /// slot.
    pub fn subscribe(&self, replay: u64) -> Result<Subscriber<T, E>, SubscribeError> {
        let committed = self.inner.ring.committed();
        let capacity = self.inner.ring.capacity();
        let oldest_retained = committed.saturating_sub(capacity);
        let available_history = committed - oldest_retained;

        let read = if replay == REPLAY_ALL {
            oldest_retained
        } else {
            committed - replay.min(available_history)
        };

        let handle = self.inner.subs.claim(read).ok_or(SubscribeError::OutOfSubscribers {
            capacity: self.inner.subs.capacity(),
        })?;

        if let Some(m) = &self.inner.metrics {
            m.add_subscribe();
        }
        tracing::debug!(replay, read, "subscriber registered");

        Ok(Subscriber::new(Arc::clone(&self.inner), handle))
    }

    /// Number of currently live (non-cancelled) subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subs.live_count()
    }

    /// Snapshot of accumulated metrics, or `None` if the channel was built
    /// with `Config::with_metrics(false)` (the default).
    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.inner.metrics.as_ref().map(Metrics::snapshot)
    }
}

impl<T, E> Clone for Channel<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

// Safety: Channel is Send + Sync as long as T and E are Send; E additionally
// needs Sync since `close_error()` hands out shared references to it from
// any subscribing thread.
unsafe impl<T: Send, E: Send + Sync> Send for Channel<T, E> {}
unsafe impl<T: Send, E: Send + Sync> Sync for Channel<T, E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloseReason, DrainEvent};

    #[test]
    fn send_with_no_subscribers_applies_no_backpressure() {
        // Regression: `wait_for_space` must not use the post-increment
        // `write` cursor as its empty-table fallback — that makes the gap
        // look permanently over capacity and spins forever.
        let ch: Channel<u64> = Channel::new(Config::new(4, 1));
        for i in 0..10u64 {
            ch.send(i);
        }
        ch.close(None);

        let sub = ch.subscribe(REPLAY_ALL).unwrap();
        let mut seen = Vec::new();
        sub.drain(
            |event| {
                if let DrainEvent::Item(v) = event {
                    seen.push(*v);
                }
                true
            },
            None,
        );
        assert_eq!(seen, vec![6, 7, 8, 9]);
    }

    #[test]
    fn fast_send_then_subscribe_replay_all_sees_it() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        ch.fast_send(1);
        ch.fast_send(2);
        ch.close(None);

        let sub = ch.subscribe(REPLAY_ALL).unwrap();
        let mut seen = Vec::new();
        let mut done = false;
        sub.drain(
            |event| {
                match event {
                    DrainEvent::Item(v) => seen.push(*v),
                    DrainEvent::Done(CloseReason::Normal(None)) => done = true,
                    DrainEvent::Done(_) => panic!("unexpected terminal event"),
                }
                true
            },
            None,
        );

        assert_eq!(seen, vec![1, 2]);
        assert!(done);
    }

    #[test]
    fn subscribe_with_zero_replay_only_sees_future_messages() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        ch.fast_send(1);
        ch.fast_send(2);
        ch.close(None);

        let sub = ch.subscribe(0).unwrap();
        let mut seen = Vec::new();
        sub.drain(
            |event| {
                if let DrainEvent::Item(v) = event {
                    seen.push(*v);
                }
                true
            },
            None,
        );
        assert!(seen.is_empty());
    }

    #[test]
    fn out_of_subscribers_when_table_full() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        let _a = ch.subscribe(0).unwrap();
        assert!(matches!(
            ch.subscribe(0),
            Err(SubscribeError::OutOfSubscribers { capacity: 1 })
        ));
    }

    #[test]
    fn subscribe_after_close_with_replay_delivers_tail_then_close() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        ch.fast_send(42);
        ch.close(Some("boom"));

        let sub = ch.subscribe(REPLAY_ALL).unwrap();
        let mut events = Vec::new();
        sub.drain(
            |event| {
                match event {
                    DrainEvent::Item(v) => events.push(format!("item:{v}")),
                    DrainEvent::Done(CloseReason::Normal(err)) => {
                        events.push(format!("done:{err:?}"));
                    }
                    DrainEvent::Done(CloseReason::Overrun) => events.push("overrun".into()),
                }
                true
            },
            None,
        );
        assert_eq!(events, vec!["item:42", "done:Some(\"boom\")"]);
    }

    #[test]
    fn close_is_idempotent_and_keeps_first_error() {
        let ch: Channel<u64, &'static str> = Channel::new(Config::default());
        assert!(ch.close(Some("first")));
        assert!(!ch.close(Some("second")));
        assert_eq!(ch.inner.close_error(), Some(&"first"));
    }

    #[test]
    fn send_after_close_is_silently_dropped() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        ch.close(None);
        ch.send(1);
        ch.fast_send(2);
        assert_eq!(ch.inner.ring.committed(), 0);
    }
}
