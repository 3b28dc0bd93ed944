//! Per-subscriber read cursor, age filter, idle/wake state and cancellation.
//!
//! `Subscriber::drain` is the cooperative consumer loop described in the
//! design doc's state machine: active (has work) -> deliver -> active, or
//! active -> idle -> wake (poll observes new `committed` or `closed`) ->
//! active, terminating in `closed` after exactly one terminal event.

use crate::backoff::WakeBackoff;
use crate::channel::ChannelInner;
use crate::error::{CloseReason, DrainEvent};
use crate::invariants::debug_assert_read_not_past_committed;
use crate::ring::now_micros;
use crate::subscriber_table::SubscriberHandle;
use std::sync::Arc;
use std::time::Duration;

/// A read-side cursor into a [`Channel`](crate::Channel), created by
/// [`Channel::subscribe`](crate::Channel::subscribe).
///
/// Dropping a `Subscriber` without calling [`cancel`](Subscriber::cancel)
/// leaves its table slot occupied (and therefore counted against
/// backpressure) forever, exactly like leaking any other resource handle —
/// callers that want prompt release should cancel explicitly.
pub struct Subscriber<T, E> {
    channel: Arc<ChannelInner<T, E>>,
    handle: SubscriberHandle,
}

impl<T, E> Subscriber<T, E> {
    pub(crate) fn new(channel: Arc<ChannelInner<T, E>>, handle: SubscriberHandle) -> Self {
        Self { channel, handle }
    }

    /// Cooperatively cancels this subscriber. A `drain` in progress on
    /// another thread observes this on its next turn and returns after
    /// delivering exactly one terminal event; no in-flight callback is
    /// interrupted.
    pub fn cancel(&self) {
        self.channel.subs.cancel(self.handle);
        if let Some(m) = &self.channel.metrics {
            m.add_cancel();
        }
    }

    /// Drains this subscriber: invokes `callback` for every committed value
    /// in order (subject to `max_age`), then exactly once more with the
    /// terminal [`DrainEvent::Done`] when the subscriber is cancelled, the
    /// channel is closed and fully drained, or the subscriber has been
    /// lapped by the writer (ring overrun). Returns as soon as `callback`
    /// itself returns `false`, without delivering a terminal event.
    ///
    /// `max_age` filters out messages sent via
    /// [`Channel::send`](crate::Channel::send) older than the given
    /// duration; it has no effect on messages sent via
    /// [`Channel::fast_send`](crate::Channel::fast_send), which carry no
    /// timestamp.
    pub fn drain<F>(&self, mut callback: F, max_age: Option<Duration>)
    where
        F: FnMut(DrainEvent<'_, T, E>) -> bool,
    {
        let max_age_micros = max_age.map(|d| d.as_micros() as u64);
        let mut backoff = WakeBackoff::new();

        loop {
            if self.channel.subs.is_cancelled(self.handle) {
                callback(DrainEvent::Done(CloseReason::Normal(self.channel.close_error())));
                return;
            }

            let Some(read) = self.channel.subs.read(self.handle) else {
                // Slot recycled under us (stale handle); treat like cancellation.
                callback(DrainEvent::Done(CloseReason::Normal(None)));
                return;
            };

            let committed = self.channel.ring.committed();
            debug_assert_read_not_past_committed!(read, committed);

            if read < committed {
                match self.channel.ring.try_read(read) {
                    Some(view) => {
                        let skip = max_age_micros.is_some_and(|max_age| {
                            view.timestamp != 0
                                && now_micros().saturating_sub(view.timestamp) > max_age
                        });

                        if skip {
                            self.channel.subs.set_read(self.handle, read.wrapping_add(1));
                            if let Some(m) = &self.channel.metrics {
                                m.add_messages_skipped_age(1);
                            }
                            continue;
                        }

                        let keep_going = callback(DrainEvent::Item(view.value));
                        if let Some(m) = &self.channel.metrics {
                            m.add_messages_delivered(1);
                        }
                        if !keep_going {
                            // Per the drain state machine, a callback that
                            // declines to continue leaves the cursor where
                            // it is: this same message is redelivered on the
                            // next `drain` call.
                            return;
                        }
                        self.channel.subs.set_read(self.handle, read.wrapping_add(1));
                        backoff.reset();
                        continue;
                    }
                    None => {
                        // This subscriber's cursor was lapped by the writer.
                        if let Some(m) = &self.channel.metrics {
                            m.add_overrun();
                        }
                        tracing::warn!(read, "ring overrun");
                        self.channel.subs.cancel(self.handle);
                        callback(DrainEvent::Done(CloseReason::Overrun));
                        return;
                    }
                }
            }

            // Caught up to the watermark.
            if self.channel.is_closed() {
                callback(DrainEvent::Done(CloseReason::Normal(self.channel.close_error())));
                return;
            }

            backoff.wait();
        }
    }
}

// Safety: Subscriber is Send + Sync as long as T and E are; all shared state
// is reached through the channel's atomics and the generation-guarded table.
unsafe impl<T: Send, E: Send + Sync> Send for Subscriber<T, E> {}
unsafe impl<T: Send, E: Send + Sync> Sync for Subscriber<T, E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Channel, Config};

    #[test]
    fn cancel_makes_next_drain_terminate_immediately() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        let sub = ch.subscribe(0).unwrap();
        sub.cancel();

        let mut calls = 0;
        sub.drain(
            |_event| {
                calls += 1;
                true
            },
            None,
        );
        assert_eq!(calls, 1);
    }

    #[test]
    fn drain_stops_when_callback_returns_false() {
        let ch: Channel<u64> = Channel::new(Config::new(8, 1));
        ch.fast_send(1);
        ch.fast_send(2);
        ch.fast_send(3);
        ch.close(None);

        let sub = ch.subscribe(crate::channel::REPLAY_ALL).unwrap();
        let mut seen = Vec::new();
        sub.drain(
            |event| {
                if let DrainEvent::Item(v) = event {
                    seen.push(*v);
                    return *v < 2;
                }
                true
            },
            None,
        );
        assert_eq!(seen, vec![1, 2]);
    }
}
