use thiserror::Error;

/// Error returned by [`Channel::subscribe`](crate::Channel::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscribeError {
    /// The subscriber table has no free slot.
    #[error("no free subscriber slot (capacity: {capacity})")]
    OutOfSubscribers {
        /// The configured maximum number of concurrently live subscribers.
        capacity: usize,
    },
}

/// Why a [`drain`](crate::Subscriber::drain) loop delivered its terminal event.
///
/// Mirrors the split `tokio::sync::broadcast::error::RecvError` makes between
/// a plain close and falling behind, except falling behind is fatal here
/// rather than resumable (the subscriber has genuinely been lapped).
#[derive(Debug)]
pub enum CloseReason<'a, E> {
    /// The channel was closed with `close(None)` or `close(Some(err))`.
    Normal(Option<&'a E>),
    /// This subscriber's read cursor was lapped by the writer before it could
    /// keep up; it will not receive further messages.
    Overrun,
}

/// One event delivered to a [`drain`](crate::Subscriber::drain) callback.
///
/// Translates the original triple-argument `(value, error, closed) -> bool`
/// callback shape into a single enum matched on by the caller. A `Done` event
/// is delivered exactly once, always last.
#[derive(Debug)]
pub enum DrainEvent<'a, T, E> {
    /// A value committed by the channel, in total order.
    Item(&'a T),
    /// Terminal event: no more items will follow.
    Done(CloseReason<'a, E>),
}
