//! ringcast — a bounded, in-memory multicast broadcast channel with replay.
//!
//! A single buffered stream fed by any number of concurrent producers and
//! drained independently by any number of subscribers, each receiving the
//! complete committed sequence (or a tail of it, via replay). Unlike a
//! native MPSC/MPMC queue, a value sent here is not consumed by whichever
//! subscriber reads it first — every live subscriber sees every message.
//!
//! # Key properties
//!
//! - No internal dispatcher thread: producers and consumers make progress
//!   entirely on their own calling threads, coordinated by atomics.
//! - Bounded: the ring never grows; the slowest subscriber's cursor applies
//!   backpressure to every producer.
//! - Replay: a subscriber can join after messages have already been sent and
//!   still receive some or all of the still-resident tail.
//! - Two send paths: [`Channel::send`] (multi-producer, timestamped, usable
//!   with `max_age` filtering) and [`Channel::fast_send`] (single-producer
//!   only, no timestamp, slightly cheaper).
//!
//! # Example
//!
//! ```
//! use ringcast_rs::{Channel, Config, DrainEvent, CloseReason};
//!
//! let channel: Channel<u64> = Channel::new(Config::new(128, 4));
//!
//! channel.send(1);
//! channel.send(2);
//! channel.close(None);
//!
//! let subscriber = channel.subscribe(ringcast_rs::REPLAY_ALL).unwrap();
//! let mut seen = Vec::new();
//! subscriber.drain(
//!     |event| {
//!         match event {
//!             DrainEvent::Item(v) => seen.push(*v),
//!             DrainEvent::Done(CloseReason::Normal(_)) => {}
//!             DrainEvent::Done(CloseReason::Overrun) => panic!("lapped"),
//!         }
//!         true
//!     },
//!     None,
//! );
//! assert_eq!(seen, vec![1, 2]);
//! ```

mod backoff;
mod channel;
mod config;
mod error;
mod invariants;
mod metrics;
mod ring;
mod subscriber;
mod subscriber_table;

pub use backoff::{Backoff, WakeBackoff};
pub use channel::{Channel, REPLAY_ALL};
pub use config::Config;
pub use error::{CloseReason, DrainEvent, SubscribeError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use subscriber::Subscriber;
