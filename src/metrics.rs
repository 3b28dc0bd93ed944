use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracked when a [`Channel`](crate::Channel) is built with
/// `Config::with_metrics(true)`.
///
/// All updates use `Ordering::Relaxed` — these counters are observability
/// only and never gate protocol progress (see `Channel::send`/`drain`).
#[derive(Debug, Default)]
pub struct Metrics {
    messages_sent: AtomicU64,
    messages_delivered: AtomicU64,
    messages_skipped_age: AtomicU64,
    overruns: AtomicU64,
    watermark_cas_retries: AtomicU64,
    subscribes: AtomicU64,
    cancels: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add_messages_sent(&self, n: u64) {
        self.messages_sent.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_messages_delivered(&self, n: u64) {
        self.messages_delivered.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_messages_skipped_age(&self, n: u64) {
        self.messages_skipped_age.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_watermark_cas_retry(&self) {
        self.watermark_cas_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_subscribe(&self) {
        self.subscribes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a consistent-enough snapshot. Individual counters may be
    /// momentarily stale with respect to each other; none of them are used
    /// to coordinate protocol state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_skipped_age: self.messages_skipped_age.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            watermark_cas_retries: self.watermark_cas_retries.load(Ordering::Relaxed),
            subscribes: self.subscribes.load(Ordering::Relaxed),
            cancels: self.cancels.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a channel's [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_skipped_age: u64,
    pub overruns: u64,
    pub watermark_cas_retries: u64,
    pub subscribes: u64,
    pub cancels: u64,
}
