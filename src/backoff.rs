use std::hint;
use std::thread;
use std::time::Duration;

/// Adaptive backoff strategy (Crossbeam-style).
///
/// Progressively increases wait time: spin with PAUSE → yield to OS → give up.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 spins max before yielding
    const YIELD_LIMIT: u32 = 10; // Then give up

    /// Creates a new backoff instance.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Light spin with PAUSE hints.
    #[inline]
    pub fn spin(&mut self) {
        let spins = 1 << self.step.min(Self::SPIN_LIMIT);
        for _ in 0..spins {
            hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Heavier backoff: spin then yield.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            self.spin();
        } else {
            thread::yield_now();
            if self.step <= Self::YIELD_LIMIT {
                self.step += 1;
            }
        }
    }

    /// Check if we've exhausted patience.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff for a consumer waiting on new data, never "completes".
///
/// Same spin-then-yield progression as [`Backoff`], but once yielding is
/// exhausted it falls into a capped exponential sleep instead of giving up —
/// a parked [`drain`](crate::Subscriber::drain) loop waits indefinitely for a
/// send, a close, or a cancellation, whichever comes first.
#[derive(Debug)]
pub struct WakeBackoff {
    step: u32,
}

impl WakeBackoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    const MAX_SLEEP: Duration = Duration::from_millis(4);

    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Waits one step, growing from spin to yield to a capped sleep.
    pub fn wait(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            let spins = 1 << self.step;
            for _ in 0..spins {
                hint::spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            let shift = (self.step - Self::YIELD_LIMIT - 1).min(12);
            let sleep = Duration::from_micros(1 << shift).min(Self::MAX_SLEEP);
            thread::sleep(sleep);
        }
        self.step = self.step.saturating_add(1);
    }

    /// Resets progression after new data was observed.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for WakeBackoff {
    fn default() -> Self {
        Self::new()
    }
}
