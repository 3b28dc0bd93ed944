/// Configuration for a [`Channel`](crate::Channel).
///
/// `buffer_capacity` is rounded up to the next power of two so slot lookup
/// can use a mask instead of a modulo.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Ring buffer size, already rounded up to a power of two.
    pub buffer_capacity: usize,
    /// Fixed upper bound on the number of concurrently live subscribers.
    pub max_subscribers: usize,
    /// Enable metrics collection (slight overhead).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration.
    ///
    /// `buffer_capacity` is rounded up to the next power of two. `0` is
    /// treated as `1`.
    ///
    /// # Panics
    ///
    /// Panics if `max_subscribers` is `0`.
    #[must_use]
    pub fn new(buffer_capacity: usize, max_subscribers: usize) -> Self {
        assert!(max_subscribers > 0, "max_subscribers must be at least 1");

        Self {
            buffer_capacity: buffer_capacity.max(1).next_power_of_two(),
            max_subscribers,
            enable_metrics: false,
        }
    }

    /// Enables or disables metrics collection.
    #[must_use]
    pub fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Returns the capacity of the ring buffer.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Returns the index mask for wrapping (`capacity - 1`).
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> usize {
        self.buffer_capacity - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_capacity: 1024,
            max_subscribers: 16,
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_up_to_power_of_two() {
        assert_eq!(Config::new(1, 1).capacity(), 1);
        assert_eq!(Config::new(3, 1).capacity(), 4);
        assert_eq!(Config::new(128, 1).capacity(), 128);
        assert_eq!(Config::new(129, 1).capacity(), 256);
        assert_eq!(Config::new(0, 1).capacity(), 1);
    }

    #[test]
    fn mask_is_capacity_minus_one() {
        let cfg = Config::new(128, 4);
        assert_eq!(cfg.mask(), 127);
    }

    #[test]
    #[should_panic(expected = "max_subscribers")]
    fn rejects_zero_subscribers() {
        Config::new(128, 0);
    }
}
