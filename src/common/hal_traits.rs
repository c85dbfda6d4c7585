// src/common/hal_traits.rs

use core::fmt::Debug;
use core::ops::Sub;
use core::time::Duration;

// Pins and the trigger delay come straight from embedded-hal 1.0:
// `embedded_hal::digital::{InputPin, OutputPin}` and `embedded_hal::delay::DelayNs`.
// Only the monotonic clock and the byte stream need crate-local traits.

/// A point on a monotonic timeline. Subtracting two instants gives the elapsed time.
pub trait MonotonicInstant: Copy + Ord + Sub<Output = Duration> {}

impl<T> MonotonicInstant for T where T: Copy + Ord + Sub<Output = Duration> {}

/// Monotonic time source used by the busy-wait loops.
///
/// Injected so pulse timing can run against a simulated timeline in tests.
pub trait Clock {
    type Instant: MonotonicInstant;

    /// Current instant. Must never go backwards.
    fn now(&self) -> Self::Instant;
}

/// Abstraction for a serial byte stream read in whatever chunks are pending.
pub trait ByteSource {
    /// Associated error type for driver faults.
    type Error: Debug;

    /// Copies pending bytes into `buf` and returns how many were written.
    ///
    /// Returns `Err(nb::Error::WouldBlock)` if nothing is pending yet, so callers
    /// can sleep instead of spinning. Driver faults are returned as
    /// `Err(nb::Error::Other(Self::Error))`.
    fn read_available(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;
}
