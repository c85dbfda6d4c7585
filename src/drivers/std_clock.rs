// src/drivers/std_clock.rs

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;

use crate::common::hal_traits::Clock;

/// Delays shorter than this are spun instead of slept; the scheduler cannot wake us in time.
const SPIN_THRESHOLD: Duration = Duration::from_millis(1);

/// Monotonic clock backed by `std::time::Instant`.
#[derive(Debug, Default, Copy, Clone)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// `DelayNs` on the host. Sub-millisecond waits (the 10 us trigger pulse) busy-wait.
#[derive(Debug, Default, Copy, Clone)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        let wait = Duration::from_nanos(ns as u64);
        if wait < SPIN_THRESHOLD {
            let start = Instant::now();
            while start.elapsed() < wait {
                core::hint::spin_loop();
            }
        } else {
            thread::sleep(wait);
        }
    }
}
