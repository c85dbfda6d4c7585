// src/acquisition/pulse_timer.rs

use core::fmt::Debug;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::common::{error::PulseError, hal_traits::Clock, timing};

/// Times one trigger/echo round trip and converts it to centimetres.
///
/// The echo phases are a tight spin on the echo pin: pulse widths are well under
/// a millisecond per 17 cm, so sleeping between samples would lose the edge.
/// Each phase is bounded by `watchdog` measured on the injected clock.
#[derive(Debug)]
pub struct PulseTimer<C, D> {
    clock: C,
    delay: D,
    watchdog: Duration,
}

impl<C, D> PulseTimer<C, D>
where
    C: Clock,
    D: DelayNs,
{
    pub fn new(clock: C, delay: D) -> Self {
        PulseTimer {
            clock,
            delay,
            watchdog: timing::ECHO_WATCHDOG,
        }
    }

    pub fn with_watchdog(mut self, watchdog: Duration) -> Self {
        self.watchdog = watchdog;
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Fires one trigger pulse and measures the echo.
    ///
    /// Returns the distance in cm, or why no sample was produced.
    pub fn measure<T, E, PE>(&mut self, trig: &mut T, echo: &mut E) -> Result<f64, PulseError<PE>>
    where
        T: OutputPin<Error = PE>,
        E: InputPin<Error = PE>,
        PE: Debug,
    {
        // --- Trigger ---
        trig.set_high().map_err(PulseError::Io)?;
        self.delay.delay_ns(timing::TRIGGER_PULSE.as_nanos() as u32);
        trig.set_low().map_err(PulseError::Io)?;
        let t0 = self.clock.now();

        // --- Wait for the echo to go active ---
        let t1 = loop {
            let active = echo.is_high().map_err(PulseError::Io)?;
            let now = self.clock.now();
            if now - t0 > self.watchdog {
                return Err(PulseError::EchoStartTimeout);
            }
            if active {
                break now;
            }
        };

        // --- Wait for the echo to return idle ---
        let t2 = loop {
            let idle = echo.is_low().map_err(PulseError::Io)?;
            let now = self.clock.now();
            if now - t1 > self.watchdog {
                return Err(PulseError::EchoEndTimeout);
            }
            if idle {
                break now;
            }
        };

        let distance_cm = pulse_width_to_cm(t2 - t1);
        if !(timing::PHYSICAL_RANGE_MIN_CM..=timing::PHYSICAL_RANGE_MAX_CM).contains(&distance_cm) {
            return Err(PulseError::OutOfPhysicalRange { distance_cm });
        }
        Ok(distance_cm)
    }
}

/// Echo pulse width to one-way distance.
#[inline]
pub fn pulse_width_to_cm(width: Duration) -> f64 {
    width.as_secs_f64() * timing::SPEED_OF_SOUND_HALF_CM_PER_S
}
