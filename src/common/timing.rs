// src/common/timing.rs

use core::time::Duration;

// Nominal values for an HC-SR04 class transducer and the two radar UARTs.
// Loops that poll hardware read their cadence from here unless the
// configuration overrides it.

// === Pulse-echo timing ===

/// Width of the trigger pulse asserted on the trig pin.
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);
/// Watchdog for each echo phase (waiting for the rising edge, then for the falling edge).
/// 20 ms of echo corresponds to roughly 3.4 m of range.
pub const ECHO_WATCHDOG: Duration = Duration::from_millis(20);
/// Speed of sound in cm/s with the round trip already halved (34300 / 2).
pub const SPEED_OF_SOUND_HALF_CM_PER_S: f64 = 17150.0;
/// Sensor-integrity bounds for a computed distance, in cm.
pub const PHYSICAL_RANGE_MIN_CM: f64 = 2.0;
pub const PHYSICAL_RANGE_MAX_CM: f64 = 800.0;
/// Cadence of one full pass over every configured ultrasonic sensor.
pub const ULTRASONIC_CYCLE: Duration = Duration::from_secs(3);

// === Serial polling ===

/// Idle poll interval for the hardware UART when no bytes are pending.
pub const HARDWARE_SERIAL_POLL: Duration = Duration::from_millis(100);
/// Backoff after a transient fault on the hardware UART.
pub const HARDWARE_SERIAL_FAULT_BACKOFF: Duration = Duration::from_secs(1);
/// Read timeout handed to the serial driver when the port is opened.
pub const HARDWARE_SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Idle poll interval for bit-banged UART channels.
pub const SOFTWARE_SERIAL_POLL: Duration = Duration::from_millis(50);
/// Backoff for a bit-banged channel configured with `on_fault = "retry"`.
pub const SOFTWARE_SERIAL_FAULT_BACKOFF: Duration = Duration::from_secs(1);

// === Dispatch ===

/// Upper bound on one outbound POST, connect included.
pub const HTTP_TIMEOUT: Duration = Duration::from_millis(500);

// === Shutdown ===

/// Granularity of interruptible sleeps; bounds how long a loop takes to notice shutdown.
pub const SHUTDOWN_POLL_SLICE: Duration = Duration::from_millis(20);
