// src/common/error.rs

use core::fmt::Debug;

/// Failure of a single pulse-echo measurement.
///
/// `E` is the pin driver's error type. Every variant other than `Io` means
/// "no usable sample this cycle"; the caller skips the sensor and moves on.
#[derive(Debug, thiserror::Error)]
pub enum PulseError<E = ()>
where
    E: Debug,
{
    /// Underlying GPIO error from the pin driver.
    #[error("GPIO error: {0:?}")]
    Io(E),

    /// Echo line never went active within the watchdog (no object, or sensor not wired).
    #[error("echo start timeout")]
    EchoStartTimeout,

    /// Echo line stayed active past the watchdog.
    #[error("echo end timeout")]
    EchoEndTimeout,

    /// Pulse width decoded to an implausible distance.
    #[error("distance {distance_cm:.2} cm outside physical range")]
    OutOfPhysicalRange { distance_cm: f64 },
}

impl<E: Debug> PulseError<E> {
    /// True for the "nothing measured" outcomes, as opposed to a driver fault.
    pub fn is_skip(&self) -> bool {
        !matches!(self, PulseError::Io(_))
    }
}

/// Failure while pulling bytes from a serial source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError<E = ()>
where
    E: Debug,
{
    /// Underlying serial/bit-bang driver error.
    #[error("serial I/O error: {0:?}")]
    Io(E),

    /// A framed token could not be read as a number.
    #[error("malformed token {0:?}")]
    MalformedToken(String),
}

/// Failure of one outbound event delivery. Logged by the dispatcher and dropped.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Connection, DNS, timeout or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-2xx status.
    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    /// Payload could not be encoded.
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Startup configuration problems. All of these are fatal before any source starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `min_cm` must be strictly below `max_cm`.
    #[error("invalid range for {what}: min {min_cm} >= max {max_cm}")]
    InvalidRange { what: String, min_cm: f64, max_cm: f64 },

    #[error("sensor id must not be empty")]
    EmptySensorId,

    #[error("sensor id '{0}' is configured more than once")]
    DuplicateSensorId(String),

    /// Physical header pin with no GPIO line behind it (power, ground, ID EEPROM).
    #[error("board pin {0} is not a GPIO line")]
    NotAGpioPin(u8),

    #[error("GPIO {gpio} claimed by both {first} and {second}")]
    PinConflict { gpio: u8, first: String, second: String },

    #[error("{0} must be non-zero")]
    Zero(&'static str),

    #[error("endpoint url must not be empty")]
    EmptyEndpoint,
}
