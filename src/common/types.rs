// src/common/types.rs

use core::fmt;
use core::time::Duration;
use std::time::SystemTime;

use serde::Deserialize;

// --- Admissible distance window ---

/// Inclusive distance window in centimetres.
///
/// Used both for the process-wide business range and for per-source sanity bands.
/// Invariant: `min_cm < max_cm` (enforced by [`ValidRange::new`] and config validation).
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
pub struct ValidRange {
    pub min_cm: f64,
    pub max_cm: f64,
}

impl ValidRange {
    /// Creates a range, or `None` unless `min_cm < max_cm` (NaN bounds rejected too).
    pub fn new(min_cm: f64, max_cm: f64) -> Option<Self> {
        if min_cm < max_cm {
            Some(Self { min_cm, max_cm })
        } else {
            None
        }
    }

    /// Both bounds included. NaN is never contained.
    #[inline]
    pub fn contains(&self, distance_cm: f64) -> bool {
        self.min_cm <= distance_cm && distance_cm <= self.max_cm
    }

    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.min_cm < self.max_cm
    }
}

impl Default for ValidRange {
    fn default() -> Self {
        Self { min_cm: 120.0, max_cm: 780.0 }
    }
}

impl fmt::Display for ValidRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} cm", self.min_cm, self.max_cm)
    }
}

// --- Sensor classification ---

/// The `sensorType` string carried in events.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SensorType {
    Ultrasonic,
    HardwareUart,
    SoftwareUart,
}

impl SensorType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SensorType::Ultrasonic => "Ultrasonic",
            SensorType::HardwareUart => "Hardware_UART",
            SensorType::SoftwareUart => "Software_UART",
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do when a serial source hits a driver fault.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Log, sleep for `backoff`, keep polling.
    Retry { backoff: Duration },
    /// Log, release the channel, leave the loop. Restarting is left to the service manager.
    Terminate,
}

/// Device nodes routed to the 40-pin header's primary UART.
pub const PRIMARY_UART_DEVICES: [&str; 3] = ["/dev/serial0", "/dev/ttyS0", "/dev/ttyAMA0"];
/// BCM lines of the primary UART: TXD, RXD.
pub const PRIMARY_UART_LINES: [u8; 2] = [14, 15];

/// Wiring of one physical sensor. Pins are BCM line numbers once configuration is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorKind {
    Ultrasonic { trig_pin: u8, echo_pin: u8 },
    HardwareUart { device: String, baud: u32 },
    SoftwareUart { rx_pin: u8, tx_pin: Option<u8>, baud: u32 },
}

/// One physical sensor, built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    pub id: String,
    pub kind: SensorKind,
}

impl SensorDescriptor {
    pub fn sensor_type(&self) -> SensorType {
        match self.kind {
            SensorKind::Ultrasonic { .. } => SensorType::Ultrasonic,
            SensorKind::HardwareUart { .. } => SensorType::HardwareUart,
            SensorKind::SoftwareUart { .. } => SensorType::SoftwareUart,
        }
    }

    /// GPIO lines this sensor drives or samples, for ownership checks.
    ///
    /// A hardware UART on the header's primary port owns BCM 14 (TXD) and 15 (RXD);
    /// other devices (USB adapters) own no header lines.
    pub fn gpio_lines(&self) -> Vec<u8> {
        match &self.kind {
            SensorKind::Ultrasonic { trig_pin, echo_pin } => vec![*trig_pin, *echo_pin],
            SensorKind::HardwareUart { device, .. } => {
                if PRIMARY_UART_DEVICES.contains(&device.as_str()) {
                    PRIMARY_UART_LINES.to_vec()
                } else {
                    Vec::new()
                }
            }
            SensorKind::SoftwareUart { rx_pin, tx_pin, .. } => {
                core::iter::once(*rx_pin).chain(*tx_pin).collect()
            }
        }
    }

    pub fn baud(&self) -> Option<u32> {
        match self.kind {
            SensorKind::HardwareUart { baud, .. } | SensorKind::SoftwareUart { baud, .. } => {
                Some(baud)
            }
            SensorKind::Ultrasonic { .. } => None,
        }
    }
}

// --- Readings ---

/// A decoded distance sample on its way to the dispatcher. Not retained after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub distance_cm: f64,
    pub captured_at: SystemTime,
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, sensor_type: SensorType, distance_cm: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_type,
            distance_cm,
            captured_at: SystemTime::now(),
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range_is_inclusive() {
        let range = ValidRange::new(120.0, 780.0).unwrap();
        assert!(range.contains(120.0));
        assert!(range.contains(780.0));
        assert!(range.contains(450.5));
        assert!(!range.contains(119.999));
        assert!(!range.contains(780.001));
        assert!(!range.contains(f64::NAN));
    }

    #[test]
    fn test_valid_range_rejects_inverted_bounds() {
        assert!(ValidRange::new(10.0, 10.0).is_none());
        assert!(ValidRange::new(780.0, 120.0).is_none());
        assert!(ValidRange::new(f64::NAN, 1.0).is_none());
    }

    #[test]
    fn test_sensor_type_strings() {
        assert_eq!(SensorType::Ultrasonic.as_str(), "Ultrasonic");
        assert_eq!(SensorType::HardwareUart.to_string(), "Hardware_UART");
        assert_eq!(SensorType::SoftwareUart.to_string(), "Software_UART");
    }

    #[test]
    fn test_descriptor_gpio_lines() {
        let us = SensorDescriptor {
            id: "US1".into(),
            kind: SensorKind::Ultrasonic { trig_pin: 11, echo_pin: 8 },
        };
        assert_eq!(us.gpio_lines(), vec![11, 8]);
        assert_eq!(us.sensor_type(), SensorType::Ultrasonic);
        assert_eq!(us.baud(), None);

        let sw = SensorDescriptor {
            id: "RADAR_2".into(),
            kind: SensorKind::SoftwareUart { rx_pin: 17, tx_pin: None, baud: 9600 },
        };
        assert_eq!(sw.gpio_lines(), vec![17]);
        assert_eq!(sw.baud(), Some(9600));

        let hw = SensorDescriptor {
            id: "RADAR_1".into(),
            kind: SensorKind::HardwareUart { device: "/dev/serial0".into(), baud: 115200 },
        };
        assert_eq!(hw.gpio_lines(), vec![14, 15]);
        assert_eq!(hw.sensor_type(), SensorType::HardwareUart);

        let usb = SensorDescriptor {
            id: "RADAR_3".into(),
            kind: SensorKind::HardwareUart { device: "/dev/ttyUSB0".into(), baud: 115200 },
        };
        assert!(usb.gpio_lines().is_empty());
    }
}
