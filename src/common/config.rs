// src/common/config.rs

//! Startup configuration.
//!
//! The TOML file is parsed into `*Config` structs, then resolved and validated
//! into an immutable [`Settings`] that is shared read-only by every component.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::error::ConfigError;
use super::timing;
use super::types::{FaultPolicy, SensorDescriptor, SensorKind, ValidRange};

// --- Raw file layout ---

/// How pin numbers in the file are interpreted.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PinNumbering {
    /// Physical position on the 40-pin header.
    #[default]
    Board,
    /// Broadcom GPIO line numbers.
    Bcm,
}

impl PinNumbering {
    /// Resolves a configured pin to a BCM line.
    pub fn to_bcm(&self, pin: u8) -> Result<u8, ConfigError> {
        match self {
            PinNumbering::Bcm => Ok(pin),
            PinNumbering::Board => board_to_bcm(pin).ok_or(ConfigError::NotAGpioPin(pin)),
        }
    }
}

/// Raspberry Pi 40-pin header, physical pin -> BCM line.
fn board_to_bcm(pin: u8) -> Option<u8> {
    let bcm = match pin {
        3 => 2,
        5 => 3,
        7 => 4,
        8 => 14,
        10 => 15,
        11 => 17,
        12 => 18,
        13 => 27,
        15 => 22,
        16 => 23,
        18 => 24,
        19 => 10,
        21 => 9,
        22 => 25,
        23 => 11,
        24 => 8,
        26 => 7,
        29 => 5,
        31 => 6,
        32 => 12,
        33 => 13,
        35 => 19,
        36 => 16,
        37 => 26,
        38 => 20,
        40 => 21,
        // 27/28 are the HAT ID EEPROM bus; everything else is power or ground.
        _ => return None,
    };
    Some(bcm)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    /// `{cameraId, eventTime, timeStampStr, eventType, eventTag, sensorId, sensorType}`
    Generic,
    /// `{sensorId, data: "Type:nx.base.Sensor;distance:<m>;TimestampUs:<us>;"}`
    Nx,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFault {
    Retry,
    Terminate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadConfig {
    pub schema: PayloadSchema,
    #[serde(default = "default_camera_id")]
    pub camera_id: String,
    /// Overrides the reading's sensor id in NX events.
    #[serde(default)]
    pub nx_sensor_id: Option<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            schema: PayloadSchema::Generic,
            camera_id: default_camera_id(),
            nx_sensor_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PigpioConfig {
    #[serde(default = "default_pigpio_host")]
    pub host: String,
    #[serde(default = "default_pigpio_port")]
    pub port: u16,
}

impl Default for PigpioConfig {
    fn default() -> Self {
        Self { host: default_pigpio_host(), port: default_pigpio_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UltrasonicConfig {
    pub id: String,
    pub trig_pin: u8,
    pub echo_pin: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareSerialConfig {
    pub id: String,
    #[serde(default = "default_serial_device")]
    pub device: String,
    #[serde(default = "default_hardware_baud")]
    pub baud: u32,
    /// `None` in the file means the default `[10, 780]` band.
    #[serde(default)]
    pub sanity_band: Option<ValidRange>,
    #[serde(default = "default_hardware_on_fault")]
    pub on_fault: OnFault,
    #[serde(default)]
    pub fault_backoff_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoftwareSerialConfig {
    pub id: String,
    pub rx_pin: u8,
    #[serde(default)]
    pub tx_pin: Option<u8>,
    #[serde(default = "default_software_baud")]
    pub baud: u32,
    #[serde(default)]
    pub sanity_band: Option<ValidRange>,
    #[serde(default = "default_software_on_fault")]
    pub on_fault: OnFault,
    #[serde(default)]
    pub fault_backoff_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

/// The configuration file as written.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub pin_numbering: PinNumbering,
    pub endpoint_url: String,
    #[serde(default)]
    pub http_timeout_ms: Option<u64>,
    #[serde(default)]
    pub valid_range: ValidRange,
    #[serde(default)]
    pub ultrasonic_interval_ms: Option<u64>,
    #[serde(default)]
    pub payload: PayloadConfig,
    #[serde(default)]
    pub pigpio: PigpioConfig,
    /// Sensor power/enable lines held high while the process runs.
    #[serde(default)]
    pub enable_pins: Vec<u8>,
    #[serde(default)]
    pub ultrasonic: Vec<UltrasonicConfig>,
    #[serde(default)]
    pub hardware_serial: Option<HardwareSerialConfig>,
    #[serde(default)]
    pub software_serial: Vec<SoftwareSerialConfig>,
}

fn default_camera_id() -> String {
    "RD001".to_owned()
}
fn default_pigpio_host() -> String {
    "localhost".to_owned()
}
fn default_pigpio_port() -> u16 {
    8888
}
fn default_serial_device() -> String {
    "/dev/serial0".to_owned()
}
fn default_hardware_baud() -> u32 {
    115_200
}
fn default_software_baud() -> u32 {
    9600
}
fn default_hardware_on_fault() -> OnFault {
    OnFault::Retry
}
fn default_software_on_fault() -> OnFault {
    OnFault::Terminate
}

/// Default plausibility band for the hardware radar, independent of `valid_range`.
pub const HARDWARE_SANITY_BAND: ValidRange = ValidRange { min_cm: 10.0, max_cm: 780.0 };

// --- Resolved settings ---

/// Per-source serial behaviour, kept explicit because the two UART kinds differ.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub descriptor: SensorDescriptor,
    pub sanity_band: Option<ValidRange>,
    pub fault_policy: FaultPolicy,
    pub poll_interval: Duration,
}

/// Validated, immutable process configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoint_url: String,
    pub http_timeout: Duration,
    pub valid_range: ValidRange,
    pub ultrasonic_interval: Duration,
    pub payload: PayloadConfig,
    pub pigpio: PigpioConfig,
    /// BCM lines.
    pub enable_pins: Vec<u8>,
    pub ultrasonic: Vec<SensorDescriptor>,
    pub hardware_serial: Option<SerialSettings>,
    pub software_serial: Vec<SerialSettings>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        Self::resolve(file)
    }

    /// Translates pins, fills per-source defaults and checks every invariant.
    pub fn resolve(file: FileConfig) -> Result<Self, ConfigError> {
        if file.endpoint_url.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        check_range("valid_range", &file.valid_range)?;

        let numbering = file.pin_numbering;
        let mut owners = PinOwners::default();

        let enable_pins = file
            .enable_pins
            .iter()
            .map(|&pin| {
                let gpio = numbering.to_bcm(pin)?;
                owners.claim(gpio, "enable_pins")?;
                Ok(gpio)
            })
            .collect::<Result<Vec<u8>, ConfigError>>()?;

        let mut ids = Vec::new();

        let mut ultrasonic = Vec::with_capacity(file.ultrasonic.len());
        for us in &file.ultrasonic {
            check_id(&mut ids, &us.id)?;
            let descriptor = SensorDescriptor {
                id: us.id.clone(),
                kind: SensorKind::Ultrasonic {
                    trig_pin: numbering.to_bcm(us.trig_pin)?,
                    echo_pin: numbering.to_bcm(us.echo_pin)?,
                },
            };
            owners.claim_all(&descriptor)?;
            ultrasonic.push(descriptor);
        }

        let hardware_serial = match &file.hardware_serial {
            Some(hw) => {
                check_id(&mut ids, &hw.id)?;
                nonzero(hw.baud as u64, "hardware_serial.baud")?;
                let band = hw.sanity_band.unwrap_or(HARDWARE_SANITY_BAND);
                check_range(&format!("{} sanity_band", hw.id), &band)?;
                let descriptor = SensorDescriptor {
                    id: hw.id.clone(),
                    kind: SensorKind::HardwareUart { device: hw.device.clone(), baud: hw.baud },
                };
                owners.claim_all(&descriptor)?;
                Some(SerialSettings {
                    descriptor,
                    sanity_band: Some(band),
                    fault_policy: fault_policy(
                        hw.on_fault,
                        hw.fault_backoff_ms,
                        timing::HARDWARE_SERIAL_FAULT_BACKOFF,
                        "hardware_serial.fault_backoff_ms",
                    )?,
                    poll_interval: millis_or(
                        hw.poll_interval_ms,
                        timing::HARDWARE_SERIAL_POLL,
                        "hardware_serial.poll_interval_ms",
                    )?,
                })
            }
            None => None,
        };

        let mut software_serial = Vec::with_capacity(file.software_serial.len());
        for sw in &file.software_serial {
            check_id(&mut ids, &sw.id)?;
            nonzero(sw.baud as u64, "software_serial.baud")?;
            if let Some(band) = &sw.sanity_band {
                check_range(&format!("{} sanity_band", sw.id), band)?;
            }
            let descriptor = SensorDescriptor {
                id: sw.id.clone(),
                kind: SensorKind::SoftwareUart {
                    rx_pin: numbering.to_bcm(sw.rx_pin)?,
                    tx_pin: sw.tx_pin.map(|p| numbering.to_bcm(p)).transpose()?,
                    baud: sw.baud,
                },
            };
            owners.claim_all(&descriptor)?;
            software_serial.push(SerialSettings {
                descriptor,
                sanity_band: sw.sanity_band,
                fault_policy: fault_policy(
                    sw.on_fault,
                    sw.fault_backoff_ms,
                    timing::SOFTWARE_SERIAL_FAULT_BACKOFF,
                    "software_serial.fault_backoff_ms",
                )?,
                poll_interval: millis_or(
                    sw.poll_interval_ms,
                    timing::SOFTWARE_SERIAL_POLL,
                    "software_serial.poll_interval_ms",
                )?,
            });
        }

        Ok(Settings {
            endpoint_url: file.endpoint_url.trim().to_owned(),
            http_timeout: millis_or(file.http_timeout_ms, timing::HTTP_TIMEOUT, "http_timeout_ms")?,
            valid_range: file.valid_range,
            ultrasonic_interval: millis_or(
                file.ultrasonic_interval_ms,
                timing::ULTRASONIC_CYCLE,
                "ultrasonic_interval_ms",
            )?,
            payload: file.payload,
            pigpio: file.pigpio,
            enable_pins,
            ultrasonic,
            hardware_serial,
            software_serial,
        })
    }

    /// True if anything needs the pigpio daemon.
    pub fn needs_pigpio(&self) -> bool {
        !self.ultrasonic.is_empty() || !self.software_serial.is_empty() || !self.enable_pins.is_empty()
    }
}

// --- Validation helpers ---

/// Tracks which component owns each BCM line.
#[derive(Default)]
struct PinOwners(HashMap<u8, String>);

impl PinOwners {
    fn claim(&mut self, gpio: u8, owner: &str) -> Result<(), ConfigError> {
        if let Some(first) = self.0.get(&gpio) {
            return Err(ConfigError::PinConflict {
                gpio,
                first: first.clone(),
                second: owner.to_owned(),
            });
        }
        self.0.insert(gpio, owner.to_owned());
        Ok(())
    }

    fn claim_all(&mut self, descriptor: &SensorDescriptor) -> Result<(), ConfigError> {
        descriptor
            .gpio_lines()
            .into_iter()
            .try_for_each(|gpio| self.claim(gpio, &descriptor.id))
    }
}

fn check_id(seen: &mut Vec<String>, id: &str) -> Result<(), ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::EmptySensorId);
    }
    if seen.iter().any(|s| s == id) {
        return Err(ConfigError::DuplicateSensorId(id.to_owned()));
    }
    seen.push(id.to_owned());
    Ok(())
}

fn check_range(what: &str, range: &ValidRange) -> Result<(), ConfigError> {
    if range.is_well_formed() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRange {
            what: what.to_owned(),
            min_cm: range.min_cm,
            max_cm: range.max_cm,
        })
    }
}

fn nonzero(value: u64, what: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(what))
    } else {
        Ok(())
    }
}

fn millis_or(ms: Option<u64>, default: Duration, what: &'static str) -> Result<Duration, ConfigError> {
    match ms {
        Some(ms) => {
            nonzero(ms, what)?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(default),
    }
}

/// The backoff must be non-zero, even when `on_fault = "terminate"` leaves it unused.
fn fault_policy(
    on_fault: OnFault,
    backoff_ms: Option<u64>,
    default: Duration,
    what: &'static str,
) -> Result<FaultPolicy, ConfigError> {
    let backoff = millis_or(backoff_ms, default, what)?;
    Ok(match on_fault {
        OnFault::Retry => FaultPolicy::Retry { backoff },
        OnFault::Terminate => FaultPolicy::Terminate,
    })
}
