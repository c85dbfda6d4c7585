// src/dispatch/payload.rs

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::common::config::{PayloadConfig, PayloadSchema};
use crate::common::types::SensorType;

const EVENT_TYPE: &str = "Sensor_Event";
const EVENT_TAG: &str = "distance";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generic analytic event.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenericEvent<'a> {
    pub camera_id: &'a str,
    /// Unix seconds.
    pub event_time: i64,
    pub time_stamp_str: String,
    pub event_type: &'static str,
    pub event_tag: &'static str,
    pub sensor_id: &'a str,
    pub sensor_type: &'static str,
}

/// NX sensor event: a `;`-separated descriptor string inside a JSON envelope.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NxEvent<'a> {
    pub sensor_id: &'a str,
    pub data: String,
}

/// Builds the request body for one qualifying reading. Exactly one variant is active per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serializer {
    GenericEvent { camera_id: String },
    NxEvent { sensor_id_override: Option<String> },
}

impl Serializer {
    pub fn from_config(config: &PayloadConfig) -> Self {
        match config.schema {
            PayloadSchema::Generic => Serializer::GenericEvent {
                camera_id: config.camera_id.clone(),
            },
            PayloadSchema::Nx => Serializer::NxEvent {
                sensor_id_override: config.nx_sensor_id.clone(),
            },
        }
    }

    /// Serialises the event; `at` is the dispatch time.
    pub fn serialize<Tz>(
        &self,
        distance_cm: f64,
        sensor_id: &str,
        sensor_type: SensorType,
        at: &DateTime<Tz>,
    ) -> Result<String, serde_json::Error>
    where
        Tz: TimeZone,
        Tz::Offset: core::fmt::Display,
    {
        match self {
            Serializer::GenericEvent { camera_id } => serde_json::to_string(&GenericEvent {
                camera_id,
                event_time: at.timestamp(),
                time_stamp_str: at.format(TIMESTAMP_FORMAT).to_string(),
                event_type: EVENT_TYPE,
                event_tag: EVENT_TAG,
                sensor_id,
                sensor_type: sensor_type.as_str(),
            }),
            Serializer::NxEvent { sensor_id_override } => serde_json::to_string(&NxEvent {
                sensor_id: sensor_id_override.as_deref().unwrap_or(sensor_id),
                data: nx_descriptor(distance_cm, at.timestamp()),
            }),
        }
    }
}

/// `Type:nx.base.Sensor;distance:<m>;TimestampUs:<us>;`
///
/// The timestamp has whole-second resolution, scaled to microseconds.
pub fn nx_descriptor(distance_cm: f64, unix_seconds: i64) -> String {
    format!(
        "Type:nx.base.Sensor;distance:{};TimestampUs:{};",
        format_decimal(distance_cm / 100.0),
        unix_seconds * 1_000_000
    )
}

/// Shortest round-trip decimal, always with a fractional part (`5.0`, `1.5`, `1.2345`).
fn format_decimal(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}
