// src/lib.rs

//! Distance sensor acquisition and event relay.
//!
//! Three kinds of ranging sensors feed one dispatch stage:
//! ultrasonic trigger/echo pairs (timed on GPIO), a hardware-UART ranging
//! sensor and any number of bit-banged ("software") UART sensors. Each reading
//! is checked against the configured admissible range and forwarded as a JSON
//! event to an HTTP endpoint.

pub mod acquisition;
pub mod common;
pub mod dispatch;
pub mod drivers;
pub mod supervisor;

// Re-export key types for convenience
pub use common::{Settings, SensorDescriptor, SensorType, ValidRange};
pub use dispatch::Dispatcher;
