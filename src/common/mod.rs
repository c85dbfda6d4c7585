// src/common/mod.rs

// --- Declare all public modules within common ---
pub mod config;
pub mod error;
pub mod framer;
pub mod hal_traits;
pub mod timing;
pub mod types;

// --- Re-export key types/traits/functions for easier access ---

// From config.rs
pub use config::{PinNumbering, Settings};

// From error.rs
pub use error::{ConfigError, DeliveryError, PulseError, SourceError};

// From framer.rs
pub use framer::{FramingMode, LineFramer, Tokens};

// From hal_traits.rs
pub use hal_traits::{ByteSource, Clock, MonotonicInstant};

// From types.rs
pub use types::{FaultPolicy, Reading, SensorDescriptor, SensorKind, SensorType, ValidRange};

// Timing constants stay namespaced: common::timing::*
