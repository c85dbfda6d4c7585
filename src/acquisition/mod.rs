// src/acquisition/mod.rs

// Leaf: pulse-echo timing
pub mod pulse_timer;

// Ultrasonic polling loop (runs on the main thread)
pub mod ultrasonic;

// Shared serial loop, then its two concrete sources
pub mod serial_source;
pub mod hardware_serial;
pub mod software_serial;

pub use pulse_timer::PulseTimer;
pub use serial_source::{SerialSource, SourceExit, SourceProfile};
pub use ultrasonic::{UltrasonicArray, UltrasonicChannel};
pub use hardware_serial::HardwareSerialSource;
pub use software_serial::{BitBangChannel, SoftwareSerialSource};
