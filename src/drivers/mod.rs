// src/drivers/mod.rs

// Concrete implementations of the HAL seams for a Raspberry Pi class board:
// GPIO and bit-banged serial through the pigpio daemon, the hardware UART
// through `serialport`, and std-backed clock and delay.

pub mod pigpio;
pub mod serial_port;
pub mod std_clock;

pub use pigpio::{PigpioClient, PigpioError, PigpioInputPin, PigpioOutputPin};
pub use serial_port::SerialPortDevice;
pub use std_clock::{StdClock, StdDelay};
