// src/acquisition/hardware_serial.rs

use std::sync::Arc;

use super::serial_source::{SerialSource, SourceProfile};
use crate::common::{config::SerialSettings, timing, types::SensorKind};
use crate::dispatch::Dispatcher;
use crate::drivers::serial_port::SerialPortDevice;

/// Radar on the board's hardware UART.
pub type HardwareSerialSource = SerialSource<SerialPortDevice>;

/// Opens the configured device and wraps it in a strict-framing source.
pub fn open(settings: &SerialSettings, dispatcher: Arc<Dispatcher>) -> Result<HardwareSerialSource, serialport::Error> {
    let SensorKind::HardwareUart { device, baud } = &settings.descriptor.kind else {
        return Err(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            format!("{} is not a hardware UART sensor", settings.descriptor.id),
        ));
    };
    let port = SerialPortDevice::open(device, *baud, timing::HARDWARE_SERIAL_READ_TIMEOUT)?;
    log::info!("{} | opened {} at {} baud", settings.descriptor.id, device, baud);
    Ok(SerialSource::new(
        settings.descriptor.id.clone(),
        SourceProfile::from_settings(settings),
        port,
        dispatcher,
    ))
}
