// src/acquisition/software_serial.rs

use std::sync::Arc;

use embedded_hal::digital::PinState;

use super::serial_source::{SerialSource, SourceProfile};
use crate::common::{config::SerialSettings, hal_traits::ByteSource, types::SensorKind};
use crate::dispatch::Dispatcher;
use crate::drivers::pigpio::{PigpioClient, PigpioError, PigpioOutputPin, PinMode, PI_GPIO_IN_USE};

const DATA_BITS: u32 = 8;

/// Bit-banged receiver on a GPIO line, run by the pigpio daemon.
///
/// The optional TX line is only held at its idle-high level; nothing is ever
/// transmitted. Dropping the channel closes the receiver and releases TX.
#[derive(Debug)]
pub struct BitBangChannel {
    client: Arc<PigpioClient>,
    rx_pin: u8,
    _tx: Option<PigpioOutputPin>,
}

impl BitBangChannel {
    /// Claims `rx_pin` (and `tx_pin`) and starts the receiver.
    ///
    /// A receiver left open on `rx_pin` by an earlier process is closed and the
    /// open is retried once.
    pub fn open(client: Arc<PigpioClient>, rx_pin: u8, tx_pin: Option<u8>, baud: u32) -> Result<Self, PigpioError> {
        client.set_mode(rx_pin, PinMode::Input)?;
        let tx = tx_pin
            .map(|gpio| PigpioOutputPin::new(Arc::clone(&client), gpio, PinState::High))
            .transpose()?;

        match client.serial_read_open(rx_pin, baud, DATA_BITS) {
            Err(e) if e.code() == Some(PI_GPIO_IN_USE) => {
                log::warn!("GPIO {} already has a bit-bang reader; reopening", rx_pin);
                client.serial_read_close(rx_pin)?;
                client.serial_read_open(rx_pin, baud, DATA_BITS)?;
            }
            other => other?,
        }
        log::debug!("bit-bang receiver open on GPIO {} at {} baud", rx_pin, baud);

        Ok(BitBangChannel { client, rx_pin, _tx: tx })
    }

    pub fn rx_pin(&self) -> u8 {
        self.rx_pin
    }
}

impl ByteSource for BitBangChannel {
    type Error = PigpioError;

    fn read_available(&mut self, buf: &mut [u8]) -> nb::Result<usize, PigpioError> {
        match self.client.serial_read(self.rx_pin, buf)? {
            0 => Err(nb::Error::WouldBlock),
            n => Ok(n),
        }
    }
}

impl Drop for BitBangChannel {
    fn drop(&mut self) {
        if let Err(e) = self.client.serial_read_close(self.rx_pin) {
            log::warn!("failed to close bit-bang reader on GPIO {}: {}", self.rx_pin, e);
        }
    }
}

/// Radar on a bit-banged GPIO line.
pub type SoftwareSerialSource = SerialSource<BitBangChannel>;

pub fn open(
    settings: &SerialSettings,
    client: Arc<PigpioClient>,
    dispatcher: Arc<Dispatcher>,
) -> Result<SoftwareSerialSource, PigpioError> {
    let SensorKind::SoftwareUart { rx_pin, tx_pin, baud } = settings.descriptor.kind else {
        return Err(PigpioError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a software UART sensor", settings.descriptor.id),
        )));
    };
    let channel = BitBangChannel::open(client, rx_pin, tx_pin, baud)?;
    log::info!("{} | listening on GPIO {} at {} baud", settings.descriptor.id, rx_pin, baud);
    Ok(SerialSource::new(
        settings.descriptor.id.clone(),
        SourceProfile::from_settings(settings),
        channel,
        dispatcher,
    ))
}
