// src/drivers/serial_port.rs

use std::io::{self, Read};
use std::time::Duration;

use crate::common::hal_traits::ByteSource;

/// Hardware UART opened through the `serialport` crate. Closed when dropped.
pub struct SerialPortDevice {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialPortDevice {
    /// Opens `path` at `baud`, 8N1, no flow control.
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .flow_control(serialport::FlowControl::None)
            .open()?;
        Ok(SerialPortDevice { port, path: path.to_owned() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl core::fmt::Debug for SerialPortDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SerialPortDevice").field("path", &self.path).finish()
    }
}

impl ByteSource for SerialPortDevice {
    type Error = io::Error;

    fn read_available(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
        let pending = self
            .port
            .bytes_to_read()
            .map_err(|e| nb::Error::Other(io::Error::from(e)))? as usize;
        if pending == 0 || buf.is_empty() {
            return Err(nb::Error::WouldBlock);
        }
        let want = pending.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(0) => Err(nb::Error::WouldBlock),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(e)),
        }
    }
}

impl Drop for SerialPortDevice {
    fn drop(&mut self) {
        log::debug!("closing serial port {}", self.path);
    }
}
