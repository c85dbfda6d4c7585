// src/drivers/pigpio.rs

//! Client for the pigpio daemon socket interface (`pigpiod`, TCP port 8888).
//!
//! Every request is a 16-byte frame of four little-endian `u32`s
//! (`cmd, p1, p2, p3`), optionally followed by `p3` extension bytes. The daemon
//! answers with a 16-byte frame whose last word is the signed result; for
//! serial reads the result is a byte count and that many data bytes follow.
//!
//! One client is shared by every pin and bit-bang channel in the process. The
//! socket sits behind a mutex so a request/response pair is never interleaved
//! with another thread's.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use embedded_hal::digital::{self, ErrorKind, ErrorType, InputPin, OutputPin, PinState};

// --- Command codes (pigpio.h, socket interface) ---
pub(crate) const CMD_MODES: u32 = 0;
pub(crate) const CMD_READ: u32 = 3;
pub(crate) const CMD_WRITE: u32 = 4;
pub(crate) const CMD_SLRO: u32 = 42;
pub(crate) const CMD_SLR: u32 = 43;
pub(crate) const CMD_SLRC: u32 = 44;

const FRAME_LEN: usize = 16;

/// Returned by `SLRO` when a bit-bang reader is already open on the line.
pub const PI_GPIO_IN_USE: i32 = -50;

/// Socket connect and per-request I/O timeout.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum PigpioError {
    #[error("pigpio socket error: {0}")]
    Io(#[from] io::Error),

    /// Daemon rejected the request; `code` is the negative pigpio error number.
    #[error("pigpio command {cmd} failed with code {code}")]
    Command { cmd: u32, code: i32 },

    /// Another thread panicked mid-request; the stream state is unknown.
    #[error("pigpio connection poisoned")]
    Poisoned,

    /// An earlier I/O error closed the connection.
    #[error("pigpio connection closed after an earlier I/O error")]
    Disconnected,
}

impl PigpioError {
    pub fn code(&self) -> Option<i32> {
        match self {
            PigpioError::Command { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl digital::Error for PigpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum PinMode {
    Input = 0,
    Output = 1,
}

/// Handle to a running pigpio daemon.
#[derive(Debug)]
pub struct PigpioClient {
    /// `None` once the connection has been closed after an I/O error.
    stream: Mutex<Option<TcpStream>>,
}

impl PigpioClient {
    /// Connects to `host:port`. Fails if the daemon is not running.
    pub fn connect(host: &str, port: u16) -> Result<Self, PigpioError> {
        let mut last_err =
            io::Error::new(io::ErrorKind::NotFound, format!("{}:{} did not resolve", host, port));
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, SOCKET_TIMEOUT) {
                Ok(stream) => return Self::from_stream(stream, SOCKET_TIMEOUT),
                Err(e) => last_err = e,
            }
        }
        Err(PigpioError::Io(last_err))
    }

    fn from_stream(stream: TcpStream, io_timeout: Duration) -> Result<Self, PigpioError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(io_timeout))?;
        stream.set_write_timeout(Some(io_timeout))?;
        Ok(PigpioClient { stream: Mutex::new(Some(stream)) })
    }

    /// Sends one request and returns the non-negative result.
    ///
    /// When `payload` is given, the result is a byte count and that many bytes are
    /// read into it (the request always asks for at most `payload.len()`).
    ///
    /// An I/O error mid-exchange leaves the reply framing unknown, so the socket is
    /// closed and every later request fails with [`PigpioError::Disconnected`].
    fn transact(
        &self,
        cmd: u32,
        p1: u32,
        p2: u32,
        ext: &[u8],
        payload: Option<&mut [u8]>,
    ) -> Result<u32, PigpioError> {
        let mut slot = self.stream.lock().map_err(|_| PigpioError::Poisoned)?;
        let stream = slot.as_mut().ok_or(PigpioError::Disconnected)?;
        match exchange(stream, cmd, p1, p2, ext, payload) {
            Err(PigpioError::Io(e)) => {
                log::error!("pigpio command {} failed mid-exchange, closing connection: {}", cmd, e);
                if let Some(stream) = slot.take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
                Err(PigpioError::Io(e))
            }
            other => other,
        }
    }

    /// False once an I/O error has closed the connection.
    pub fn is_connected(&self) -> bool {
        self.stream.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub fn set_mode(&self, gpio: u8, mode: PinMode) -> Result<(), PigpioError> {
        self.transact(CMD_MODES, gpio as u32, mode as u32, &[], None).map(drop)
    }

    /// Level of `gpio`; `true` is high.
    pub fn read(&self, gpio: u8) -> Result<bool, PigpioError> {
        self.transact(CMD_READ, gpio as u32, 0, &[], None).map(|level| level != 0)
    }

    pub fn write(&self, gpio: u8, high: bool) -> Result<(), PigpioError> {
        self.transact(CMD_WRITE, gpio as u32, high as u32, &[], None).map(drop)
    }

    /// Starts the daemon's bit-bang receiver on `gpio` (`bb_serial_read_open`).
    pub fn serial_read_open(&self, gpio: u8, baud: u32, data_bits: u32) -> Result<(), PigpioError> {
        self.transact(CMD_SLRO, gpio as u32, baud, &data_bits.to_le_bytes(), None)
            .map(drop)
    }

    /// Drains up to `buf.len()` received bytes (`bb_serial_read`). Zero means nothing pending.
    pub fn serial_read(&self, gpio: u8, buf: &mut [u8]) -> Result<usize, PigpioError> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.transact(CMD_SLR, gpio as u32, buf.len() as u32, &[], Some(buf))
            .map(|n| n as usize)
    }

    pub fn serial_read_close(&self, gpio: u8) -> Result<(), PigpioError> {
        self.transact(CMD_SLRC, gpio as u32, 0, &[], None).map(drop)
    }
}

/// One request/reply round trip on an in-sync stream.
fn exchange(
    stream: &mut TcpStream,
    cmd: u32,
    p1: u32,
    p2: u32,
    ext: &[u8],
    payload: Option<&mut [u8]>,
) -> Result<u32, PigpioError> {
    let mut frame = [0u8; FRAME_LEN];
    frame[0..4].copy_from_slice(&cmd.to_le_bytes());
    frame[4..8].copy_from_slice(&p1.to_le_bytes());
    frame[8..12].copy_from_slice(&p2.to_le_bytes());
    frame[12..16].copy_from_slice(&(ext.len() as u32).to_le_bytes());
    stream.write_all(&frame)?;
    if !ext.is_empty() {
        stream.write_all(ext)?;
    }

    let mut reply = [0u8; FRAME_LEN];
    stream.read_exact(&mut reply)?;
    let res = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
    if res < 0 {
        return Err(PigpioError::Command { cmd, code: res });
    }

    if let Some(buf) = payload {
        let count = res as usize;
        if count <= buf.len() {
            stream.read_exact(&mut buf[..count])?;
        } else {
            // Never asked for this much; keep the stream in sync and truncate.
            let mut extra = vec![0u8; count];
            stream.read_exact(&mut extra)?;
            let n = buf.len();
            buf.copy_from_slice(&extra[..n]);
            return Ok(n as u32);
        }
    }
    Ok(res as u32)
}

// --- embedded-hal pins ---

/// Input line read through the daemon.
#[derive(Debug)]
pub struct PigpioInputPin {
    client: Arc<PigpioClient>,
    gpio: u8,
}

impl PigpioInputPin {
    pub fn new(client: Arc<PigpioClient>, gpio: u8) -> Result<Self, PigpioError> {
        client.set_mode(gpio, PinMode::Input)?;
        Ok(Self { client, gpio })
    }

    pub fn gpio(&self) -> u8 {
        self.gpio
    }
}

impl ErrorType for PigpioInputPin {
    type Error = PigpioError;
}

impl InputPin for PigpioInputPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        self.client.read(self.gpio)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.client.read(self.gpio).map(|high| !high)
    }
}

/// Output line owned for the guard's lifetime.
///
/// Dropping the guard returns the line to input mode, so the pin is left
/// undriven on every exit path.
#[derive(Debug)]
pub struct PigpioOutputPin {
    client: Arc<PigpioClient>,
    gpio: u8,
}

impl PigpioOutputPin {
    pub fn new(client: Arc<PigpioClient>, gpio: u8, initial: PinState) -> Result<Self, PigpioError> {
        client.set_mode(gpio, PinMode::Output)?;
        client.write(gpio, initial == PinState::High)?;
        Ok(Self { client, gpio })
    }

    pub fn gpio(&self) -> u8 {
        self.gpio
    }
}

impl ErrorType for PigpioOutputPin {
    type Error = PigpioError;
}

impl OutputPin for PigpioOutputPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.client.write(self.gpio, false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.client.write(self.gpio, true)
    }
}

impl Drop for PigpioOutputPin {
    fn drop(&mut self) {
        if let Err(e) = self.client.set_mode(self.gpio, PinMode::Input) {
            log::warn!("GPIO {}: could not release output: {}", self.gpio, e);
        }
    }
}


// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::fake::{frame, ok, FakeDaemon};
    use super::*;

    #[test]
    fn test_pin_requests_are_framed() {
        let daemon = FakeDaemon::spawn(|f| match f.cmd {
            CMD_READ if f.p1 == 24 => (1, Vec::new()),
            _ => (0, Vec::new()),
        });
        let client = daemon.client();

        {
            let mut echo = PigpioInputPin::new(Arc::clone(&client), 24).unwrap();
            assert!(echo.is_high().unwrap());
            assert!(!echo.is_low().unwrap());

            let mut trig = PigpioOutputPin::new(Arc::clone(&client), 23, PinState::Low).unwrap();
            trig.set_high().unwrap();
            trig.set_low().unwrap();
        }
        drop(client);

        let frames = daemon.finish();
        assert_eq!(
            frames,
            vec![
                frame(CMD_MODES, 24, PinMode::Input as u32),
                frame(CMD_READ, 24, 0),
                frame(CMD_READ, 24, 0),
                frame(CMD_MODES, 23, PinMode::Output as u32),
                frame(CMD_WRITE, 23, 0),
                frame(CMD_WRITE, 23, 1),
                frame(CMD_WRITE, 23, 0),
                // guard drop releases the line
                frame(CMD_MODES, 23, PinMode::Input as u32),
            ]
        );
    }

    #[test]
    fn test_serial_read_returns_payload() {
        let daemon = FakeDaemon::spawn(|f| match f.cmd {
            CMD_SLR => (4, b"500\n".to_vec()),
            _ => (0, Vec::new()),
        });
        let client = daemon.client();

        client.serial_read_open(17, 9600, 8).unwrap();
        let mut buf = [0u8; 64];
        let n = client.serial_read(17, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"500\n");
        client.serial_read_close(17).unwrap();
        drop(client);

        let frames = daemon.finish();
        assert_eq!(frames[0].cmd, CMD_SLRO);
        assert_eq!((frames[0].p1, frames[0].p2), (17, 9600));
        assert_eq!(frames[0].ext, 8u32.to_le_bytes().to_vec());
        assert_eq!(frames[1], frame(CMD_SLR, 17, 64));
        assert_eq!(frames[2], frame(CMD_SLRC, 17, 0));
    }

    #[test]
    fn test_negative_result_is_an_error() {
        let daemon = FakeDaemon::spawn(|_| (PI_GPIO_IN_USE, Vec::new()));
        let client = daemon.client();
        let err = client.serial_read_open(17, 9600, 8).unwrap_err();
        assert_eq!(err.code(), Some(PI_GPIO_IN_USE));
        // a rejected command leaves the stream in sync
        assert!(client.is_connected());
        drop(client);
        daemon.finish();
    }

    #[test]
    fn test_late_reply_closes_connection() {
        // GPIO 24 is high but answers late; GPIO 25 is low.
        let daemon = FakeDaemon::spawn(|f| match (f.cmd, f.p1) {
            (CMD_READ, 24) => {
                std::thread::sleep(Duration::from_millis(300));
                (1, Vec::new())
            }
            _ => (0, Vec::new()),
        });
        let client = daemon.client_with_timeout(Duration::from_millis(100));

        assert!(matches!(client.read(24), Err(PigpioError::Io(_))));
        assert!(!client.is_connected());
        // never the stale reply for GPIO 24
        assert!(matches!(client.read(25), Err(PigpioError::Disconnected)));

        drop(client);
        let frames = daemon.finish();
        assert_eq!(frames, vec![frame(CMD_READ, 24, 0)]);
    }

    #[test]
    fn test_empty_buffer_skips_request() {
        let daemon = FakeDaemon::spawn(ok);
        let client = daemon.client();
        assert_eq!(client.serial_read(17, &mut []).unwrap(), 0);
        drop(client);
        assert!(daemon.finish().is_empty());
    }

    #[test]
    fn test_connect_fails_without_daemon() {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(matches!(PigpioClient::connect("127.0.0.1", port), Err(PigpioError::Io(_))));
    }
}
