// src/acquisition/serial_source.rs

//! Polling loop shared by the hardware and bit-banged serial sources.
//!
//! A source pulls whatever bytes are pending, frames them into tokens, parses
//! each token as a distance in centimetres, applies the optional per-source
//! sanity band and hands survivors to the dispatcher. Transport differences
//! live entirely behind [`ByteSource`].

use core::time::Duration;
use std::sync::Arc;

use crate::common::{
    config::SerialSettings,
    error::SourceError,
    framer::{FramingMode, LineFramer},
    hal_traits::ByteSource,
    types::{FaultPolicy, Reading, SensorKind, SensorType, ValidRange},
};
use crate::dispatch::Dispatcher;
use crate::supervisor::ShutdownSignal;

/// Bytes pulled from the driver per poll.
const CHUNK_LEN: usize = 512;

/// Per-source behaviour that is not transport-specific.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    pub sensor_type: SensorType,
    pub mode: FramingMode,
    /// Extra plausibility filter applied before the dispatcher's valid range.
    pub sanity_band: Option<ValidRange>,
    pub fault_policy: FaultPolicy,
    pub poll_interval: Duration,
}

impl SourceProfile {
    /// Hardware UART frames strictly; the bit-banged line is noisy and frames leniently.
    pub fn from_settings(settings: &SerialSettings) -> Self {
        let sensor_type = settings.descriptor.sensor_type();
        let mode = match settings.descriptor.kind {
            SensorKind::SoftwareUart { .. } => FramingMode::Lenient,
            _ => FramingMode::Strict,
        };
        SourceProfile {
            sensor_type,
            mode,
            sanity_band: settings.sanity_band,
            fault_policy: settings.fault_policy,
            poll_interval: settings.poll_interval,
        }
    }
}

/// Why [`SerialSource::run`] returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceExit {
    Shutdown,
    /// Driver fault under [`FaultPolicy::Terminate`].
    Faulted,
}

pub struct SerialSource<S> {
    sensor_id: String,
    profile: SourceProfile,
    source: S,
    framer: LineFramer,
    dispatcher: Arc<Dispatcher>,
}

impl<S: ByteSource> SerialSource<S> {
    pub fn new(sensor_id: impl Into<String>, profile: SourceProfile, source: S, dispatcher: Arc<Dispatcher>) -> Self {
        let framer = LineFramer::new(profile.mode);
        SerialSource {
            sensor_id: sensor_id.into(),
            profile,
            source,
            framer,
            dispatcher,
        }
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// One read-frame-dispatch pass. Returns the number of bytes read; `0` means nothing was pending.
    pub fn poll_once(&mut self) -> Result<usize, SourceError<S::Error>> {
        let mut chunk = [0u8; CHUNK_LEN];
        let n = match self.source.read_available(&mut chunk) {
            Ok(n) => n,
            Err(nb::Error::WouldBlock) => return Ok(0),
            Err(nb::Error::Other(e)) => return Err(SourceError::Io(e)),
        };

        let SerialSource {
            sensor_id,
            profile,
            framer,
            dispatcher,
            ..
        } = self;
        for token in framer.feed(&chunk[..n]) {
            match parse_token(profile.mode, &token) {
                Ok(distance_cm) => admit(sensor_id, profile, dispatcher, distance_cm),
                Err(e) => log::debug!("{} | {}", sensor_id, e),
            }
        }
        Ok(n)
    }

    /// Polls until shutdown, or until a fault under [`FaultPolicy::Terminate`].
    ///
    /// Sleeps only when a poll came back empty. Under `Retry`, partially framed
    /// bytes are discarded after a fault.
    pub fn run(&mut self, shutdown: &ShutdownSignal) -> SourceExit {
        log::info!("{} | {} polling started", self.sensor_id, self.profile.sensor_type);
        let exit = loop {
            if shutdown.is_requested() {
                break SourceExit::Shutdown;
            }
            match self.poll_once() {
                Ok(0) => {
                    if !shutdown.sleep(self.profile.poll_interval) {
                        break SourceExit::Shutdown;
                    }
                }
                Ok(_) => {}
                Err(e) => match self.profile.fault_policy {
                    FaultPolicy::Retry { backoff } => {
                        log::warn!("{} | {}; retrying in {:?}", self.sensor_id, e, backoff);
                        self.framer.reset();
                        if !shutdown.sleep(backoff) {
                            break SourceExit::Shutdown;
                        }
                    }
                    FaultPolicy::Terminate => {
                        log::error!("{} | {}; stopping source", self.sensor_id, e);
                        break SourceExit::Faulted;
                    }
                },
            }
        };
        log::info!("{} | {} polling stopped ({:?})", self.sensor_id, self.profile.sensor_type, exit);
        exit
    }
}

/// Strict tokens are unsigned integers; lenient tokens are digit runs read as decimals.
fn parse_token(mode: FramingMode, token: &str) -> Result<f64, SourceError> {
    let parsed = match mode {
        FramingMode::Strict => token.parse::<u32>().map(f64::from).ok(),
        FramingMode::Lenient => token.parse::<f64>().ok(),
    };
    parsed.ok_or_else(|| SourceError::MalformedToken(token.to_owned()))
}

fn admit(sensor_id: &str, profile: &SourceProfile, dispatcher: &Dispatcher, distance_cm: f64) {
    if let Some(band) = profile.sanity_band {
        if !band.contains(distance_cm) {
            log::info!(
                "{} ({}) | Distance {} cm is out of the sanity band ({}).",
                sensor_id,
                profile.sensor_type,
                distance_cm,
                band
            );
            return;
        }
    }
    log::info!("{} {} Distance: {} cm", sensor_id, profile.sensor_type, distance_cm);
    let reading = Reading::new(sensor_id, profile.sensor_type, distance_cm);
    dispatcher.dispatch_reading(&reading);
}

// --- Test support: scripted byte source ---
#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    pub struct LineDown;

    pub enum Step {
        Bytes(Vec<u8>),
        Idle,
        Fault,
    }

    /// Plays back `steps`; once exhausted it reports idle and raises `on_exhausted`.
    pub struct ScriptedSource {
        pub steps: VecDeque<Step>,
        pub on_exhausted: Option<ShutdownSignal>,
        pub released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            ScriptedSource {
                steps: steps.into_iter().collect(),
                on_exhausted: None,
                released: Arc::default(),
            }
        }

        pub fn chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Self {
            Self::new(chunks.into_iter().map(|c| Step::Bytes(c.to_vec())))
        }
    }

    impl ByteSource for ScriptedSource {
        type Error = LineDown;

        fn read_available(&mut self, buf: &mut [u8]) -> nb::Result<usize, LineDown> {
            match self.steps.pop_front() {
                Some(Step::Bytes(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Step::Idle) => Err(nb::Error::WouldBlock),
                Some(Step::Fault) => Err(nb::Error::Other(LineDown)),
                None => {
                    if let Some(signal) = &self.on_exhausted {
                        signal.request();
                    }
                    Err(nb::Error::WouldBlock)
                }
            }
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }
}
