// src/dispatch/mod.rs

//! Validation and forwarding of readings.
//!
//! The dispatcher holds no mutable state. Every acquisition thread calls it
//! directly; a slow endpoint only stalls the thread that is waiting on it.

pub mod payload;
pub mod transport;

pub use payload::Serializer;
pub use transport::{EventTransport, UreqTransport};

use chrono::{DateTime, Local, TimeZone};

use crate::common::config::Settings;
use crate::common::types::{Reading, SensorType, ValidRange};

/// What happened to one candidate distance. Callers may ignore it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Outside the valid range; no request made.
    Rejected,
    /// Endpoint accepted the event.
    Delivered { status: u16 },
    /// Request failed and was dropped. Already logged.
    Failed,
}

pub struct Dispatcher {
    valid_range: ValidRange,
    endpoint_url: String,
    serializer: Serializer,
    transport: Box<dyn EventTransport>,
}

impl Dispatcher {
    pub fn new(
        valid_range: ValidRange,
        endpoint_url: impl Into<String>,
        serializer: Serializer,
        transport: Box<dyn EventTransport>,
    ) -> Self {
        Dispatcher {
            valid_range,
            endpoint_url: endpoint_url.into(),
            serializer,
            transport,
        }
    }

    pub fn from_settings(settings: &Settings, transport: Box<dyn EventTransport>) -> Self {
        Self::new(
            settings.valid_range,
            settings.endpoint_url.clone(),
            Serializer::from_config(&settings.payload),
            transport,
        )
    }

    /// Range the dispatcher enforces.
    pub fn valid_range(&self) -> ValidRange {
        self.valid_range
    }

    /// Validates and, if admissible, posts one event. Never fails from the caller's side.
    pub fn dispatch(&self, distance_cm: f64, sensor_id: &str, sensor_type: SensorType) -> DispatchOutcome {
        self.dispatch_at(distance_cm, sensor_id, sensor_type, &Local::now())
    }

    pub fn dispatch_reading(&self, reading: &Reading) -> DispatchOutcome {
        if let Ok(age) = reading.captured_at.elapsed() {
            log::trace!("{} | dispatching reading captured {:?} ago", reading.sensor_id, age);
        }
        self.dispatch(reading.distance_cm, &reading.sensor_id, reading.sensor_type)
    }

    /// `dispatch` with an explicit event time.
    pub fn dispatch_at<Tz>(
        &self,
        distance_cm: f64,
        sensor_id: &str,
        sensor_type: SensorType,
        at: &DateTime<Tz>,
    ) -> DispatchOutcome
    where
        Tz: TimeZone,
        Tz::Offset: core::fmt::Display,
    {
        if !self.valid_range.contains(distance_cm) {
            log::info!(
                "{} ({}) | Distance {:.2} cm is out of the valid range ({}).",
                sensor_id,
                sensor_type,
                distance_cm,
                self.valid_range
            );
            return DispatchOutcome::Rejected;
        }

        let body = match self.serializer.serialize(distance_cm, sensor_id, sensor_type, at) {
            Ok(body) => body,
            Err(e) => {
                log::error!("{} ({}) | Could not encode event: {}", sensor_id, sensor_type, e);
                return DispatchOutcome::Failed;
            }
        };

        match self.transport.post_json(&self.endpoint_url, &body) {
            Ok(status) => {
                log::info!("{} ({}) | Event sent, HTTP {}", sensor_id, sensor_type, status);
                DispatchOutcome::Delivered { status }
            }
            Err(e) => {
                log::error!("{} ({}) | Failed to send event: {}", sensor_id, sensor_type, e);
                DispatchOutcome::Failed
            }
        }
    }
}

// --- Test support: transport that records instead of posting ---
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::common::error::DeliveryError;
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex, Once};

    pub type Calls = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

    pub struct RecordingTransport {
        pub calls: Calls,
        pub fail: bool,
    }

    impl EventTransport for RecordingTransport {
        fn post_json(&self, url: &str, body: &str) -> Result<u16, DeliveryError> {
            let value = serde_json::from_str(body).map_err(DeliveryError::Serialize)?;
            self.calls.lock().unwrap().push((url.to_owned(), value));
            if self.fail {
                Err(DeliveryError::Transport("connection refused".into()))
            } else {
                Ok(200)
            }
        }
    }

    /// Generic-schema dispatcher over `[min, max]` plus a handle on what it posted.
    pub fn dispatcher(min: f64, max: f64, fail: bool) -> (Dispatcher, Calls) {
        recording(min, max, fail, Serializer::GenericEvent { camera_id: "RD001".into() })
    }

    /// NX-schema dispatcher; its bodies carry the distance, see [`distances_cm`].
    pub fn nx_dispatcher(min: f64, max: f64) -> (Dispatcher, Calls) {
        recording(min, max, false, Serializer::NxEvent { sensor_id_override: None })
    }

    fn recording(min: f64, max: f64, fail: bool, serializer: Serializer) -> (Dispatcher, Calls) {
        let calls: Calls = Arc::default();
        let transport = RecordingTransport { calls: Arc::clone(&calls), fail };
        let dispatcher = Dispatcher::new(
            ValidRange::new(min, max).unwrap(),
            "http://127.0.0.1:3300/analyticEvent",
            serializer,
            Box::new(transport),
        );
        (dispatcher, calls)
    }

    // --- Log capture ---

    pub type Records = Vec<(log::Level, String)>;

    thread_local! {
        static CAPTURED: RefCell<Option<Records>> = const { RefCell::new(None) };
    }

    /// Records log lines emitted on threads that are inside [`capture_logs`].
    struct CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata<'_>) -> bool {
            true
        }

        fn log(&self, record: &log::Record<'_>) {
            let line = record.args().to_string();
            CAPTURED.with(|captured| {
                if let Some(records) = captured.borrow_mut().as_mut() {
                    records.push((record.level(), line));
                }
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static INSTALL: Once = Once::new();

    /// Runs `f` and returns what it logged on the calling thread.
    pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Records) {
        INSTALL.call_once(|| {
            let _ = log::set_logger(&LOGGER);
            log::set_max_level(log::LevelFilter::Trace);
        });
        CAPTURED.with(|captured| *captured.borrow_mut() = Some(Vec::new()));
        let out = f();
        let records = CAPTURED.with(|captured| captured.borrow_mut().take().unwrap_or_default());
        (out, records)
    }

    /// Distances (cm) recovered from recorded NX bodies, in posting order.
    pub fn distances_cm(calls: &Calls) -> Vec<f64> {
        calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, body)| {
                let data = body["data"].as_str()?;
                let metres = data.split(';').find_map(|f| f.strip_prefix("distance:"))?;
                metres.parse::<f64>().ok().map(|m| (m * 100.0).round())
            })
            .collect()
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::mock::{capture_logs, dispatcher};
    use super::*;

    #[test]
    fn test_out_of_range_makes_no_call() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        for d in [0.0, 50.0, 119.99, 780.01, 5_000.0, f64::NAN] {
            assert_eq!(dispatcher.dispatch(d, "US1", SensorType::Ultrasonic), DispatchOutcome::Rejected);
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_in_range_makes_exactly_one_call() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let outcome = dispatcher.dispatch(150.0, "US1", SensorType::Ultrasonic);
        assert_eq!(outcome, DispatchOutcome::Delivered { status: 200 });

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (url, body) = &calls[0];
        assert_eq!(url, "http://127.0.0.1:3300/analyticEvent");
        assert_eq!(body["sensorId"], "US1");
        assert_eq!(body["sensorType"], "Ultrasonic");
        assert_eq!(body["eventType"], "Sensor_Event");
    }

    #[test]
    fn test_delivery_fault_is_logged_once() {
        let (dispatcher, _calls) = dispatcher(120.0, 780.0, true);
        let (outcome, records) =
            capture_logs(|| dispatcher.dispatch(300.0, "RADAR_2", SensorType::SoftwareUart));
        assert_eq!(outcome, DispatchOutcome::Failed);

        let errors: Vec<_> = records.iter().filter(|(level, _)| *level == log::Level::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("RADAR_2"));
        assert!(errors[0].1.contains("connection refused"));
    }

    #[test]
    fn test_rejection_is_logged_once_without_errors() {
        let (dispatcher, _calls) = dispatcher(120.0, 780.0, false);
        let (outcome, records) = capture_logs(|| dispatcher.dispatch(50.0, "US1", SensorType::Ultrasonic));
        assert_eq!(outcome, DispatchOutcome::Rejected);

        let rejections: Vec<_> = records
            .iter()
            .filter(|(level, line)| *level == log::Level::Info && line.contains("out of the valid range"))
            .collect();
        assert_eq!(rejections.len(), 1);
        assert!(records.iter().all(|(level, _)| *level > log::Level::Warn));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        assert!(matches!(
            dispatcher.dispatch(120.0, "R", SensorType::HardwareUart),
            DispatchOutcome::Delivered { .. }
        ));
        assert!(matches!(
            dispatcher.dispatch(780.0, "R", SensorType::HardwareUart),
            DispatchOutcome::Delivered { .. }
        ));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_delivery_fault_is_swallowed() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, true);
        let outcome = dispatcher.dispatch(300.0, "RADAR_2", SensorType::SoftwareUart);
        assert_eq!(outcome, DispatchOutcome::Failed);
        // one attempt, no retry
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_event_time_is_dispatch_time() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let at = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        dispatcher.dispatch_at(200.0, "US2", SensorType::Ultrasonic, &at);
        assert_eq!(calls.lock().unwrap()[0].1["eventTime"], 1_700_000_000);
    }

    #[test]
    fn test_dispatch_reading() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let reading = Reading::new("RADAR_1", SensorType::HardwareUart, 500.0);
        assert!(matches!(dispatcher.dispatch_reading(&reading), DispatchOutcome::Delivered { .. }));
        assert_eq!(calls.lock().unwrap()[0].1["sensorType"], "Hardware_UART");
    }
}
