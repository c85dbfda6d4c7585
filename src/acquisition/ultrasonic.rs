// src/acquisition/ultrasonic.rs

use core::fmt::Debug;
use core::time::Duration;
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin, PinState};

use super::pulse_timer::PulseTimer;
use crate::common::{
    hal_traits::Clock,
    types::{Reading, SensorDescriptor, SensorKind, SensorType},
};
use crate::dispatch::Dispatcher;
use crate::drivers::pigpio::{PigpioClient, PigpioError, PigpioInputPin, PigpioOutputPin};
use crate::supervisor::ShutdownSignal;

/// One trigger/echo pair.
#[derive(Debug)]
pub struct UltrasonicChannel<T, E> {
    pub id: String,
    trig: T,
    echo: E,
}

impl<T, E> UltrasonicChannel<T, E> {
    pub fn new(id: impl Into<String>, trig: T, echo: E) -> Self {
        UltrasonicChannel { id: id.into(), trig, echo }
    }
}

impl UltrasonicChannel<PigpioOutputPin, PigpioInputPin> {
    /// Claims the descriptor's pins through the daemon. Trigger starts low.
    pub fn open(client: &Arc<PigpioClient>, descriptor: &SensorDescriptor) -> Result<Self, PigpioError> {
        match descriptor.kind {
            SensorKind::Ultrasonic { trig_pin, echo_pin } => {
                let trig = PigpioOutputPin::new(Arc::clone(client), trig_pin, PinState::Low)?;
                let echo = PigpioInputPin::new(Arc::clone(client), echo_pin)?;
                Ok(Self::new(descriptor.id.clone(), trig, echo))
            }
            _ => Err(PigpioError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not an ultrasonic sensor", descriptor.id),
            ))),
        }
    }
}

/// All ultrasonic sensors, measured one after another once per cycle.
pub struct UltrasonicArray<C, D, T, E> {
    timer: PulseTimer<C, D>,
    channels: Vec<UltrasonicChannel<T, E>>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl<C, D, T, E, PE> UltrasonicArray<C, D, T, E>
where
    C: Clock,
    D: DelayNs,
    T: OutputPin<Error = PE>,
    E: InputPin<Error = PE>,
    PE: Debug,
{
    pub fn new(timer: PulseTimer<C, D>, dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        UltrasonicArray {
            timer,
            channels: Vec::new(),
            dispatcher,
            interval,
        }
    }

    pub fn add_channel(&mut self, channel: UltrasonicChannel<T, E>) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Measures every sensor once and dispatches each sample. Returns how many produced a distance.
    pub fn run_cycle(&mut self) -> usize {
        let mut measured = 0;
        for channel in self.channels.iter_mut() {
            match self.timer.measure(&mut channel.trig, &mut channel.echo) {
                Ok(distance_cm) => {
                    measured += 1;
                    log::info!("{} Ultrasonic Distance: {:.2} cm", channel.id, distance_cm);
                    let reading = Reading::new(&channel.id, SensorType::Ultrasonic, distance_cm);
                    self.dispatcher.dispatch_reading(&reading);
                }
                Err(e) if e.is_skip() => log::info!("{} | no sample: {}", channel.id, e),
                Err(e) => log::warn!("{} | {}", channel.id, e),
            }
        }
        measured
    }

    /// Polls on the configured cadence until shutdown.
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        log::info!("Ultrasonic polling started for {} sensor(s)", self.channels.len());
        while !shutdown.is_requested() {
            self.run_cycle();
            if !shutdown.sleep(self.interval) {
                break;
            }
        }
        log::info!("Ultrasonic polling stopped");
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::super::pulse_timer::sim::{width_for_cm, Rig};
    use super::*;
    use crate::dispatch::mock::{capture_logs, dispatcher};

    #[test]
    fn test_in_range_sample_is_dispatched_once() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let rig = Rig::new([
            Some((300, width_for_cm(150.0))),
            Some((300, width_for_cm(50.0))),
        ]);
        let (trig, echo) = rig.pins();
        let mut array = UltrasonicArray::new(rig.timer(), Arc::new(dispatcher), Duration::from_secs(3));
        array.add_channel(UltrasonicChannel::new("US1", trig, echo));

        // 150 cm: inside [120, 780]
        assert_eq!(array.run_cycle(), 1);
        {
            let calls = calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].1["sensorId"], "US1");
            assert_eq!(calls[0].1["sensorType"], "Ultrasonic");
        }

        // 50 cm: measured fine, rejected by the dispatcher with one log line
        let (measured, records) = capture_logs(|| array.run_cycle());
        assert_eq!(measured, 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
        let rejections = records
            .iter()
            .filter(|(level, line)| *level == log::Level::Info && line.contains("out of the valid range"))
            .count();
        assert_eq!(rejections, 1);
    }

    #[test]
    fn test_sensors_are_measured_in_order_and_failures_skipped() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let dispatcher = Arc::new(dispatcher);

        // US1 never answers; US2 does.
        let first = Rig::new([None]);
        let second = first.sharing_clock([Some((200, width_for_cm(300.0)))]);
        let (t1, e1) = first.pins();
        let (t2, e2) = second.pins();

        let mut array = UltrasonicArray::new(first.timer(), dispatcher, Duration::from_secs(3));
        array.add_channel(UltrasonicChannel::new("US1", t1, e1));
        array.add_channel(UltrasonicChannel::new("US2", t2, e2));

        assert_eq!(array.run_cycle(), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["sensorId"], "US2");
        assert_eq!(first.transducer.borrow().triggers, 1);
        assert_eq!(second.transducer.borrow().triggers, 1);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let (dispatcher, calls) = dispatcher(120.0, 780.0, false);
        let rig = Rig::new(vec![Some((300, width_for_cm(200.0))); 1]);
        let (trig, echo) = rig.pins();
        let mut array =
            UltrasonicArray::new(rig.timer(), Arc::new(dispatcher), Duration::from_secs(3600));
        array.add_channel(UltrasonicChannel::new("US1", trig, echo));

        let shutdown = ShutdownSignal::new();
        shutdown.request();
        array.run(&shutdown);
        assert!(calls.lock().unwrap().is_empty());
    }
}
