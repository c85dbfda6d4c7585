// src/main.rs

//! `sensor-relay` daemon.
//!
//! Serial sources each get a worker thread; the ultrasonic array runs on the
//! main thread. Everything stops on SIGINT/SIGTERM and releases its hardware.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use embedded_hal::digital::PinState;

use sensor_relay::acquisition::{hardware_serial, software_serial, PulseTimer, UltrasonicArray, UltrasonicChannel};
use sensor_relay::common::Settings;
use sensor_relay::dispatch::{Dispatcher, UreqTransport};
use sensor_relay::drivers::{PigpioClient, PigpioOutputPin, StdClock, StdDelay};
use sensor_relay::supervisor::{self, ShutdownSignal, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "sensor-relay", version, about = "Relays distance sensor readings to an HTTP endpoint")]
struct Cli {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = "/etc/sensor-relay/config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("{}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.check {
        println!(
            "{}: ok ({} ultrasonic, {} hardware serial, {} software serial)",
            cli.config.display(),
            settings.ultrasonic.len(),
            settings.hardware_serial.iter().count(),
            settings.software_serial.len()
        );
        return ExitCode::SUCCESS;
    }

    if let Err(e) = supervisor::install_signal_handlers() {
        log::warn!("cannot install signal handlers: {}", e);
    }

    if run(&settings) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Starts every source that can be started and blocks until shutdown.
/// Returns `false` if nothing could be started.
fn run(settings: &Settings) -> bool {
    let transport = UreqTransport::new(settings.http_timeout);
    let dispatcher = Arc::new(Dispatcher::from_settings(settings, Box::new(transport)));
    let shutdown = ShutdownSignal::new();
    let mut workers = Supervisor::new(shutdown.clone());

    log::info!(
        "relaying to {} (valid range {})",
        settings.endpoint_url,
        dispatcher.valid_range()
    );

    // --- Hardware UART ---
    if let Some(hw) = &settings.hardware_serial {
        match hardware_serial::open(hw, Arc::clone(&dispatcher)) {
            Ok(mut source) => {
                if let Err(e) = workers.spawn(&hw.descriptor.id, move |signal| {
                    source.run(&signal);
                }) {
                    log::error!("{} | cannot start worker: {}", hw.descriptor.id, e);
                }
            }
            Err(e) => log::error!("{} | source disabled: {}", hw.descriptor.id, e),
        }
    }

    // --- pigpio-backed sources ---
    let client = if settings.needs_pigpio() {
        match PigpioClient::connect(&settings.pigpio.host, settings.pigpio.port) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                log::error!(
                    "pigpio daemon at {}:{} unavailable, GPIO sources disabled: {}",
                    settings.pigpio.host,
                    settings.pigpio.port,
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let mut enable_lines = Vec::new();
    let mut ultrasonic = None;
    if let Some(client) = &client {
        for &gpio in &settings.enable_pins {
            match PigpioOutputPin::new(Arc::clone(client), gpio, PinState::High) {
                Ok(pin) => enable_lines.push(pin),
                Err(e) => log::error!("cannot drive enable GPIO {}: {}", gpio, e),
            }
        }

        for sw in &settings.software_serial {
            let id = &sw.descriptor.id;
            match software_serial::open(sw, Arc::clone(client), Arc::clone(&dispatcher)) {
                Ok(mut source) => {
                    if let Err(e) = workers.spawn(id, move |signal| {
                        source.run(&signal);
                    }) {
                        log::error!("{} | cannot start worker: {}", id, e);
                    }
                }
                Err(e) => log::error!("{} | source disabled: {}", id, e),
            }
        }

        let timer = PulseTimer::new(StdClock, StdDelay);
        let mut array = UltrasonicArray::new(timer, Arc::clone(&dispatcher), settings.ultrasonic_interval);
        for descriptor in &settings.ultrasonic {
            match UltrasonicChannel::open(client, descriptor) {
                Ok(channel) => array.add_channel(channel),
                Err(e) => log::error!("{} | sensor disabled: {}", descriptor.id, e),
            }
        }
        if !array.is_empty() {
            ultrasonic = Some(array);
        }
    }

    if workers.is_empty() && ultrasonic.is_none() {
        log::error!("no source could be started");
        return false;
    }

    match ultrasonic {
        Some(mut array) => array.run(&shutdown),
        None => while shutdown.sleep(Duration::from_secs(1)) {},
    }

    log::info!("shutting down");
    let panicked = workers.shutdown();
    if panicked > 0 {
        log::warn!("{} worker(s) ended in a panic", panicked);
    }
    drop(enable_lines);
    true
}
