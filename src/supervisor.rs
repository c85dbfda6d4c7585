// src/supervisor.rs

//! Named worker threads that share one shutdown flag.
//!
//! Every acquisition loop polls a [`ShutdownSignal`] and owns its hardware
//! through drop guards, so leaving the loop by any path releases the hardware.
//! [`Supervisor::shutdown`] raises the flag and joins every worker.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::common::timing;

/// Set from the SIGINT/SIGTERM handler. Observed by every `ShutdownSignal`.
static OS_SIGNAL: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_signum: libc::c_int) {
    OS_SIGNAL.store(true, Ordering::SeqCst);
}

/// Routes SIGINT and SIGTERM to the shutdown flag instead of killing the process.
pub fn install_signal_handlers() -> io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let handler = on_terminate as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        let previous = unsafe { libc::signal(signum, handler) };
        if previous == libc::SIG_ERR {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Cloneable cooperative-cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || OS_SIGNAL.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices. Returns `false` if shutdown was requested meanwhile.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(timing::SHUTDOWN_POLL_SLICE));
        }
    }
}

/// Owns the background acquisition threads.
#[derive(Debug, Default)]
pub struct Supervisor {
    shutdown: ShutdownSignal,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Supervisor { shutdown, workers: Vec::new() }
    }

    pub fn signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Runs `task` on a named thread. The task receives its own clone of the shutdown signal.
    pub fn spawn<F>(&mut self, name: &str, task: F) -> io::Result<()>
    where
        F: FnOnce(ShutdownSignal) + Send + 'static,
    {
        let signal = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || task(signal))?;
        log::debug!("started worker {}", name);
        self.workers.push((name.to_owned(), handle));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Raises the flag and joins every worker. A worker panic is logged, not propagated.
    /// Returns how many workers panicked.
    pub fn shutdown(self) -> usize {
        self.shutdown.request();
        let mut panicked = 0;
        for (name, handle) in self.workers {
            match handle.join() {
                Ok(()) => log::debug!("worker {} stopped", name),
                Err(_) => {
                    panicked += 1;
                    log::error!("worker {} panicked", name);
                }
            }
        }
        panicked
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_sleep_returns_early_on_shutdown() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.request();
        });
        let start = Instant::now();
        assert!(!signal.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn test_sleep_completes_without_shutdown() {
        let signal = ShutdownSignal::new();
        assert!(signal.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_shutdown_joins_all_workers() {
        let mut supervisor = Supervisor::new(ShutdownSignal::new());
        let stopped = Arc::new(AtomicUsize::new(0));
        for i in 0..3 {
            let stopped = Arc::clone(&stopped);
            supervisor
                .spawn(&format!("worker-{}", i), move |signal| {
                    while signal.sleep(Duration::from_millis(5)) {}
                    stopped.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(supervisor.len(), 3);
        assert_eq!(supervisor.shutdown(), 0);
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_worker_panic_is_contained() {
        let mut supervisor = Supervisor::new(ShutdownSignal::new());
        supervisor.spawn("doomed", |_| panic!("sensor exploded")).unwrap();
        supervisor
            .spawn("steady", |signal| while signal.sleep(Duration::from_millis(5)) {})
            .unwrap();
        assert_eq!(supervisor.shutdown(), 1);
    }
}
