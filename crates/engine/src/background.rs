//! Periodic background flusher.
//!
//! A single named worker thread that runs a tick closure every interval.
//! Stopping wakes the thread immediately and joins it; a tick already in
//! progress runs to completion first.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Thread name of the flusher worker.
pub const FLUSHER_THREAD_NAME: &str = "vecdex-flush";

struct FlusherShared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a running flusher thread. Dropping it stops the thread.
pub struct Flusher {
    shared: Arc<FlusherShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl Flusher {
    /// Spawn the flusher.
    ///
    /// `tick` runs once per `interval`; returning `false` ends the thread.
    pub fn spawn<F>(interval: Duration, tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let shared = Arc::new(FlusherShared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(FLUSHER_THREAD_NAME.to_string())
            .spawn(move || flusher_loop(&worker_shared, interval, tick))?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            interval,
        })
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the thread to exit and join it. Idempotent.
    pub fn stop(&self) {
        {
            let mut stopped = self.shared.stopped.lock();
            *stopped = true;
            self.shared.wake.notify_all();
        }

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Check if the thread has been asked to stop.
    pub fn is_stopped(&self) -> bool {
        *self.shared.stopped.lock()
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn flusher_loop<F>(shared: &FlusherShared, interval: Duration, mut tick: F)
where
    F: FnMut() -> bool,
{
    debug!(target: "vecdex::engine", interval_ms = interval.as_millis() as u64, "Flusher started");
    let mut stopped = shared.stopped.lock();
    loop {
        if *stopped {
            break;
        }
        let timed_out = shared.wake.wait_for(&mut stopped, interval).timed_out();
        if *stopped {
            break;
        }
        if !timed_out {
            // Spurious wakeup
            continue;
        }
        let keep_running = MutexGuard::unlocked(&mut stopped, &mut tick);
        if !keep_running {
            break;
        }
    }
    debug!(target: "vecdex::engine", "Flusher stopped");
}
