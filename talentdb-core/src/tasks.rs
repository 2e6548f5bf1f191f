/*!
Cancellable periodic background tasks.

Each task owns a named thread that waits on a condvar with timeout, so
`stop()` takes effect immediately instead of after the current sleep, and
tests can run with millisecond intervals. A failing cycle is logged and
re-armed on a shorter delay; the loop itself never exits on error.
*/

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error};

struct Shared {
    stopped: Mutex<bool>,
    signal: Condvar,
}

/// Handle to a running periodic task. Dropping it stops the task.
pub struct Ticker {
    name: &'static str,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn a named periodic task.
    ///
    /// `interval` paces normal cycles; `error_interval` re-arms the loop
    /// sooner after a failed cycle so a transient problem is retried without
    /// waiting out the full period.
    pub fn spawn<F>(
        name: &'static str,
        interval: Duration,
        error_interval: Duration,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> crate::Result<()> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            signal: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut wait = interval;
                loop {
                    let mut stopped = thread_shared.stopped.lock().unwrap();
                    while !*stopped {
                        let (guard, timeout) = thread_shared
                            .signal
                            .wait_timeout(stopped, wait)
                            .unwrap();
                        stopped = guard;
                        if timeout.timed_out() {
                            break;
                        }
                    }
                    if *stopped {
                        return;
                    }
                    drop(stopped);

                    match tick() {
                        Ok(()) => wait = interval,
                        Err(err) => {
                            error!(task = name, "background task cycle failed: {err}");
                            wait = error_interval;
                        }
                    }
                }
            })
            .expect("failed to spawn background task thread");

        debug!(task = name, ?interval, "background task started");
        Self {
            name,
            shared,
            handle: Some(handle),
        }
    }

    /// Signal the task to stop and wait for its thread to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        *self.shared.stopped.lock().unwrap() = true;
        self.shared.signal.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!(task = self.name, "background task stopped");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
