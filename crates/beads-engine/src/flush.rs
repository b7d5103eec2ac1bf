//! Debounced, coalescing flush scheduler.
//!
//! After any mutating operation the caller arms the scheduler; calls
//! inside the debounce window reset the timer, so a burst of writes
//! produces one flush after quiescence. Flushes run sequentially on a
//! single worker thread. A failed flush re-arms itself with exponential
//! backoff; a success resets the backoff.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Error type flush callbacks may return.
pub type FlushError = Box<dyn std::error::Error + Send + Sync>;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// First retry delay after a failed flush.
pub const RETRY_INITIAL: Duration = Duration::from_secs(5);

/// Retry delay ceiling.
pub const RETRY_MAX: Duration = Duration::from_secs(120);

struct State {
    /// When the next flush fires; `None` means idle.
    deadline: Option<Instant>,
    /// Next retry delay; doubles per failure, resets on success.
    backoff: Duration,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
}

/// Debounced flush timer with a dedicated worker thread.
pub struct FlushScheduler {
    shared: Arc<Shared>,
    debounce: Duration,
    worker: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Creates a scheduler with production timing.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() -> Result<(), FlushError> + Send + Sync + 'static,
    {
        Self::with_timing(DEFAULT_DEBOUNCE, RETRY_INITIAL, RETRY_MAX, callback)
    }

    /// Creates a scheduler with explicit timing (tests, hosts with
    /// different quiescence expectations).
    pub fn with_timing<F>(
        debounce: Duration,
        retry_initial: Duration,
        retry_max: Duration,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Result<(), FlushError> + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                deadline: None,
                backoff: retry_initial,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            worker_loop(&worker_shared, &callback, retry_initial, retry_max);
        });

        Self {
            shared,
            debounce,
            worker: Some(worker),
        }
    }

    /// Marks the store dirty: arms the timer, or pushes an armed timer
    /// out to a fresh debounce window (coalescing).
    pub fn notify(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.deadline = Some(Instant::now() + self.debounce);
            self.shared.cv.notify_all();
        }
    }

    /// Drops any pending timer without firing. Used on cancellation.
    pub fn cancel_pending(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.deadline = None;
            self.shared.cv.notify_all();
        }
    }

    /// Stops the worker. Pending timers are dropped without firing; an
    /// in-flight flush completes first.
    pub fn shutdown(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.shutdown = true;
            state.deadline = None;
            self.shared.cv.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop<F>(shared: &Shared, callback: &F, retry_initial: Duration, retry_max: Duration)
where
    F: Fn() -> Result<(), FlushError>,
{
    let Ok(mut state) = shared.state.lock() else {
        return;
    };

    loop {
        if state.shutdown {
            return;
        }

        match state.deadline {
            None => {
                state = match shared.cv.wait(state) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    state = match shared.cv.wait_timeout(state, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(_) => return,
                    };
                    continue;
                }

                // Fire. The lock is released while the callback runs so
                // notify() keeps working; a second firing waits here.
                state.deadline = None;
                drop(state);
                let result = callback();
                state = match shared.state.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };

                match result {
                    Ok(()) => {
                        debug!("flush completed");
                        state.backoff = retry_initial;
                    }
                    Err(e) => {
                        warn!(error = %e, backoff = ?state.backoff, "flush failed, retrying");
                        let retry_at = Instant::now() + state.backoff;
                        // Keep whichever fires first: an already-armed
                        // notify or the retry.
                        state.deadline = Some(match state.deadline {
                            Some(existing) => existing.min(retry_at),
                            None => retry_at,
                        });
                        state.backoff = (state.backoff * 2).min(retry_max);
                    }
                }
            }
        }
    }
}
