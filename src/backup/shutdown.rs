//! Graceful shutdown on SIGINT and SIGTERM.
//!
//! The signals are blocked in every daemon thread and consumed by a dedicated
//! thread, which flips a [`Shutdown`] flag. The backup loop checks the flag
//! between cycles and wakes up from its sleep as soon as it is set, so a
//! running cycle always completes.

use crate::backup::result_error::result::Result;
use nix::sys::signal::{SigSet, Signal};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `timeout` or until triggered, returning whether shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now().checked_add(timeout);
        let mut triggered = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if remaining.is_zero() {
                break;
            }
            triggered = cvar
                .wait_timeout(triggered, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *triggered
    }
}

/// Blocks SIGINT and SIGTERM in the calling thread and starts the thread that waits for them.
///
/// Must run before any other thread is spawned so that every thread inherits
/// the mask; otherwise the default action could still kill the process
/// mid-cycle.
pub fn install_signal_handler(shutdown: Shutdown) -> Result<JoinHandle<()>> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()?;

    let handle = std::thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || match mask.wait() {
            Ok(signal) => {
                info!("Received {}, stopping after the current cycle", signal);
                shutdown.trigger();
            }
            Err(e) => warn!("Waiting for shutdown signals failed: {}", e),
        })?;
    Ok(handle)
}
