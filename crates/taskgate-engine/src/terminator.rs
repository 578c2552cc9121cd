//! Process termination with graceful-then-forced escalation.
//!
//! A graceful request counts as failed if it cannot be delivered or the
//! process is still alive when the grace period ends; the terminator then
//! issues exactly one forced request. The returned result reflects only the
//! last attempt. A process that has already vanished counts as terminated.
//!
//! A terminator may carry a [`CancellationToken`]. Once it is cancelled the
//! grace period ends early and no forced request is sent, so a call its
//! caller has stopped waiting for never escalates on its own.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskgate_core::TerminationResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::{ProcessControl, SignalError, TerminationSignal};

/// Default time a process gets to exit after a graceful request.
pub const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_millis(1000);

/// How often liveness is checked during the grace period.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct ProcessTerminator {
    control: Arc<dyn ProcessControl>,
    graceful_timeout: Duration,
    cancel_token: CancellationToken,
}

impl ProcessTerminator {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self::with_graceful_timeout(control, DEFAULT_GRACEFUL_TIMEOUT)
    }

    pub fn with_graceful_timeout(control: Arc<dyn ProcessControl>, graceful_timeout: Duration) -> Self {
        Self {
            control,
            graceful_timeout,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Abandons the termination once `cancel_token` is cancelled.
    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn graceful_timeout(&self) -> Duration {
        self.graceful_timeout
    }

    /// Terminates `pid`, escalating to a forced request if needed.
    ///
    /// Blocking: call via `spawn_blocking`.
    pub fn terminate(&self, pid: u32, display_name: &str, graceful_first: bool) -> TerminationResult {
        if self.cancel_token.is_cancelled() {
            debug!(pid, process = display_name, "Termination cancelled before first request");
            return TerminationResult::failed(pid, display_name, "termination cancelled");
        }

        if graceful_first {
            match self.attempt_graceful(pid) {
                Ok(()) => {
                    info!(pid, process = display_name, "Process exited after graceful request");
                    return TerminationResult::succeeded(pid, display_name);
                }
                Err(reason) => {
                    debug!(pid, process = display_name, reason = %reason, "Graceful termination failed, escalating");
                }
            }
        }

        if self.cancel_token.is_cancelled() {
            debug!(pid, process = display_name, "Termination cancelled, not escalating");
            return TerminationResult::failed(pid, display_name, "termination cancelled");
        }

        match self.attempt_forced(pid) {
            Ok(()) => {
                info!(pid, process = display_name, "Process terminated");
                TerminationResult::succeeded(pid, display_name)
            }
            Err(e) => {
                warn!(pid, process = display_name, error = %e, "Failed to terminate process");
                TerminationResult::failed(pid, display_name, e.to_string())
            }
        }
    }

    fn attempt_graceful(&self, pid: u32) -> Result<(), String> {
        match self.control.send_signal(pid, TerminationSignal::Graceful) {
            Ok(()) => {}
            Err(SignalError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.to_string()),
        }

        let deadline = Instant::now() + self.graceful_timeout;
        loop {
            if !self.control.is_running(pid) {
                return Ok(());
            }
            if self.cancel_token.is_cancelled() {
                return Err("cancelled during grace period".to_string());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(format!(
                    "still running {}ms after graceful request",
                    self.graceful_timeout.as_millis()
                ));
            }
            thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn attempt_forced(&self, pid: u32) -> Result<(), SignalError> {
        match self.control.send_signal(pid, TerminationSignal::Forced) {
            Err(SignalError::NotFound(_)) => {
                debug!(pid, "Process already gone");
                Ok(())
            }
            other => other,
        }
    }
}
