//! Restriction poller - periodically scans, matches, and terminates.
//!
//! The poller is a two-state machine (Idle / Running). While running it owns
//! a tokio task that performs one tick at a time:
//!
//! ```text
//! scan (spawn_blocking) ─▶ match ─▶ for each match, in scan order:
//!                                      on_detected ─▶ terminate (spawn_blocking) ─▶ on_terminated
//!          ▲                                                                          │
//!          └──────────────── wait poll_interval (or cancellation) ◀──────────────────┘
//! ```
//!
//! The interval is measured from tick completion, so ticks never overlap and
//! a slow termination simply delays the next scan.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Join errors and OS-call timeouts become empty scans or failed results
//!
//! # Cancellation
//!
//! Each termination runs with a child of the poll task's cancellation token.
//! The child is cancelled when the call times out or the poller stops, and a
//! cancelled terminator never sends its forced request.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use taskgate_core::{match_restricted, ProcessInfo, RestrictedApp, TerminationResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::platform::ProcessControl;
use crate::scanner::ProcessScanner;
use crate::terminator::{ProcessTerminator, DEFAULT_GRACEFUL_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Default delay between the end of one tick and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Lower bound enforced by [`RestrictionPoller::set_poll_interval`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default bound on a single scan or termination call.
pub const DEFAULT_OS_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Headroom the OS-call bound keeps over the graceful timeout.
pub const OS_CALL_MARGIN: Duration = Duration::from_secs(1);

/// How long a timed-out termination gets to observe its cancellation.
const ABANDON_WAIT: Duration = Duration::from_millis(200);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub graceful_termination_first: bool,
    /// Grace period after a graceful request before escalating
    pub graceful_timeout: Duration,
    /// Bound on each blocking OS call
    pub os_call_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            graceful_termination_first: true,
            graceful_timeout: DEFAULT_GRACEFUL_TIMEOUT,
            os_call_timeout: DEFAULT_OS_CALL_TIMEOUT,
        }
    }
}

impl PollerConfig {
    /// Clamps the poll interval and keeps the OS-call bound at least
    /// [`OS_CALL_MARGIN`] longer than the graceful timeout.
    pub fn normalized(mut self) -> Self {
        self.poll_interval = clamp_poll_interval(self.poll_interval);
        self.os_call_timeout = self
            .os_call_timeout
            .max(self.graceful_timeout.saturating_add(OS_CALL_MARGIN));
        self
    }
}

/// Clamps a poll interval to [`MIN_POLL_INTERVAL`].
pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.max(MIN_POLL_INTERVAL)
}

// ============================================================================
// Callbacks
// ============================================================================

/// Invoked for each matched process before termination is attempted.
pub type DetectedCallback = Arc<dyn Fn(&ProcessInfo) + Send + Sync>;

/// Invoked with the outcome of each termination attempt.
pub type TerminatedCallback = Arc<dyn Fn(&TerminationResult) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_detected: Option<DetectedCallback>,
    on_terminated: Option<TerminatedCallback>,
}

type SharedCallbacks = Arc<Mutex<Callbacks>>;

fn detected_callback(callbacks: &SharedCallbacks) -> Option<DetectedCallback> {
    callbacks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .on_detected
        .clone()
}

fn terminated_callback(callbacks: &SharedCallbacks) -> Option<TerminatedCallback> {
    callbacks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .on_terminated
        .clone()
}

// ============================================================================
// Restriction Poller
// ============================================================================

struct RunningPoll {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cancellable repeating scan-match-terminate loop.
///
/// Callbacks run on the poll task; they must not block for long, since the
/// next tick waits for them.
pub struct RestrictionPoller {
    control: Arc<dyn ProcessControl>,
    config: watch::Sender<PollerConfig>,
    restrictions: watch::Sender<Vec<RestrictedApp>>,
    callbacks: SharedCallbacks,
    running: Option<RunningPoll>,
}

impl RestrictionPoller {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self::with_config(control, PollerConfig::default())
    }

    /// Uses `config` as given. Runtime changes through [`Self::set_config`]
    /// are normalized.
    pub fn with_config(control: Arc<dyn ProcessControl>, config: PollerConfig) -> Self {
        let (config_tx, _) = watch::channel(config);
        let (restrictions_tx, _) = watch::channel(Vec::new());
        Self {
            control,
            config: config_tx,
            restrictions: restrictions_tx,
            callbacks: Arc::default(),
            running: None,
        }
    }

    /// Starts polling. A no-op (with a warning) if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        restricted: Vec<RestrictedApp>,
        on_detected: Option<DetectedCallback>,
        on_terminated: Option<TerminatedCallback>,
    ) {
        if self.is_running() {
            warn!("Restriction poller already running, ignoring start");
            return;
        }

        self.restrictions.send_replace(restricted);
        // Fresh slot per run, so a previous run's in-flight tick never sees these
        self.callbacks = Arc::new(Mutex::new(Callbacks {
            on_detected,
            on_terminated,
        }));

        let cancel_token = CancellationToken::new();
        let task = PollTask {
            scanner: ProcessScanner::new(Arc::clone(&self.control)),
            control: Arc::clone(&self.control),
            config: self.config.subscribe(),
            restrictions: self.restrictions.subscribe(),
            callbacks: Arc::clone(&self.callbacks),
            cancel_token: cancel_token.clone(),
        };

        let config = *self.config.borrow();
        info!(
            interval_ms = config.poll_interval.as_millis() as u64,
            graceful_first = config.graceful_termination_first,
            restrictions = self.restrictions.borrow().len(),
            "Restriction poller started"
        );

        self.running = Some(RunningPoll {
            cancel_token,
            handle: tokio::spawn(task.run()),
        });
    }

    /// Stops polling and clears the callbacks. Safe to call when idle.
    ///
    /// A scheduled tick is cancelled immediately. A tick already in flight
    /// may finish its current termination call, but fires no further
    /// callbacks and schedules nothing afterwards.
    pub fn stop(&mut self) -> Option<JoinHandle<()>> {
        {
            let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
            callbacks.on_detected = None;
            callbacks.on_terminated = None;
        }

        let running = self.running.take()?;
        running.cancel_token.cancel();
        info!("Restriction poller stopped");
        Some(running.handle)
    }

    /// Stops polling and waits for the poll task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.stop() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Poll task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Publishes a new restriction snapshot, read at the start of each tick.
    pub fn update_restrictions(&self, restricted: Vec<RestrictedApp>) {
        debug!(count = restricted.len(), "Restriction snapshot updated");
        self.restrictions.send_replace(restricted);
    }

    pub fn restrictions(&self) -> Vec<RestrictedApp> {
        self.restrictions.borrow().clone()
    }

    pub fn config(&self) -> PollerConfig {
        *self.config.borrow()
    }

    /// Replaces the config after [`PollerConfig::normalized`].
    pub fn set_config(&self, config: PollerConfig) {
        self.config.send_replace(config.normalized());
    }

    /// Sets the poll interval in milliseconds, clamped to at least 500 ms.
    pub fn set_poll_interval(&self, interval_ms: u64) {
        let interval = clamp_poll_interval(Duration::from_millis(interval_ms));
        self.config.send_modify(|config| config.poll_interval = interval);
    }

    pub fn set_graceful_termination_first(&self, graceful_first: bool) {
        self.config
            .send_modify(|config| config.graceful_termination_first = graceful_first);
    }
}

impl Drop for RestrictionPoller {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel_token.cancel();
        }
    }
}

// ============================================================================
// Poll Task
// ============================================================================

struct PollTask {
    scanner: ProcessScanner,
    control: Arc<dyn ProcessControl>,
    config: watch::Receiver<PollerConfig>,
    restrictions: watch::Receiver<Vec<RestrictedApp>>,
    callbacks: SharedCallbacks,
    cancel_token: CancellationToken,
}

impl PollTask {
    async fn run(self) {
        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }

            self.tick().await;

            let interval = self.config.borrow().poll_interval;
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }

        debug!("Poll task completed");
    }

    async fn tick(&self) {
        let config = *self.config.borrow();

        let running = self.scan(config.os_call_timeout).await;
        let restricted = self.restrictions.borrow().clone();
        let matched = match_restricted(&running, &restricted);

        if matched.is_empty() {
            return;
        }
        debug!(count = matched.len(), "Restricted processes detected");

        for process in matched {
            if self.cancel_token.is_cancelled() {
                debug!("Poller stopped mid-tick, skipping remaining matches");
                return;
            }

            if let Some(on_detected) = detected_callback(&self.callbacks) {
                on_detected(&process);
            }

            let result = self.terminate(&process, &config).await;

            if self.cancel_token.is_cancelled() {
                debug!(pid = result.pid, "Poller stopped during termination, dropping result");
                return;
            }

            if let Some(on_terminated) = terminated_callback(&self.callbacks) {
                on_terminated(&result);
            }
        }
    }

    async fn scan(&self, limit: Duration) -> Vec<ProcessInfo> {
        let scanner = self.scanner.clone();
        match timeout(limit, tokio::task::spawn_blocking(move || scanner.scan())).await {
            Ok(Ok(processes)) => processes,
            Ok(Err(e)) => {
                warn!(error = %e, "Scan task panicked");
                Vec::new()
            }
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Process scan timed out");
                Vec::new()
            }
        }
    }

    async fn terminate(&self, process: &ProcessInfo, config: &PollerConfig) -> TerminationResult {
        let call_token = self.cancel_token.child_token();
        let terminator =
            ProcessTerminator::with_graceful_timeout(Arc::clone(&self.control), config.graceful_timeout)
                .with_cancel_token(call_token.clone());
        let pid = process.pid;
        let name = process.display_name.clone();
        let graceful_first = config.graceful_termination_first;

        let mut call =
            tokio::task::spawn_blocking(move || terminator.terminate(pid, &name, graceful_first));
        let outcome = timeout(config.os_call_timeout, &mut call).await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Termination task panicked");
                TerminationResult::failed(pid, &process.display_name, format!("termination task failed: {e}"))
            }
            Err(_) => {
                warn!(pid, "Termination timed out");
                call_token.cancel();
                if timeout(ABANDON_WAIT, call).await.is_err() {
                    warn!(pid, "Abandoned termination still blocked in an OS call");
                }
                TerminationResult::failed(
                    pid,
                    &process.display_name,
                    format!("termination timed out after {}ms", config.os_call_timeout.as_millis()),
                )
            }
        }
    }
}
