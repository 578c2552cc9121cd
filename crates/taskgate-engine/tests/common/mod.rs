//! Shared test double for integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use taskgate_engine::platform::{
    ProcessControl, ProcessError, RawProcess, SignalError, TerminationSignal,
};
use tokio::time::{sleep, timeout};

/// An OS call observed by [`ScriptedProcesses`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEvent {
    List,
    SignalStarted,
    SignalFinished,
}

/// In-memory process table.
///
/// A successful signal removes the process. Queued outcomes override the
/// default success for a pid, one signal at a time.
#[derive(Default)]
pub struct ScriptedProcesses {
    signal_delay: Mutex<Duration>,
    timeline: Mutex<Vec<(Instant, CallEvent)>>,
    processes: Mutex<Vec<RawProcess>>,
    outcomes: Mutex<HashMap<u32, VecDeque<Result<(), SignalError>>>>,
    stubborn: Mutex<HashSet<u32>>,
    signals: Mutex<Vec<(u32, TerminationSignal)>>,
    failing_lists: Mutex<usize>,
    list_calls: Mutex<usize>,
}

impl ScriptedProcesses {
    pub fn with(processes: &[(u32, &str)]) -> Self {
        let scripted = Self::default();
        for (pid, name) in processes {
            scripted.spawn(*pid, name);
        }
        scripted
    }

    pub fn spawn(&self, pid: u32, exe: &str) {
        self.processes.lock().unwrap().push(RawProcess {
            pid,
            name: exe.to_string(),
            executable: Some(exe.to_string()),
            command: None,
        });
    }

    pub fn push_outcome(&self, pid: u32, outcome: Result<(), SignalError>) {
        self.outcomes
            .lock()
            .unwrap()
            .entry(pid)
            .or_default()
            .push_back(outcome);
    }

    pub fn make_stubborn(&self, pid: u32) {
        self.stubborn.lock().unwrap().insert(pid);
    }

    /// The next `count` listings fail.
    pub fn fail_next_lists(&self, count: usize) {
        *self.failing_lists.lock().unwrap() = count;
    }

    pub fn alive(&self, pid: u32) -> bool {
        self.is_running(pid)
    }

    pub fn signals(&self) -> Vec<(u32, TerminationSignal)> {
        self.signals.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    /// Every signal blocks the calling thread for `delay`.
    pub fn set_signal_delay(&self, delay: Duration) {
        *self.signal_delay.lock().unwrap() = delay;
    }

    pub fn timeline(&self) -> Vec<(Instant, CallEvent)> {
        self.timeline.lock().unwrap().clone()
    }

    fn record(&self, event: CallEvent) {
        self.timeline.lock().unwrap().push((Instant::now(), event));
    }
}

impl ProcessControl for ScriptedProcesses {
    fn list_processes(&self) -> Result<Vec<RawProcess>, ProcessError> {
        self.record(CallEvent::List);
        *self.list_calls.lock().unwrap() += 1;

        let mut failing = self.failing_lists.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(ProcessError::ListFailed("scripted failure".into()));
        }
        Ok(self.processes.lock().unwrap().clone())
    }

    fn send_signal(&self, pid: u32, signal: TerminationSignal) -> Result<(), SignalError> {
        self.record(CallEvent::SignalStarted);
        self.signals.lock().unwrap().push((pid, signal));

        let delay = *self.signal_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let exists = self.processes.lock().unwrap().iter().any(|p| p.pid == pid);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get_mut(&pid)
            .and_then(VecDeque::pop_front)
            .unwrap_or(if exists {
                Ok(())
            } else {
                Err(SignalError::NotFound(pid))
            });

        if outcome.is_ok() && !self.stubborn.lock().unwrap().contains(&pid) {
            self.processes.lock().unwrap().retain(|p| p.pid != pid);
        }
        self.record(CallEvent::SignalFinished);
        outcome
    }

    fn is_running(&self, pid: u32) -> bool {
        self.processes.lock().unwrap().iter().any(|p| p.pid == pid)
    }
}

/// Polls `condition` every 10ms until it holds, failing after five seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let result = timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for: {what}");
}

/// Awaits `future`, failing after five seconds.
pub async fn within<T>(future: impl Future<Output = T>) -> T {
    timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
