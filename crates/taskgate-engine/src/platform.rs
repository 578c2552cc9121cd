//! OS process primitives behind a trait seam.
//!
//! `ProcessControl` is the only place the engine touches the operating
//! system: listing processes, signalling them, and checking liveness.
//! `SystemProcessControl` is the real implementation; tests substitute
//! scripted fakes.
//!
//! All methods perform blocking I/O and should be called via `spawn_blocking`.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use thiserror::Error;
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// A process as reported by the OS, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProcess {
    pub pid: u32,
    /// Short process name (may be truncated by the OS)
    pub name: String,
    /// File name of the executable, when readable
    pub executable: Option<String>,
    /// File name of the first command-line argument, when readable
    pub command: Option<String>,
}

/// Which termination request to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationSignal {
    /// Ask the process to exit cleanly (SIGTERM)
    Graceful,
    /// Compel the process to exit (SIGKILL)
    Forced,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Failure to list processes.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("process listing is not supported on this platform")]
    Unsupported,

    #[error("failed to list processes: {0}")]
    ListFailed(String),
}

/// Failure to deliver a termination signal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The process no longer exists
    #[error("process {0} not found")]
    NotFound(u32),

    /// The caller may not signal this process
    #[error("permission denied for process {0}")]
    PermissionDenied(u32),

    #[error("refusing to signal pid {0}")]
    InvalidPid(u32),

    #[error("{0}")]
    Other(String),
}

/// OS seam for process listing and termination.
pub trait ProcessControl: Send + Sync {
    /// Lists running processes.
    fn list_processes(&self) -> Result<Vec<RawProcess>, ProcessError>;

    /// Sends a termination request to `pid`.
    fn send_signal(&self, pid: u32, signal: TerminationSignal) -> Result<(), SignalError>;

    /// Returns true if `pid` still refers to a live process.
    fn is_running(&self, pid: u32) -> bool;
}

// ============================================================================
// System Implementation
// ============================================================================

/// `ProcessControl` backed by `sysinfo` (listing) and `libc::kill` (signals).
pub struct SystemProcessControl {
    system: Mutex<System>,
}

impl SystemProcessControl {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcessControl {
    fn list_processes(&self) -> Result<Vec<RawProcess>, ProcessError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessError::Unsupported);
        }

        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet),
        );

        let processes: Vec<RawProcess> = system
            .processes()
            .iter()
            .map(|(pid, process)| RawProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                executable: process
                    .exe()
                    .and_then(|path| path.file_name())
                    .map(|name| name.to_string_lossy().into_owned()),
                command: process
                    .cmd()
                    .first()
                    .and_then(|arg| Path::new(arg).file_name())
                    .map(|name| name.to_string_lossy().into_owned()),
            })
            .collect();

        trace!(count = processes.len(), "Listed processes");
        Ok(processes)
    }

    fn send_signal(&self, pid: u32, signal: TerminationSignal) -> Result<(), SignalError> {
        if pid == 0 || pid == std::process::id() {
            return Err(SignalError::InvalidPid(pid));
        }
        send_os_signal(pid, signal)
    }

    #[cfg(unix)]
    fn is_running(&self, pid: u32) -> bool {
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // Signal 0 performs the permission and existence checks only
        let result = unsafe { libc::kill(raw, 0) };
        result == 0 || last_errno() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_running(&self, pid: u32) -> bool {
        let target = sysinfo::Pid::from_u32(pid);
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
        system.process(target).is_some()
    }
}

#[cfg(unix)]
fn last_errno() -> Option<i32> {
    std::io::Error::last_os_error().raw_os_error()
}

#[cfg(unix)]
fn send_os_signal(pid: u32, signal: TerminationSignal) -> Result<(), SignalError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| SignalError::InvalidPid(pid))?;
    let signo = match signal {
        TerminationSignal::Graceful => libc::SIGTERM,
        TerminationSignal::Forced => libc::SIGKILL,
    };

    let result = unsafe { libc::kill(raw, signo) };
    if result == 0 {
        return Ok(());
    }

    match last_errno() {
        Some(libc::ESRCH) => Err(SignalError::NotFound(pid)),
        Some(libc::EPERM) => Err(SignalError::PermissionDenied(pid)),
        _ => Err(SignalError::Other(std::io::Error::last_os_error().to_string())),
    }
}

#[cfg(not(unix))]
fn send_os_signal(pid: u32, signal: TerminationSignal) -> Result<(), SignalError> {
    let target = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

    let process = system.process(target).ok_or(SignalError::NotFound(pid))?;
    let delivered = match signal {
        TerminationSignal::Graceful => process.kill_with(sysinfo::Signal::Term),
        TerminationSignal::Forced => Some(process.kill()),
    };

    match delivered {
        Some(true) => Ok(()),
        Some(false) => Err(SignalError::Other(format!(
            "{signal} termination of process {pid} failed"
        ))),
        None => Err(SignalError::Other(format!(
            "{signal} termination is not supported on this platform"
        ))),
    }
}

// ============================================================================
// Test Double
// ============================================================================

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};

    /// Scripted `ProcessControl` for unit tests.
    ///
    /// Signals are recorded. Each pid may have queued signal outcomes; a
    /// successful signal removes the process unless it is marked stubborn.
    #[derive(Default)]
    pub(crate) struct FakeProcessControl {
        pub processes: Mutex<Vec<RawProcess>>,
        pub outcomes: Mutex<HashMap<u32, VecDeque<Result<(), SignalError>>>>,
        pub stubborn: Mutex<HashSet<u32>>,
        pub signals: Mutex<Vec<(u32, TerminationSignal)>>,
        pub list_error: Mutex<Option<ProcessError>>,
    }

    impl FakeProcessControl {
        pub(crate) fn with_processes(processes: &[(u32, &str)]) -> Self {
            let fake = Self::default();
            *fake.processes.lock().unwrap() = processes
                .iter()
                .map(|(pid, name)| RawProcess {
                    pid: *pid,
                    name: name.to_string(),
                    executable: Some(name.to_string()),
                    command: None,
                })
                .collect();
            fake
        }

        pub(crate) fn push_outcome(&self, pid: u32, outcome: Result<(), SignalError>) {
            self.outcomes
                .lock()
                .unwrap()
                .entry(pid)
                .or_default()
                .push_back(outcome);
        }

        pub(crate) fn signals(&self) -> Vec<(u32, TerminationSignal)> {
            self.signals.lock().unwrap().clone()
        }
    }

    impl ProcessControl for FakeProcessControl {
        fn list_processes(&self) -> Result<Vec<RawProcess>, ProcessError> {
            if let Some(err) = self.list_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self.processes.lock().unwrap().clone())
        }

        fn send_signal(&self, pid: u32, signal: TerminationSignal) -> Result<(), SignalError> {
            self.signals.lock().unwrap().push((pid, signal));
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .get_mut(&pid)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()));

            if outcome.is_ok() && !self.stubborn.lock().unwrap().contains(&pid) {
                self.processes.lock().unwrap().retain(|p| p.pid != pid);
            }
            outcome
        }

        fn is_running(&self, pid: u32) -> bool {
            self.processes.lock().unwrap().iter().any(|p| p.pid == pid)
        }
    }
}
