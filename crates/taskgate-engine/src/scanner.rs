//! Process scanning - lists running processes as normalized snapshots.
//!
//! Scan failures are never fatal: they are logged and reported as an empty
//! list, so the poller simply detects nothing for that tick.

use std::sync::Arc;

use taskgate_core::ProcessInfo;
use tracing::{debug, warn};

use crate::platform::{ProcessControl, RawProcess};

/// Lists running processes through a [`ProcessControl`].
#[derive(Clone)]
pub struct ProcessScanner {
    control: Arc<dyn ProcessControl>,
}

impl ProcessScanner {
    pub fn new(control: Arc<dyn ProcessControl>) -> Self {
        Self { control }
    }

    /// Returns running processes in ascending pid order.
    ///
    /// Executable names are normalized; processes without a usable name are
    /// skipped. Blocking: call via `spawn_blocking`.
    pub fn scan(&self) -> Vec<ProcessInfo> {
        let raw = match self.control.list_processes() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Process scan failed");
                return Vec::new();
            }
        };

        let mut processes: Vec<ProcessInfo> = raw.into_iter().filter_map(to_process_info).collect();
        processes.sort_by_key(|p| p.pid);

        debug!(count = processes.len(), "Scanned processes");
        processes
    }
}

/// Picks the name to match on: the executable file name, then the file name
/// of the first command-line argument, then the OS short name.
///
/// On Linux the short name is cut to 15 bytes and `exe` is unreadable for
/// other users' processes, so a name like `EpicGamesLauncher` only survives
/// through the command line.
fn to_process_info(raw: RawProcess) -> Option<ProcessInfo> {
    let usable = |name: &&str| !name.trim().is_empty();
    let executable = raw
        .executable
        .as_deref()
        .filter(usable)
        .or_else(|| raw.command.as_deref().filter(usable))
        .unwrap_or(&raw.name);

    let info = ProcessInfo::new(raw.pid, raw.name.clone(), executable);
    if info.executable_name.is_empty() {
        return None;
    }
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakeProcessControl;
    use crate::platform::ProcessError;

    #[test]
    fn test_scan_normalizes_and_sorts() {
        let fake = FakeProcessControl::with_processes(&[(30, "Steam.exe"), (10, "BASH")]);
        let scanner = ProcessScanner::new(Arc::new(fake));

        let processes = scanner.scan();
        let names: Vec<_> = processes
            .iter()
            .map(|p| (p.pid, p.executable_name.as_str()))
            .collect();
        assert_eq!(names, vec![(10, "bash"), (30, "steam")]);
        assert_eq!(processes[1].display_name, "Steam.exe");
    }

    #[test]
    fn test_scan_failure_returns_empty() {
        let fake = FakeProcessControl::with_processes(&[(1, "steam")]);
        *fake.list_error.lock().unwrap() = Some(ProcessError::ListFailed("boom".into()));
        let scanner = ProcessScanner::new(Arc::new(fake));
        assert!(scanner.scan().is_empty());
    }

    #[test]
    fn test_executable_preferred_over_truncated_name() {
        let raw = RawProcess {
            pid: 7,
            name: "epicgameslaunc".into(),
            executable: Some("EpicGamesLauncher.exe".into()),
            command: None,
        };
        let info = to_process_info(raw).unwrap();
        assert_eq!(info.executable_name, "epicgameslauncher");
        assert_eq!(info.display_name, "epicgameslaunc");
    }

    #[test]
    fn test_falls_back_to_name_without_executable() {
        let raw = RawProcess {
            pid: 7,
            name: "Discord".into(),
            executable: None,
            command: None,
        };
        assert_eq!(to_process_info(raw).unwrap().executable_name, "discord");
    }

    #[test]
    fn test_skips_nameless_processes() {
        let raw = RawProcess {
            pid: 7,
            name: "  ".into(),
            executable: Some(String::new()),
            command: Some(" ".into()),
        };
        assert!(to_process_info(raw).is_none());
    }

    #[test]
    fn test_command_name_recovers_truncated_short_name() {
        let raw = RawProcess {
            pid: 7,
            name: "EpicGamesLaunch".into(),
            executable: None,
            command: Some("EpicGamesLauncher.exe".into()),
        };
        let info = to_process_info(raw).unwrap();
        assert_eq!(info.executable_name, "epicgameslauncher");

        let presets = taskgate_core::RestrictionList::with_presets().enabled();
        let matched = taskgate_core::match_restricted(&[info], &presets);
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_executable_wins_over_command() {
        let raw = RawProcess {
            pid: 7,
            name: "java".into(),
            executable: Some("java".into()),
            command: Some("minecraft-launcher".into()),
        };
        assert_eq!(to_process_info(raw).unwrap().executable_name, "java");
    }
}
