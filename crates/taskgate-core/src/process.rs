//! Process snapshots and termination outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform suffixes stripped from executable names before comparison.
const EXECUTABLE_SUFFIXES: &[&str] = &[".exe"];

/// Normalizes an executable name for exact comparison.
///
/// Trims whitespace, lowercases, and strips a trailing platform suffix
/// such as `.exe`, so `Steam.exe`, `steam` and ` STEAM ` all compare equal.
pub fn normalize_executable_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    EXECUTABLE_SUFFIXES
        .iter()
        .find_map(|suffix| lowered.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or(lowered)
}

/// A running process as seen by one scan.
///
/// Produced fresh on every scan and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// OS process id
    pub pid: u32,

    /// Human-readable name for logs and notifications
    pub display_name: String,

    /// Normalized executable name (see [`normalize_executable_name`])
    pub executable_name: String,
}

impl ProcessInfo {
    /// Creates a process snapshot, normalizing the executable name.
    pub fn new(pid: u32, display_name: impl Into<String>, executable_name: &str) -> Self {
        Self {
            pid,
            display_name: display_name.into(),
            executable_name: normalize_executable_name(executable_name),
        }
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.display_name, self.pid)
    }
}

/// Outcome of one termination attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationResult {
    pub pid: u32,
    pub process_name: String,
    pub success: bool,
    pub error: Option<String>,
}

impl TerminationResult {
    pub fn succeeded(pid: u32, process_name: impl Into<String>) -> Self {
        Self {
            pid,
            process_name: process_name.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(pid: u32, process_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            pid,
            process_name: process_name.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}
