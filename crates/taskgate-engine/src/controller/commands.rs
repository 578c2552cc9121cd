//! Controller actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `ControllerActor`:
//! - `ControllerCommand`: Commands sent to the actor
//! - `ControllerError`: Errors surfaced to handle callers
//! - `FocusEvent`: Events published by the controller for subscribers

use serde::Serialize;
use taskgate_core::{
    DomainError, FocusModeRuntimeState, FocusSession, FocusStats, ProcessInfo, RestrictedApp,
    Task, TerminationResult, UnlockNotification,
};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Controller Commands
// ============================================================================

/// Commands sent to the controller actor.
///
/// Each command that produces a value carries a oneshot channel for the
/// response.
#[derive(Debug)]
pub enum ControllerCommand {
    /// Start a focus session and begin enforcing restrictions.
    ///
    /// Responds `true` if a new session began, `false` if an active
    /// session's clock was re-armed.
    StartSession { respond_to: oneshot::Sender<bool> },

    /// Feed the current task snapshot to the unlock evaluator.
    TasksChanged {
        tasks: Vec<Task>,
        respond_to: oneshot::Sender<Option<UnlockNotification>>,
    },

    /// End the session manually (not a natural unlock).
    StopSession {
        respond_to: oneshot::Sender<Option<FocusSession>>,
    },

    /// Attempt an emergency unlock.
    EmergencyUnlock { respond_to: oneshot::Sender<bool> },

    /// Refresh the elapsed session time.
    Tick { respond_to: oneshot::Sender<u64> },

    GetSnapshot {
        respond_to: oneshot::Sender<ControllerSnapshot>,
    },

    GetHistory {
        respond_to: oneshot::Sender<Vec<FocusSession>>,
    },

    GetStats { respond_to: oneshot::Sender<FocusStats> },

    ListRestrictedApps {
        respond_to: oneshot::Sender<Vec<RestrictedApp>>,
    },

    /// # Errors
    /// - `DomainError::InvalidFieldValue` for an empty executable name
    /// - `DomainError::RestrictionAlreadyExists` for a duplicate id
    AddRestrictedApp {
        app: RestrictedApp,
        respond_to: oneshot::Sender<Result<(), DomainError>>,
    },

    /// # Errors
    /// - `DomainError::PresetNotRemovable` for presets
    /// - `DomainError::RestrictionNotFound` for unknown ids
    RemoveRestrictedApp {
        id: String,
        respond_to: oneshot::Sender<Result<RestrictedApp, DomainError>>,
    },

    ToggleRestrictedApp {
        id: String,
        respond_to: oneshot::Sender<Result<bool, DomainError>>,
    },

    /// Stop the poller and end the actor.
    Shutdown { respond_to: oneshot::Sender<()> },
}

// ============================================================================
// Controller Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum ControllerError {
    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Point-in-time view of the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub focus: FocusModeRuntimeState,
    pub poller_running: bool,
    pub can_emergency_unlock: bool,
    pub cooldown_remaining_ms: u64,
}

// ============================================================================
// Focus Events
// ============================================================================

/// Events published by the controller to subscribers.
#[derive(Debug, Clone)]
pub enum FocusEvent {
    SessionStarted,

    /// A session ended, naturally, manually, or by emergency unlock.
    SessionEnded(FocusSession),

    /// Any notification produced by the unlock evaluator.
    Notification(UnlockNotification),

    /// A restricted process was detected; termination follows.
    ProcessDetected(ProcessInfo),

    ProcessTerminated(TerminationResult),
}

impl FocusEvent {
    /// Returns a short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::SessionEnded(_) => "session_ended",
            Self::Notification(_) => "notification",
            Self::ProcessDetected(_) => "process_detected",
            Self::ProcessTerminated(_) => "process_terminated",
        }
    }
}
