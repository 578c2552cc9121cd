//! Client interface for interacting with the ControllerActor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ControllerError::ChannelClosed`

use taskgate_core::{
    FocusModeRuntimeState, FocusSession, FocusStats, RestrictedApp, Task, UnlockNotification,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{ControllerCommand, ControllerError, ControllerSnapshot, FocusEvent};

// ============================================================================
// Controller Handle
// ============================================================================

/// Cheap-to-clone handle for the controller actor.
///
/// ```ignore
/// let handle = spawn_controller(&config, control)?;
/// let mut events = handle.subscribe();
///
/// handle.start_session().await?;
/// handle.tasks_changed(tasks).await?;
///
/// while let Ok(event) = events.recv().await {
///     // FocusEvent::ProcessTerminated, FocusEvent::SessionEnded, ...
/// }
/// ```
#[derive(Clone)]
pub struct ControllerHandle {
    sender: mpsc::Sender<ControllerCommand>,
    event_sender: broadcast::Sender<FocusEvent>,
}

impl ControllerHandle {
    pub fn new(
        sender: mpsc::Sender<ControllerCommand>,
        event_sender: broadcast::Sender<FocusEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Subscribe to focus events.
    pub fn subscribe(&self) -> broadcast::Receiver<FocusEvent> {
        self.event_sender.subscribe()
    }

    /// Sends a command built around a fresh oneshot and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> Result<T, ControllerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;

        rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    /// Starts a focus session and the restriction poller.
    ///
    /// Returns `false` if a session was already active (its clock is re-armed).
    pub async fn start_session(&self) -> Result<bool, ControllerError> {
        self.request(|respond_to| ControllerCommand::StartSession { respond_to })
            .await
    }

    /// Feeds a task snapshot to the unlock evaluator.
    pub async fn tasks_changed(
        &self,
        tasks: Vec<Task>,
    ) -> Result<Option<UnlockNotification>, ControllerError> {
        self.request(|respond_to| ControllerCommand::TasksChanged { tasks, respond_to })
            .await
    }

    /// Ends the active session manually. `None` if no session was active.
    pub async fn stop_session(&self) -> Result<Option<FocusSession>, ControllerError> {
        self.request(|respond_to| ControllerCommand::StopSession { respond_to })
            .await
    }

    /// Returns `false` if inactive or still in cooldown.
    pub async fn emergency_unlock(&self) -> Result<bool, ControllerError> {
        self.request(|respond_to| ControllerCommand::EmergencyUnlock { respond_to })
            .await
    }

    pub async fn tick(&self) -> Result<u64, ControllerError> {
        self.request(|respond_to| ControllerCommand::Tick { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<ControllerSnapshot, ControllerError> {
        self.request(|respond_to| ControllerCommand::GetSnapshot { respond_to })
            .await
    }

    pub async fn state(&self) -> Result<FocusModeRuntimeState, ControllerError> {
        Ok(self.snapshot().await?.focus)
    }

    pub async fn cooldown_remaining_ms(&self) -> Result<u64, ControllerError> {
        Ok(self.snapshot().await?.cooldown_remaining_ms)
    }

    /// Session history, oldest first.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn history(&self) -> Vec<FocusSession> {
        self.request(|respond_to| ControllerCommand::GetHistory { respond_to })
            .await
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> Result<FocusStats, ControllerError> {
        self.request(|respond_to| ControllerCommand::GetStats { respond_to })
            .await
    }

    /// Returns an empty vector if communication with the actor fails.
    pub async fn restricted_apps(&self) -> Vec<RestrictedApp> {
        self.request(|respond_to| ControllerCommand::ListRestrictedApps { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Adds a restricted app; a running poller picks it up on its next tick.
    ///
    /// # Errors
    ///
    /// - `ControllerError::Domain` for invalid or duplicate apps
    /// - `ControllerError::ChannelClosed` if the actor has shut down
    pub async fn add_restricted_app(&self, app: RestrictedApp) -> Result<(), ControllerError> {
        self.request(|respond_to| ControllerCommand::AddRestrictedApp { app, respond_to })
            .await?
            .map_err(ControllerError::from)
    }

    pub async fn remove_restricted_app(
        &self,
        id: impl Into<String>,
    ) -> Result<RestrictedApp, ControllerError> {
        let id = id.into();
        self.request(|respond_to| ControllerCommand::RemoveRestrictedApp { id, respond_to })
            .await?
            .map_err(ControllerError::from)
    }

    /// Returns the new enabled state.
    pub async fn toggle_restricted_app(
        &self,
        id: impl Into<String>,
    ) -> Result<bool, ControllerError> {
        let id = id.into();
        self.request(|respond_to| ControllerCommand::ToggleRestrictedApp { id, respond_to })
            .await?
            .map_err(ControllerError::from)
    }

    /// Stops the poller and the actor. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self
            .request(|respond_to| ControllerCommand::Shutdown { respond_to })
            .await;
    }
}
