//! Controller actor - owns focus state and drives the restriction poller.
//!
//! The ControllerActor is the single owner of the focus session manager,
//! the unlock evaluator, and the restriction poller. Because it processes
//! commands sequentially, threshold tracking has exactly one writer.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller dropped its receiver)
//! - Event publish failures are ignored (no subscribers)

use std::sync::Arc;

use taskgate_core::{
    evaluate, DomainResult, FocusSession, FocusSessionManager, NotificationKind, ProcessInfo,
    Task, TerminationResult, UnlockEvaluator, UnlockNotification,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::poller::{DetectedCallback, RestrictionPoller, TerminatedCallback};

use super::commands::{ControllerCommand, ControllerSnapshot, FocusEvent};

// ============================================================================
// Controller Actor
// ============================================================================

pub struct ControllerActor {
    /// Command receiver
    receiver: mpsc::Receiver<ControllerCommand>,

    manager: FocusSessionManager,
    evaluator: UnlockEvaluator,
    poller: RestrictionPoller,

    /// Event publisher for subscribers
    event_publisher: broadcast::Sender<FocusEvent>,
}

impl ControllerActor {
    pub fn new(
        receiver: mpsc::Receiver<ControllerCommand>,
        manager: FocusSessionManager,
        evaluator: UnlockEvaluator,
        poller: RestrictionPoller,
        event_publisher: broadcast::Sender<FocusEvent>,
    ) -> Self {
        Self {
            receiver,
            manager,
            evaluator,
            poller,
            event_publisher,
        }
    }

    /// Runs the actor event loop until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("Focus controller starting");

        while let Some(cmd) = self.receiver.recv().await {
            if let ControllerCommand::Shutdown { respond_to } = cmd {
                self.poller.shutdown().await;
                let _ = respond_to.send(());
                break;
            }
            self.handle_command(cmd);
        }

        self.poller.shutdown().await;
        info!(
            sessions = self.manager.history().len(),
            "Focus controller stopped"
        );
    }

    fn handle_command(&mut self, cmd: ControllerCommand) {
        match cmd {
            ControllerCommand::StartSession { respond_to } => {
                let _ = respond_to.send(self.handle_start_session());
            }
            ControllerCommand::TasksChanged { tasks, respond_to } => {
                let _ = respond_to.send(self.handle_tasks_changed(&tasks));
            }
            ControllerCommand::StopSession { respond_to } => {
                let _ = respond_to.send(self.handle_stop_session());
            }
            ControllerCommand::EmergencyUnlock { respond_to } => {
                let _ = respond_to.send(self.handle_emergency_unlock());
            }
            ControllerCommand::Tick { respond_to } => {
                let _ = respond_to.send(self.manager.tick());
            }
            ControllerCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            ControllerCommand::GetHistory { respond_to } => {
                let _ = respond_to.send(self.manager.history().to_vec());
            }
            ControllerCommand::GetStats { respond_to } => {
                let _ = respond_to.send(self.manager.stats());
            }
            ControllerCommand::ListRestrictedApps { respond_to } => {
                let _ = respond_to.send(self.manager.restricted_apps().apps().to_vec());
            }
            ControllerCommand::AddRestrictedApp { app, respond_to } => {
                let result = self.manager.add_restricted_app(app);
                self.after_restriction_change(&result);
                let _ = respond_to.send(result);
            }
            ControllerCommand::RemoveRestrictedApp { id, respond_to } => {
                let result = self.manager.remove_restricted_app(&id);
                self.after_restriction_change(&result);
                let _ = respond_to.send(result);
            }
            ControllerCommand::ToggleRestrictedApp { id, respond_to } => {
                let result = self.manager.toggle_restricted_app(&id);
                self.after_restriction_change(&result);
                let _ = respond_to.send(result);
            }
            ControllerCommand::Shutdown { respond_to } => {
                // Handled in run(); reply anyway so callers never hang
                let _ = respond_to.send(());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_start_session(&mut self) -> bool {
        let fresh = !self.manager.is_active();
        self.manager.start();

        if fresh {
            self.evaluator.reset_tracking();
        }

        // Re-arming a running session only refreshes the snapshot
        if self.poller.is_running() {
            self.poller
                .update_restrictions(self.manager.restricted_apps().enabled());
        } else {
            self.poller.start(
                self.manager.restricted_apps().enabled(),
                Some(self.detected_callback()),
                Some(self.terminated_callback()),
            );
        }

        if fresh {
            self.publish(FocusEvent::SessionStarted);
        }
        fresh
    }

    fn handle_tasks_changed(&mut self, tasks: &[Task]) -> Option<UnlockNotification> {
        let notification = self.evaluator.process(tasks)?;

        debug!(
            kind = %notification.kind,
            completed = notification.completed_tasks,
            total = notification.total_tasks,
            "Unlock notification"
        );
        self.publish(FocusEvent::Notification(notification.clone()));

        if notification.kind == NotificationKind::FullUnlock
            && self.evaluator.config().auto_unlock_on_complete
            && self.manager.is_active()
        {
            let completed = evaluate(tasks).completed_tasks;
            info!(completed, "All tasks complete, ending focus session");
            self.end_session(true, completed);
        }

        Some(notification)
    }

    fn handle_stop_session(&mut self) -> Option<FocusSession> {
        self.end_session(false, 0)
    }

    fn handle_emergency_unlock(&mut self) -> bool {
        if !self.manager.emergency_unlock() {
            return false;
        }

        let _ = self.poller.stop();
        if let Some(session) = self.manager.history().last().cloned() {
            self.publish(FocusEvent::SessionEnded(session));
        }
        true
    }

    fn end_session(&mut self, was_natural: bool, tasks_completed: usize) -> Option<FocusSession> {
        let _ = self.poller.stop();
        let session = self.manager.stop(was_natural, tasks_completed)?;
        self.publish(FocusEvent::SessionEnded(session.clone()));
        Some(session)
    }

    /// Pushes the new enabled snapshot to a running poller.
    fn after_restriction_change<T>(&self, result: &DomainResult<T>) {
        if result.is_ok() && self.poller.is_running() {
            self.poller
                .update_restrictions(self.manager.restricted_apps().enabled());
        }
    }

    fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            focus: self.manager.state().clone(),
            poller_running: self.poller.is_running(),
            can_emergency_unlock: self.manager.can_emergency_unlock(),
            cooldown_remaining_ms: self.manager.cooldown_remaining_ms(),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn publish(&self, event: FocusEvent) {
        // Ignore send error - no subscribers is fine
        let _ = self.event_publisher.send(event);
    }

    fn detected_callback(&self) -> DetectedCallback {
        let publisher = self.event_publisher.clone();
        Arc::new(move |process: &ProcessInfo| {
            let _ = publisher.send(FocusEvent::ProcessDetected(process.clone()));
        })
    }

    fn terminated_callback(&self) -> TerminatedCallback {
        let publisher = self.event_publisher.clone();
        Arc::new(move |result: &TerminationResult| {
            let _ = publisher.send(FocusEvent::ProcessTerminated(result.clone()));
        })
    }
}
