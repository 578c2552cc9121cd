//! Integration tests for the focus controller.
//!
//! These exercise spawn_controller() and the ControllerHandle end to end:
//! session lifecycle, unlock notifications, enforcement through the poller,
//! and restricted-app CRUD.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::sync::Arc;

use common::{wait_until, within, ScriptedProcesses};
use taskgate_core::{
    Difficulty, DomainError, NotificationKind, RestrictedApp, Task, TaskStatus,
};
use taskgate_engine::{spawn_controller, ControllerError, ControllerHandle, EngineConfig, FocusEvent};
use tokio::sync::broadcast;

// ============================================================================
// Test Helpers
// ============================================================================

fn controller(procs: &Arc<ScriptedProcesses>) -> ControllerHandle {
    spawn_controller(&EngineConfig::default(), procs.clone()).expect("default config is valid")
}

fn tasks(completed: usize, total: usize) -> Vec<Task> {
    (0..total)
        .map(|i| {
            let status = if i < completed {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            };
            Task::new(format!("task-{i}"), status, Difficulty::Medium)
        })
        .collect()
}

/// Receives events until one matches `pred`.
async fn next_matching(
    events: &mut broadcast::Receiver<FocusEvent>,
    pred: impl Fn(&FocusEvent) -> bool,
) -> FocusEvent {
    within(async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
}

// ============================================================================
// Session Lifecycle
// ============================================================================

#[tokio::test]
async fn test_start_session_enforces_presets() {
    let procs = Arc::new(ScriptedProcesses::with(&[(42, "steam"), (43, "code")]));
    let handle = controller(&procs);
    let mut events = handle.subscribe();

    assert!(handle.start_session().await.unwrap());
    assert!(matches!(
        within(events.recv()).await.unwrap(),
        FocusEvent::SessionStarted
    ));

    let detected = next_matching(&mut events, |e| matches!(e, FocusEvent::ProcessDetected(_))).await;
    let FocusEvent::ProcessDetected(process) = detected else {
        panic!("expected ProcessDetected");
    };
    assert_eq!(process.pid, 42);

    let terminated =
        next_matching(&mut events, |e| matches!(e, FocusEvent::ProcessTerminated(_))).await;
    let FocusEvent::ProcessTerminated(result) = terminated else {
        panic!("expected ProcessTerminated");
    };
    assert!(result.success);
    assert!(!procs.alive(42));
    assert!(procs.alive(43));

    let snapshot = handle.snapshot().await.unwrap();
    assert!(snapshot.focus.is_active);
    assert!(snapshot.poller_running);
    assert!(snapshot.can_emergency_unlock);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_second_start_rearms_existing_session() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);

    assert!(handle.start_session().await.unwrap());
    assert!(!handle.start_session().await.unwrap());
    assert!(handle.history().await.is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_manual_stop_records_session() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);

    handle.start_session().await.unwrap();
    let session = handle.stop_session().await.unwrap().expect("active session");
    assert!(!session.was_unlocked_naturally);

    assert!(handle.stop_session().await.unwrap().is_none());
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.focus.is_active);
    assert!(!snapshot.poller_running);
    assert_eq!(handle.history().await.len(), 1);

    handle.shutdown().await;
}

// ============================================================================
// Unlock Notifications
// ============================================================================

#[tokio::test]
async fn test_threshold_notifications_then_full_unlock() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);
    let mut events = handle.subscribe();
    handle.start_session().await.unwrap();

    let n = handle.tasks_changed(tasks(1, 4)).await.unwrap().unwrap();
    assert_eq!(n.kind, NotificationKind::ProgressUpdate);

    let n = handle.tasks_changed(tasks(2, 4)).await.unwrap().unwrap();
    assert_eq!(n.kind, NotificationKind::PartialUnlock);
    assert_eq!(n.threshold, Some(50));

    // Unchanged list produces nothing
    assert!(handle.tasks_changed(tasks(2, 4)).await.unwrap().is_none());

    let n = handle.tasks_changed(tasks(3, 4)).await.unwrap().unwrap();
    assert_eq!(n.threshold, Some(75));

    let n = handle.tasks_changed(tasks(4, 4)).await.unwrap().unwrap();
    assert_eq!(n.kind, NotificationKind::FullUnlock);
    assert_eq!(n.xp_earned, Some(400));

    let ended = next_matching(&mut events, |e| matches!(e, FocusEvent::SessionEnded(_))).await;
    let FocusEvent::SessionEnded(session) = ended else {
        panic!("expected SessionEnded");
    };
    assert!(session.was_unlocked_naturally);
    assert_eq!(session.tasks_completed, 4);

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.focus.is_active);
    assert!(!snapshot.poller_running);

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.natural_unlocks, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_processes_survive_after_natural_unlock() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);
    handle.start_session().await.unwrap();
    wait_until("first scan", || procs.list_calls() >= 1).await;

    handle.tasks_changed(tasks(1, 1)).await.unwrap();
    procs.spawn(50, "steam");
    let calls = procs.list_calls();
    tokio::time::sleep(std::time::Duration::from_millis(1800)).await;

    assert!(procs.alive(50));
    assert_eq!(procs.list_calls(), calls, "poller no longer scans");

    handle.shutdown().await;
}

// ============================================================================
// Emergency Unlock
// ============================================================================

#[tokio::test]
async fn test_emergency_unlock_then_cooldown() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);

    assert!(!handle.emergency_unlock().await.unwrap(), "inactive session");

    handle.start_session().await.unwrap();
    assert!(handle.emergency_unlock().await.unwrap());

    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.focus.is_active);
    assert!(!snapshot.poller_running);
    assert!(snapshot.cooldown_remaining_ms > 0);

    handle.start_session().await.unwrap();
    assert!(!handle.emergency_unlock().await.unwrap(), "still cooling down");

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.emergency_unlocks, 1);

    handle.shutdown().await;
}

// ============================================================================
// Restricted App CRUD
// ============================================================================

#[tokio::test]
async fn test_added_app_is_enforced_during_session() {
    let procs = Arc::new(ScriptedProcesses::with(&[(70, "Minecraft.exe")]));
    let handle = controller(&procs);
    handle.start_session().await.unwrap();

    handle
        .add_restricted_app(RestrictedApp::new("mc", "Minecraft", "minecraft"))
        .await
        .unwrap();

    wait_until("minecraft terminated", || !procs.alive(70)).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_toggled_off_app_is_not_enforced() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);

    assert!(!handle.toggle_restricted_app("preset-steam").await.unwrap());
    handle.start_session().await.unwrap();
    procs.spawn(80, "steam");

    wait_until("a few scans", || procs.list_calls() >= 2).await;
    assert!(procs.alive(80));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_crud_errors_surface_as_domain_errors() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);

    let result = handle.remove_restricted_app("preset-discord").await;
    assert!(matches!(
        result,
        Err(ControllerError::Domain(DomainError::PresetNotRemovable { .. }))
    ));

    let result = handle
        .add_restricted_app(RestrictedApp::new("blank", "Blank", "  "))
        .await;
    assert!(matches!(
        result,
        Err(ControllerError::Domain(DomainError::InvalidFieldValue { .. }))
    ));

    let result = handle.toggle_restricted_app("missing").await;
    assert!(matches!(
        result,
        Err(ControllerError::Domain(DomainError::RestrictionNotFound { .. }))
    ));

    handle
        .add_restricted_app(RestrictedApp::new("game", "Game", "game"))
        .await
        .unwrap();
    let removed = handle.remove_restricted_app("game").await.unwrap();
    assert_eq!(removed.id, "game");
    assert!(handle
        .restricted_apps()
        .await
        .iter()
        .all(|app| app.id != "game"));

    handle.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_handle_after_shutdown_reports_channel_closed() {
    let procs = Arc::new(ScriptedProcesses::default());
    let handle = controller(&procs);
    handle.shutdown().await;

    // Give the actor a moment to drop its receiver
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(matches!(
        handle.start_session().await,
        Err(ControllerError::ChannelClosed)
    ));
    assert!(handle.history().await.is_empty());
}
