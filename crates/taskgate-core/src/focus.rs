//! Focus session state machine.
//!
//! `FocusSessionManager` owns the active/inactive session state, the
//! append-only session history, the emergency-unlock cooldown, and the
//! restricted-app list enforced while a session is active.
//!
//! Every time-dependent operation has an `*_at(now)` form taking an explicit
//! instant; the plain form reads the wall clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DomainResult;
use crate::restriction::{RestrictedApp, RestrictionList};

/// Default emergency-unlock cooldown: 30 minutes.
pub const DEFAULT_EMERGENCY_UNLOCK_COOLDOWN_MS: u64 = 30 * 60 * 1000;

/// Milliseconds from `earlier` to `later`, clamped at zero.
fn elapsed_ms(earlier: DateTime<Utc>, later: DateTime<Utc>) -> u64 {
    (later - earlier).num_milliseconds().max(0) as u64
}

// ============================================================================
// Configuration and State
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub emergency_unlock_cooldown_ms: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            emergency_unlock_cooldown_ms: DEFAULT_EMERGENCY_UNLOCK_COOLDOWN_MS,
        }
    }
}

/// Runtime state of focus mode.
///
/// Invariants: inactive implies no `started_at` and zero session time;
/// active implies `started_at` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusModeRuntimeState {
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Refreshed by `tick`
    pub current_session_time_ms: u64,
    pub last_emergency_unlock: Option<DateTime<Utc>>,
    pub emergency_unlock_cooldown_ms: u64,
}

impl FocusModeRuntimeState {
    fn inactive(emergency_unlock_cooldown_ms: u64) -> Self {
        Self {
            is_active: false,
            started_at: None,
            current_session_time_ms: 0,
            last_emergency_unlock: None,
            emergency_unlock_cooldown_ms,
        }
    }
}

/// A completed focus session. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tasks_completed: usize,
    pub was_unlocked_naturally: bool,
}

/// Aggregate statistics over the session history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusStats {
    pub total_sessions: usize,
    pub natural_unlocks: usize,
    pub emergency_unlocks: usize,
    pub total_focus_time_ms: u64,
}

// ============================================================================
// Focus Session Manager
// ============================================================================

#[derive(Debug, Clone)]
pub struct FocusSessionManager {
    config: FocusConfig,
    state: FocusModeRuntimeState,
    history: Vec<FocusSession>,
    total_focus_time_ms: u64,
    emergency_unlocks: usize,
    restrictions: RestrictionList,
}

impl FocusSessionManager {
    /// Creates a manager with the built-in preset restrictions.
    pub fn new(config: FocusConfig) -> Self {
        Self::with_restrictions(config, RestrictionList::with_presets())
    }

    pub fn with_restrictions(config: FocusConfig, restrictions: RestrictionList) -> Self {
        Self {
            state: FocusModeRuntimeState::inactive(config.emergency_unlock_cooldown_ms),
            config,
            history: Vec::new(),
            total_focus_time_ms: 0,
            emergency_unlocks: 0,
            restrictions,
        }
    }

    /// Discards all state, history included.
    pub fn reset(&mut self) {
        self.state = FocusModeRuntimeState::inactive(self.config.emergency_unlock_cooldown_ms);
        self.history.clear();
        self.total_focus_time_ms = 0;
        self.emergency_unlocks = 0;
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    pub fn start(&mut self) {
        self.start_at(Utc::now());
    }

    /// Starts (or re-arms) the session clock.
    pub fn start_at(&mut self, now: DateTime<Utc>) {
        if self.state.is_active {
            debug!("Focus session already active, re-arming clock");
        }
        self.state.is_active = true;
        self.state.started_at = Some(now);
        self.state.current_session_time_ms = 0;
        info!(started_at = %now, "Focus session started");
    }

    pub fn tick(&mut self) -> u64 {
        self.tick_at(Utc::now())
    }

    /// Refreshes `current_session_time_ms` and returns it.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> u64 {
        if let (true, Some(started_at)) = (self.state.is_active, self.state.started_at) {
            self.state.current_session_time_ms = elapsed_ms(started_at, now);
        }
        self.state.current_session_time_ms
    }

    pub fn stop(&mut self, was_natural: bool, tasks_completed: usize) -> Option<FocusSession> {
        self.stop_at(was_natural, tasks_completed, Utc::now())
    }

    /// Closes the session and appends it to history.
    ///
    /// Returns `None` when there is no session to close.
    pub fn stop_at(
        &mut self,
        was_natural: bool,
        tasks_completed: usize,
        now: DateTime<Utc>,
    ) -> Option<FocusSession> {
        let started_at = self.state.started_at?;
        let duration_ms = elapsed_ms(started_at, now);

        let session = FocusSession {
            id: Uuid::new_v4().to_string(),
            started_at,
            ended_at: now,
            duration_ms,
            tasks_completed,
            was_unlocked_naturally: was_natural,
        };

        self.history.push(session.clone());
        self.total_focus_time_ms = self.total_focus_time_ms.saturating_add(duration_ms);

        self.state.is_active = false;
        self.state.started_at = None;
        self.state.current_session_time_ms = 0;

        info!(
            session_id = %session.id,
            duration_ms,
            tasks_completed,
            natural = was_natural,
            "Focus session ended"
        );

        Some(session)
    }

    // ------------------------------------------------------------------------
    // Emergency unlock
    // ------------------------------------------------------------------------

    pub fn can_emergency_unlock(&self) -> bool {
        self.can_emergency_unlock_at(Utc::now())
    }

    pub fn can_emergency_unlock_at(&self, now: DateTime<Utc>) -> bool {
        if !self.state.is_active {
            return false;
        }
        match self.state.last_emergency_unlock {
            None => true,
            Some(last) => elapsed_ms(last, now) >= self.state.emergency_unlock_cooldown_ms,
        }
    }

    pub fn emergency_unlock(&mut self) -> bool {
        self.emergency_unlock_at(Utc::now())
    }

    /// Ends the session without completing tasks, if the cooldown allows it.
    pub fn emergency_unlock_at(&mut self, now: DateTime<Utc>) -> bool {
        if !self.can_emergency_unlock_at(now) {
            debug!(
                active = self.state.is_active,
                remaining_ms = self.cooldown_remaining_ms_at(now),
                "Emergency unlock refused"
            );
            return false;
        }

        self.stop_at(false, 0, now);
        self.state.last_emergency_unlock = Some(now);
        self.emergency_unlocks += 1;
        info!("Emergency unlock used");
        true
    }

    pub fn cooldown_remaining_ms(&self) -> u64 {
        self.cooldown_remaining_ms_at(Utc::now())
    }

    pub fn cooldown_remaining_ms_at(&self, now: DateTime<Utc>) -> u64 {
        match self.state.last_emergency_unlock {
            None => 0,
            Some(last) => self
                .state
                .emergency_unlock_cooldown_ms
                .saturating_sub(elapsed_ms(last, now)),
        }
    }

    // ------------------------------------------------------------------------
    // Restricted apps
    // ------------------------------------------------------------------------

    pub fn restricted_apps(&self) -> &RestrictionList {
        &self.restrictions
    }

    pub fn add_restricted_app(&mut self, app: RestrictedApp) -> DomainResult<()> {
        self.restrictions.add(app)
    }

    pub fn remove_restricted_app(&mut self, id: &str) -> DomainResult<RestrictedApp> {
        self.restrictions.remove(id)
    }

    pub fn toggle_restricted_app(&mut self, id: &str) -> DomainResult<bool> {
        self.restrictions.toggle(id)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn state(&self) -> &FocusModeRuntimeState {
        &self.state
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    /// Completed sessions, oldest first.
    pub fn history(&self) -> &[FocusSession] {
        &self.history
    }

    pub fn total_focus_time_ms(&self) -> u64 {
        self.total_focus_time_ms
    }

    pub fn stats(&self) -> FocusStats {
        FocusStats {
            total_sessions: self.history.len(),
            natural_unlocks: self
                .history
                .iter()
                .filter(|s| s.was_unlocked_naturally)
                .count(),
            emergency_unlocks: self.emergency_unlocks,
            total_focus_time_ms: self.total_focus_time_ms,
        }
    }
}

impl Default for FocusSessionManager {
    fn default() -> Self {
        Self::new(FocusConfig::default())
    }
}
