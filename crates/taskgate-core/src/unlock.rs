//! Unlock evaluation: completion state, threshold notifications, XP rewards.
//!
//! [`evaluate`] and [`calculate_xp`] are pure. [`UnlockEvaluator`] adds the
//! tracking state that makes each threshold notification fire at most once
//! per focus session.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::task::Task;

/// Default partial-unlock thresholds (percent).
pub const DEFAULT_PARTIAL_UNLOCK_THRESHOLDS: [u8; 2] = [50, 75];

// ============================================================================
// Configuration
// ============================================================================

/// Unlock behaviour configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// End the focus session automatically when every task is complete
    pub auto_unlock_on_complete: bool,

    /// Completion percentages that trigger a partial-unlock notification
    pub partial_unlock_thresholds: Vec<u8>,

    /// Informational only: whether the driver should surface notifications
    pub show_notifications: bool,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            auto_unlock_on_complete: true,
            partial_unlock_thresholds: DEFAULT_PARTIAL_UNLOCK_THRESHOLDS.to_vec(),
            show_notifications: true,
        }
    }
}

impl UnlockConfig {
    /// Sorts and deduplicates thresholds, dropping values outside 1..=100.
    pub fn normalized(mut self) -> Self {
        let thresholds: BTreeSet<u8> = self
            .partial_unlock_thresholds
            .into_iter()
            .filter(|t| (1..=100).contains(t))
            .collect();
        self.partial_unlock_thresholds = thresholds.into_iter().collect();
        self
    }
}

// ============================================================================
// Results and Notifications
// ============================================================================

/// Completion state derived from a task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockConditionResult {
    pub can_unlock: bool,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Rounded to the nearest integer, 0 for an empty list
    pub completion_percentage: u8,
    pub remaining_tasks: usize,
}

/// Kind of unlock notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProgressUpdate,
    PartialUnlock,
    FullUnlock,
}

impl NotificationKind {
    /// Unlock kinds are the ones delivered to the unlock callback.
    pub fn is_unlock(&self) -> bool {
        matches!(self, Self::PartialUnlock | Self::FullUnlock)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ProgressUpdate => "progress_update",
            Self::PartialUnlock => "partial_unlock",
            Self::FullUnlock => "full_unlock",
        };
        write!(f, "{label}")
    }
}

/// A notification produced by one qualifying transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockNotification {
    pub kind: NotificationKind,
    pub message: String,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Set on full unlock
    pub xp_earned: Option<u32>,
    /// Set on partial unlock to the threshold that was crossed
    pub threshold: Option<u8>,
}

// ============================================================================
// Pure Evaluation
// ============================================================================

/// Computes the completion state of a task list.
///
/// Cancelled tasks count toward the total, so they keep the list locked.
pub fn evaluate(tasks: &[Task]) -> UnlockConditionResult {
    let total_tasks = tasks.len();
    let completed_tasks = tasks.iter().filter(|t| t.is_completed()).count();

    let completion_percentage = if total_tasks > 0 {
        (100.0 * completed_tasks as f64 / total_tasks as f64).round() as u8
    } else {
        0
    };

    UnlockConditionResult {
        can_unlock: total_tasks > 0 && completed_tasks == total_tasks,
        completed_tasks,
        total_tasks,
        completion_percentage,
        remaining_tasks: total_tasks - completed_tasks,
    }
}

/// Sums the XP reward over completed tasks.
pub fn calculate_xp(tasks: &[Task]) -> u32 {
    tasks
        .iter()
        .filter(|t| t.is_completed())
        .map(|t| t.difficulty.xp_reward())
        .sum()
}

// ============================================================================
// Stateful Evaluator
// ============================================================================

/// Callback invoked for partial and full unlock notifications.
pub type UnlockCallback = Box<dyn Fn(&UnlockNotification) + Send + Sync>;

/// Tracks completion across calls and emits threshold-gated notifications.
///
/// Not internally synchronized: callers sharing it across threads must
/// serialize access (the engine's controller actor is its single writer).
pub struct UnlockEvaluator {
    config: UnlockConfig,
    previous_completion_percentage: u8,
    notified_thresholds: BTreeSet<u8>,
    callback: Option<UnlockCallback>,
}

impl UnlockEvaluator {
    pub fn new() -> Self {
        Self::with_config(UnlockConfig::default())
    }

    pub fn with_config(config: UnlockConfig) -> Self {
        Self {
            config: config.normalized(),
            previous_completion_percentage: 0,
            notified_thresholds: BTreeSet::new(),
            callback: None,
        }
    }

    pub fn config(&self) -> &UnlockConfig {
        &self.config
    }

    pub fn update_config(&mut self, config: UnlockConfig) {
        self.config = config.normalized();
    }

    pub fn previous_completion_percentage(&self) -> u8 {
        self.previous_completion_percentage
    }

    pub fn notified_thresholds(&self) -> &BTreeSet<u8> {
        &self.notified_thresholds
    }

    /// Replaces the unlock callback.
    pub fn set_unlock_callback(&mut self, callback: UnlockCallback) {
        self.callback = Some(callback);
    }

    pub fn clear_unlock_callback(&mut self) {
        self.callback = None;
    }

    /// Forgets all tracking so thresholds can fire again in a new session.
    pub fn reset_tracking(&mut self) {
        self.previous_completion_percentage = 0;
        self.notified_thresholds.clear();
    }

    /// Processes one observed task-list change.
    ///
    /// Returns at most one notification. Full unlock takes priority over
    /// thresholds, and only the first newly crossed threshold is reported.
    pub fn process(&mut self, tasks: &[Task]) -> Option<UnlockNotification> {
        let result = evaluate(tasks);
        let percentage = result.completion_percentage;

        if result.can_unlock {
            let xp = calculate_xp(tasks);
            let notification = UnlockNotification {
                kind: NotificationKind::FullUnlock,
                message: format!(
                    "All {} tasks complete! Restrictions lifted. +{} XP",
                    result.total_tasks, xp
                ),
                completed_tasks: result.completed_tasks,
                total_tasks: result.total_tasks,
                xp_earned: Some(xp),
                threshold: None,
            };
            self.notify(&notification);
            self.previous_completion_percentage = percentage;
            return Some(notification);
        }

        let crossed = self.config.partial_unlock_thresholds.iter().copied().find(|&t| {
            percentage >= t
                && self.previous_completion_percentage < t
                && !self.notified_thresholds.contains(&t)
        });

        if let Some(threshold) = crossed {
            self.notified_thresholds.insert(threshold);
            let notification = UnlockNotification {
                kind: NotificationKind::PartialUnlock,
                message: format!(
                    "{}% done ({}/{} tasks). {} to go!",
                    threshold, result.completed_tasks, result.total_tasks, result.remaining_tasks
                ),
                completed_tasks: result.completed_tasks,
                total_tasks: result.total_tasks,
                xp_earned: None,
                threshold: Some(threshold),
            };
            self.notify(&notification);
            self.previous_completion_percentage = percentage;
            return Some(notification);
        }

        if percentage != self.previous_completion_percentage {
            debug!(
                from = self.previous_completion_percentage,
                to = percentage,
                "Completion changed"
            );
            self.previous_completion_percentage = percentage;
            return Some(UnlockNotification {
                kind: NotificationKind::ProgressUpdate,
                message: format!(
                    "{}/{} tasks complete ({}%)",
                    result.completed_tasks, result.total_tasks, percentage
                ),
                completed_tasks: result.completed_tasks,
                total_tasks: result.total_tasks,
                xp_earned: None,
                threshold: None,
            });
        }

        None
    }

    fn notify(&self, notification: &UnlockNotification) {
        if let Some(callback) = &self.callback {
            callback(notification);
        }
    }
}

impl Default for UnlockEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnlockEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockEvaluator")
            .field("config", &self.config)
            .field(
                "previous_completion_percentage",
                &self.previous_completion_percentage,
            )
            .field("notified_thresholds", &self.notified_thresholds)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
