//! taskgate core - domain types and pure logic for "complete tasks to earn access"
//!
//! This crate holds everything that does not touch the OS or an async runtime:
//! - `process` - process snapshots, termination results, name normalization
//! - `restriction` - restricted apps, the restriction list, and the matcher
//! - `task` - the read-only task view used for unlock evaluation
//! - `unlock` - completion evaluation, threshold tracking, XP rewards
//! - `focus` - the focus session state machine and emergency-unlock cooldown
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod focus;
pub mod process;
pub mod restriction;
pub mod task;
pub mod unlock;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use focus::{
    FocusConfig, FocusModeRuntimeState, FocusSession, FocusSessionManager, FocusStats,
    DEFAULT_EMERGENCY_UNLOCK_COOLDOWN_MS,
};
pub use process::{normalize_executable_name, ProcessInfo, TerminationResult};
pub use restriction::{match_restricted, RestrictedApp, RestrictionList};
pub use task::{Difficulty, Task, TaskStatus};
pub use unlock::{
    calculate_xp, evaluate, NotificationKind, UnlockCallback, UnlockConditionResult,
    UnlockConfig, UnlockEvaluator, UnlockNotification,
};
