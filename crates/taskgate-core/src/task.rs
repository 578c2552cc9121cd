//! Read-only task view consumed by the unlock evaluator.
//!
//! Tasks are owned by the surrounding application; this crate only reads
//! their status and difficulty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

/// Task difficulty, which scales the XP reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Multiplier applied to the base reward of 100 XP.
    pub fn xp_multiplier(&self) -> f64 {
        match self {
            Self::Easy => 0.75,
            Self::Medium => 1.0,
            Self::Hard => 1.5,
        }
    }

    /// XP for completing one task of this difficulty.
    pub fn xp_reward(&self) -> u32 {
        (100.0 * self.xp_multiplier()).round() as u32
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A task as seen by the unlock evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl Task {
    pub fn new(id: impl Into<String>, status: TaskStatus, difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            status,
            difficulty,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xp_rewards() {
        assert_eq!(Difficulty::Easy.xp_reward(), 75);
        assert_eq!(Difficulty::Medium.xp_reward(), 100);
        assert_eq!(Difficulty::Hard.xp_reward(), 150);
    }

    #[test]
    fn test_task_parsing() {
        let task: Task =
            serde_json::from_str(r#"{"id":"t1","status":"completed","difficulty":"hard"}"#)
                .unwrap();
        assert!(task.is_completed());
        assert_eq!(task.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_task_parsing_defaults() {
        let task: Task = serde_json::from_str(r#"{"id":"t2"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.difficulty, Difficulty::Medium);
    }
}
