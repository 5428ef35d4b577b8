//! Task data model for the execution graph.
//!
//! Tasks are the atomic units of work handed to executors. Each task
//! declares the files it exclusively writes, the tasks it waits on, and a
//! five-dimension complexity estimate used for tier routing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Unique identifier for a task within a run.
///
/// Supplied by the task source and stable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task status in its lifecycle.
///
/// ```text
/// pending -> ready -> in_progress -> completed
///                         |
///                         v
///                      failed -> ready (retry) | blocked | cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created at graph build time; dependencies not yet complete.
    #[default]
    Pending,
    /// All dependencies completed; waiting for an executor slot.
    Ready,
    /// Claimed by the dispatcher and running on an executor.
    InProgress,
    /// Retries exhausted; awaiting escalation. Terminal within a run.
    Blocked,
    /// Finished successfully.
    Completed,
    /// The last attempt failed; a retry decision is pending.
    Failed,
    /// Dropped because the run was cancelled.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states end a task's participation in the current wave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Blocked
        )
    }

    /// Check whether a move from this status to `target` is a legal lifecycle step.
    pub fn can_transition(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (*self, target),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, InProgress)
                | (Ready, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Ready)
                | (Failed, Blocked)
                | (Failed, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal size estimate. Reporting only; never used for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Class of work a task performs; selects the retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    #[default]
    BuildAndTest,
    ReviewAndFix,
    Research,
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationClass::BuildAndTest => write!(f, "build_and_test"),
            OperationClass::ReviewAndFix => write!(f, "review_and_fix"),
            OperationClass::Research => write!(f, "research"),
        }
    }
}

/// Highest value any single complexity dimension may take.
pub const MAX_DIMENSION: u8 = 2;

/// Five complexity dimensions, each in `[0, 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ComplexityDimensions {
    pub ambiguity: u8,
    pub integration: u8,
    pub novelty: u8,
    pub risk: u8,
    pub scale: u8,
}

impl ComplexityDimensions {
    /// Build a validated set of dimensions.
    ///
    /// # Errors
    /// Returns `Error::Validation` if any dimension exceeds [`MAX_DIMENSION`].
    pub fn new(ambiguity: u8, integration: u8, novelty: u8, risk: u8, scale: u8) -> Result<Self> {
        let dims = Self {
            ambiguity,
            integration,
            novelty,
            risk,
            scale,
        };
        dims.validate()?;
        Ok(dims)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("ambiguity", self.ambiguity),
            ("integration", self.integration),
            ("novelty", self.novelty),
            ("risk", self.risk),
            ("scale", self.scale),
        ];
        for (name, value) in named {
            if value > MAX_DIMENSION {
                return Err(Error::Validation(format!(
                    "complexity dimension {} = {} is outside [0, {}]",
                    name, value, MAX_DIMENSION
                )));
            }
        }
        Ok(())
    }

    /// Sum of all five dimensions, in `[0, 10]` for validated input.
    ///
    /// Saturates at `u8::MAX` for unvalidated input.
    pub fn total(&self) -> u8 {
        [self.integration, self.novelty, self.risk, self.scale]
            .into_iter()
            .fold(self.ambiguity, u8::saturating_add)
    }
}

/// A single unit of work in the task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Short human-readable title. Not interpreted.
    pub title: String,
    /// Free-text description. Not interpreted.
    #[serde(default)]
    pub description: String,
    /// Files this task is the exclusive writer of.
    #[serde(default)]
    pub owned_files: BTreeSet<PathBuf>,
    /// Tasks that must complete before this one becomes ready.
    #[serde(default)]
    pub blocked_by: BTreeSet<TaskId>,
    #[serde(default)]
    pub size: TaskSize,
    #[serde(default)]
    pub complexity: ComplexityDimensions,
    #[serde(default)]
    pub operation_class: OperationClass,
    /// Current lifecycle status. Reset to pending when the graph is built.
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    /// Create a new pending task with no files, dependencies or complexity.
    pub fn new(id: impl Into<TaskId>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: title.to_string(),
            description: String::new(),
            owned_files: BTreeSet::new(),
            blocked_by: BTreeSet::new(),
            size: TaskSize::default(),
            complexity: ComplexityDimensions::default(),
            operation_class: OperationClass::default(),
            status: TaskStatus::Pending,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Declare exclusive ownership of a file.
    pub fn owns(mut self, path: impl Into<PathBuf>) -> Self {
        self.owned_files.insert(path.into());
        self
    }

    /// Declare a dependency on another task.
    pub fn blocked_by(mut self, id: impl Into<TaskId>) -> Self {
        self.blocked_by.insert(id.into());
        self
    }

    pub fn with_size(mut self, size: TaskSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityDimensions) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_operation_class(mut self, class: OperationClass) -> Self {
        self.operation_class = class;
        self
    }

    /// Files owned by both this task and `other`.
    pub fn shared_files(&self, other: &Task) -> BTreeSet<PathBuf> {
        self.owned_files
            .intersection(&other.owned_files)
            .cloned()
            .collect()
    }

    /// Move to `target`, enforcing the lifecycle table.
    ///
    /// # Errors
    /// Returns `Error::InvalidStatusTransition` for an illegal move.
    pub fn transition(&mut self, target: TaskStatus) -> Result<TaskStatus> {
        let from = self.status;
        if !from.can_transition(target) {
            return Err(Error::InvalidStatusTransition {
                task: self.id.clone(),
                from,
                to: target,
            });
        }
        self.status = target;
        Ok(from)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
