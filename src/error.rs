use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};

/// Structural problems found while building the task graph.
///
/// These are reported before any work is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {task} has invalid complexity: {detail}")]
    InvalidComplexity { task: TaskId, detail: String },

    #[error("Task {task} is blocked by unknown task {dependency}")]
    UnknownDependency { task: TaskId, dependency: TaskId },

    #[error("Cyclic dependency: {}", format_path(.path))]
    CyclicDependency { path: Vec<TaskId> },

    #[error("Ownership conflict between {task_a} and {task_b} on {}", format_files(.files))]
    OwnershipConflict {
        task_a: TaskId,
        task_b: TaskId,
        files: BTreeSet<PathBuf>,
    },
}

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_files(files: &BTreeSet<PathBuf>) -> String {
    files
        .iter()
        .map(|f| f.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Executor failed on task {task}: {detail}")]
    ExecutorFailure { task: TaskId, detail: String },

    #[error("Task {task} exhausted its retry budget after {attempts} attempts")]
    EscalationExhausted { task: TaskId, attempts: u32 },

    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    #[error("Invalid status transition for {task} from {from} to {to}")]
    InvalidStatusTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl Error {
    /// Whether this error indicates a defect in the engine rather than in its input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::InternalConsistency(_)
                | Error::InvalidStatusTransition { .. }
                | Error::TaskJoin(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
