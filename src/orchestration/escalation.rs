//! Escalation events.
//!
//! Escalations report a task upward without aborting the run. They come
//! from two places: the retry policy when a task exhausts its budget, and
//! executors that flag cross-domain work or a hard blocker.

use crate::core::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a task was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    /// The task needs work outside its owned files or domain.
    CrossDomain,
    /// The executor cannot proceed without outside help.
    Blocker,
    /// The retry budget for the task's operation class ran out.
    RetriesExhausted,
}

impl std::fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationKind::CrossDomain => write!(f, "cross_domain"),
            EscalationKind::Blocker => write!(f, "blocker"),
            EscalationKind::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}

/// An escalation raised by an executor for the task it was running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub kind: EscalationKind,
    /// Who should handle it, e.g. another domain's owner. `None` means the caller.
    pub target: Option<String>,
    pub message: String,
}

impl EscalationRequest {
    pub fn cross_domain(target: &str, message: &str) -> Self {
        Self {
            kind: EscalationKind::CrossDomain,
            target: Some(target.to_string()),
            message: message.to_string(),
        }
    }

    pub fn blocker(message: &str) -> Self {
        Self {
            kind: EscalationKind::Blocker,
            target: None,
            message: message.to_string(),
        }
    }
}

/// A recorded escalation, as reported in the ledger and the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub from_task: TaskId,
    pub target: Option<String>,
    pub kind: EscalationKind,
    pub message: String,
    /// Attempt during which the escalation was raised.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl EscalationEvent {
    pub fn from_request(task: &TaskId, attempt: u32, request: EscalationRequest) -> Self {
        Self {
            from_task: task.clone(),
            target: request.target,
            kind: request.kind,
            message: request.message,
            attempt,
            timestamp: Utc::now(),
        }
    }

    pub fn retries_exhausted(task: &TaskId, attempt: u32, message: String) -> Self {
        Self {
            from_task: task.clone(),
            target: None,
            kind: EscalationKind::RetriesExhausted,
            message,
            attempt,
            timestamp: Utc::now(),
        }
    }
}
