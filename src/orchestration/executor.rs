//! Executor collaborator interface.
//!
//! The engine never edits code or runs tests itself. Each attempt hands a
//! clone of the task to an [`Executor`] and waits for an
//! [`ExecutorResult`]. Executors must tolerate being called more than once
//! for the same task.

use crate::core::task::Task;
use crate::orchestration::escalation::EscalationRequest;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Outcome of one executor attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub success: bool,
    /// Free text, logged and recorded but never interpreted.
    pub detail: String,
    /// Escalations raised while working on the task.
    #[serde(default)]
    pub escalations: Vec<EscalationRequest>,
}

impl ExecutorResult {
    pub fn success(detail: &str) -> Self {
        Self {
            success: true,
            detail: detail.to_string(),
            escalations: Vec::new(),
        }
    }

    pub fn failure(detail: &str) -> Self {
        Self {
            success: false,
            detail: detail.to_string(),
            escalations: Vec::new(),
        }
    }

    pub fn with_escalation(mut self, request: EscalationRequest) -> Self {
        self.escalations.push(request);
        self
    }

    /// Whether the executor reported a hard blocker.
    pub fn has_blocker(&self) -> bool {
        self.escalations
            .iter()
            .any(|e| e.kind == crate::orchestration::escalation::EscalationKind::Blocker)
    }
}

/// Performs the actual work for a task attempt.
///
/// Any `Fn(Task) -> impl Future<Output = ExecutorResult>` closure that is
/// `Send + Sync` implements this trait.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task) -> BoxFuture<'static, ExecutorResult>;
}

impl<F, Fut> Executor for F
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExecutorResult> + Send + 'static,
{
    fn execute(&self, task: Task) -> BoxFuture<'static, ExecutorResult> {
        Box::pin((self)(task))
    }
}
