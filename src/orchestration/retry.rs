//! Retry and escalation policy.
//!
//! Each operation class carries its own retry ceiling. A failed attempt
//! at or below the ceiling is retried; past the ceiling the task is
//! escalated. Failures that signal an engine defect are never retried.

use crate::core::task::{OperationClass, Task, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Default retry ceiling for build-and-test work.
pub const DEFAULT_BUILD_AND_TEST_RETRIES: u32 = 3;
/// Default retry ceiling for review-and-fix loops.
pub const DEFAULT_REVIEW_AND_FIX_RETRIES: u32 = 5;
/// Default retry ceiling for research work.
pub const DEFAULT_RESEARCH_RETRIES: u32 = 2;

/// Retry ceilings per operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryCeilings {
    pub build_and_test: u32,
    pub review_and_fix: u32,
    pub research: u32,
}

impl Default for RetryCeilings {
    fn default() -> Self {
        Self {
            build_and_test: DEFAULT_BUILD_AND_TEST_RETRIES,
            review_and_fix: DEFAULT_REVIEW_AND_FIX_RETRIES,
            research: DEFAULT_RESEARCH_RETRIES,
        }
    }
}

impl RetryCeilings {
    pub fn ceiling(&self, class: OperationClass) -> u32 {
        match class {
            OperationClass::BuildAndTest => self.build_and_test,
            OperationClass::ReviewAndFix => self.review_and_fix,
            OperationClass::Research => self.research,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Put the task back in the current wave's ready queue.
    Retry,
    /// Stop retrying and report the task upward. The run continues.
    Escalate,
    /// Abort the run; the failure points at an engine defect.
    Fail,
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The executor reported failure, timed out or panicked.
    Retryable,
    /// The executor reported a hard blocker; retrying cannot help.
    Blocked,
    /// The engine detected a broken invariant, e.g. a runtime ownership clash.
    Unretryable(String),
}

/// Maps a failed attempt to a [`Decision`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    ceilings: RetryCeilings,
}

impl RetryPolicy {
    pub fn new(ceilings: RetryCeilings) -> Self {
        Self { ceilings }
    }

    pub fn ceilings(&self) -> &RetryCeilings {
        &self.ceilings
    }

    /// Decide what follows a failure of attempt number `attempt` (1-based).
    pub fn decide(&self, task: &Task, attempt: u32, class: OperationClass) -> Decision {
        let ceiling = self.ceilings.ceiling(class);
        let decision = if attempt <= ceiling {
            Decision::Retry
        } else {
            Decision::Escalate
        };
        debug!(
            task = %task.id,
            attempt,
            ceiling,
            class = %class,
            ?decision,
            "retry decision"
        );
        decision
    }

    /// Decide using the task's own operation class and the failure's kind.
    pub fn decide_failure(&self, task: &Task, attempt: u32, failure: &FailureKind) -> Decision {
        match failure {
            FailureKind::Unretryable(_) => Decision::Fail,
            FailureKind::Blocked => Decision::Escalate,
            FailureKind::Retryable => self.decide(task, attempt, task.operation_class),
        }
    }
}

/// Tracks attempt counts per task within a run.
#[derive(Debug, Clone, Default)]
pub struct RetryTracker {
    attempts: HashMap<TaskId, u32>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started for a task; 0 if never started.
    pub fn attempts(&self, task_id: &TaskId) -> u32 {
        self.attempts.get(task_id).copied().unwrap_or(0)
    }

    /// Record the start of a new attempt and return its number.
    pub fn next_attempt(&mut self, task_id: &TaskId) -> u32 {
        let count = self.attempts.entry(task_id.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Total attempts across all tasks.
    pub fn total(&self) -> u32 {
        self.attempts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}
