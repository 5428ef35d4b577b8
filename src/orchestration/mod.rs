//! Orchestration layer for taskwave.
//!
//! This module turns a validated task graph into executed work: the
//! wave planner groups tasks, the dispatcher runs each wave on a bounded
//! executor pool, and the retry policy decides what happens to failures.

pub mod dispatcher;
pub mod escalation;
pub mod executor;
pub mod planner;
pub mod pool;
pub mod retry;

pub use dispatcher::{run, DispatchEvent, Dispatcher, RunSummary};
pub use escalation::{EscalationEvent, EscalationKind, EscalationRequest};
pub use executor::{Executor, ExecutorResult};
pub use planner::{plan, Wave, WavePlanner};
pub use pool::{ExecutorPool, PoolPermit, DEFAULT_HIGH_TIER_CAP, DEFAULT_MAX_CONCURRENCY};
pub use retry::{Decision, FailureKind, RetryCeilings, RetryPolicy, RetryTracker};
