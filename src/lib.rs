//! taskwave: dependency-aware task orchestration.
//!
//! A run goes through four stages:
//!
//! 1. [`TaskGraph::build`] validates tasks (unknown dependencies, cycles,
//!    concurrent writers of the same file).
//! 2. [`plan`] groups tasks into waves of mutually independent work.
//! 3. [`Dispatcher::run`] executes waves on a bounded pool, retrying and
//!    escalating failures.
//! 4. The [`RunLedger`] keeps every status change; the returned
//!    [`RunSummary`] reports outcomes and the critical path.

pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod log;
pub mod orchestration;

pub use config::Config;
pub use core::{
    score, tier_for, ComplexityDimensions, OperationClass, Task, TaskGraph, TaskId, TaskSize,
    TaskStatus, Tier,
};
pub use error::{Error, GraphError, Result};
pub use ledger::{replay, LedgerEntry, LedgerEvent, RunLedger, RunRecord};
pub use orchestration::{
    plan, run, Decision, DispatchEvent, Dispatcher, EscalationEvent, EscalationKind,
    EscalationRequest, Executor, ExecutorPool, ExecutorResult, FailureKind, RetryCeilings,
    RetryPolicy, RunSummary, Wave, WavePlanner,
};
