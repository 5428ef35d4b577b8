//! Core domain models for the task orchestration engine.
//!
//! This module contains the task model, the validated dependency graph
//! and the complexity scorer that assigns execution tiers.

pub mod complexity;
pub mod dag;
pub mod task;

pub use complexity::{score, tier_for, Tier};
pub use dag::TaskGraph;
pub use task::{ComplexityDimensions, OperationClass, Task, TaskId, TaskSize, TaskStatus};
