//! Wave planner for maximal-parallelism execution.
//!
//! Levels the task graph Kahn-style: wave 0 holds every task without
//! dependencies, and each later wave holds the tasks whose last
//! dependency was placed in the previous one. Members of a wave are
//! listed in input order so identical input always yields identical plans.

use crate::core::dag::TaskGraph;
use crate::core::task::TaskId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A group of mutually independent tasks that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    /// Position in the execution sequence, starting at 0.
    pub index: usize,
    /// Member task ids in input order.
    pub members: Vec<TaskId>,
}

impl Wave {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.members.contains(id)
    }
}

/// Produces the ordered wave sequence for a validated graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavePlanner;

impl WavePlanner {
    pub fn new() -> Self {
        Self
    }

    /// Level `graph` into waves.
    ///
    /// # Errors
    /// Returns `InternalConsistency` if some task can never be placed,
    /// which only happens when graph validation was bypassed.
    pub fn plan(&self, graph: &TaskGraph) -> Result<Vec<Wave>> {
        let mut in_degree = graph.in_degrees();
        let mut placed = vec![false; in_degree.len()];
        let mut current: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut waves = Vec::new();

        while !current.is_empty() {
            current.sort_unstable();
            for &position in &current {
                placed[position] = true;
            }

            let mut next = Vec::new();
            for &position in &current {
                for dependent in graph.dependent_positions(position) {
                    in_degree[dependent] = in_degree[dependent].saturating_sub(1);
                    if in_degree[dependent] == 0 && !placed[dependent] {
                        next.push(dependent);
                    }
                }
            }

            let wave = Wave {
                index: waves.len(),
                members: current
                    .iter()
                    .map(|&p| graph.task_at(p).id.clone())
                    .collect(),
            };
            debug!(wave = wave.index, members = wave.len(), "wave planned");
            waves.push(wave);

            next.dedup();
            current = next;
        }

        if let Some(position) = placed.iter().position(|p| !p) {
            return Err(Error::InternalConsistency(format!(
                "task {} could not be placed in any wave",
                graph.task_at(position).id
            )));
        }

        info!(waves = waves.len(), tasks = graph.task_count(), "wave plan ready");
        Ok(waves)
    }
}

/// Convenience wrapper around [`WavePlanner::plan`].
pub fn plan(graph: &TaskGraph) -> Result<Vec<Wave>> {
    WavePlanner::new().plan(graph)
}
