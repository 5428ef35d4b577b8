//! Task graph construction and structural validation.
//!
//! `TaskGraph::build` turns a flat task list into a petgraph `DiGraph`
//! with one edge per `blocked_by` entry, pointing from the dependency to
//! the dependent task. Node indices follow input order, which the wave
//! planner relies on for stable tie-breaking.

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, GraphError, Result};
use petgraph::algo::{has_path_connecting, toposort, DfsSpace};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info};

/// DFS marking used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// The validated task dependency graph.
///
/// Structure is fixed once `build` succeeds; only task statuses change
/// afterwards, and only through the dispatcher.
pub struct TaskGraph {
    graph: DiGraph<Task, ()>,
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    /// Build and validate a graph from the task source's flat list.
    ///
    /// Every task starts out `pending` regardless of the status it arrived with.
    ///
    /// # Errors
    /// - `DuplicateTask` if two tasks share an id
    /// - `InvalidComplexity` if a complexity dimension is out of range
    /// - `UnknownDependency` if a `blocked_by` id is not in the input
    /// - `CyclicDependency` with the offending path
    /// - `OwnershipConflict` for unordered tasks that own the same file
    pub fn build(tasks: Vec<Task>) -> std::result::Result<Self, GraphError> {
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut task_index = HashMap::with_capacity(tasks.len());

        for mut task in tasks {
            if task_index.contains_key(&task.id) {
                return Err(GraphError::DuplicateTask(task.id));
            }
            if let Err(err) = task.complexity.validate() {
                let detail = match err {
                    Error::Validation(msg) => msg,
                    other => other.to_string(),
                };
                return Err(GraphError::InvalidComplexity {
                    task: task.id,
                    detail,
                });
            }
            task.status = TaskStatus::Pending;
            let id = task.id.clone();
            let index = graph.add_node(task);
            task_index.insert(id, index);
        }

        let mut edges = Vec::new();
        for index in graph.node_indices() {
            let task = &graph[index];
            for dep in &task.blocked_by {
                let dep_index = task_index.get(dep).ok_or_else(|| {
                    GraphError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }
                })?;
                edges.push((*dep_index, index));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        let dag = Self { graph, task_index };
        dag.detect_cycle()?;
        dag.detect_ownership_conflicts()?;

        info!(
            tasks = dag.task_count(),
            dependencies = dag.dependency_count(),
            "task graph built"
        );
        Ok(dag)
    }

    /// Three-colour DFS along `blocked_by` edges.
    ///
    /// A gray node reached again closes a cycle; the reported path runs from
    /// that node down the current DFS stack.
    fn detect_cycle(&self) -> std::result::Result<(), GraphError> {
        let mut color = vec![Color::White; self.graph.node_count()];

        for root in self.graph.node_indices() {
            if color[root.index()] != Color::White {
                continue;
            }

            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
                vec![(root, self.dependency_indices(root), 0)];
            color[root.index()] = Color::Gray;

            while let Some((node, deps, next)) = stack.last_mut() {
                if *next >= deps.len() {
                    color[node.index()] = Color::Black;
                    stack.pop();
                    continue;
                }
                let dep = deps[*next];
                *next += 1;

                match color[dep.index()] {
                    Color::White => {
                        color[dep.index()] = Color::Gray;
                        let dep_deps = self.dependency_indices(dep);
                        stack.push((dep, dep_deps, 0));
                    }
                    Color::Gray => {
                        let start = stack
                            .iter()
                            .position(|(n, _, _)| *n == dep)
                            .unwrap_or(0);
                        let path = stack[start..]
                            .iter()
                            .map(|(n, _, _)| self.graph[*n].id.clone())
                            .collect();
                        return Err(GraphError::CyclicDependency { path });
                    }
                    Color::Black => {}
                }
            }
        }
        Ok(())
    }

    /// Dependencies of a node in the task's declared `blocked_by` order.
    fn dependency_indices(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph[index]
            .blocked_by
            .iter()
            .filter_map(|id| self.task_index.get(id).copied())
            .collect()
    }

    /// Report the first pair, in input order, of tasks that share an owned
    /// file and have no dependency path between them.
    fn detect_ownership_conflicts(&self) -> std::result::Result<(), GraphError> {
        let mut owners: BTreeMap<&PathBuf, Vec<NodeIndex>> = BTreeMap::new();
        for index in self.graph.node_indices() {
            for file in &self.graph[index].owned_files {
                owners.entry(file).or_default().push(index);
            }
        }

        let mut candidates: BTreeSet<(NodeIndex, NodeIndex)> = BTreeSet::new();
        for indices in owners.values().filter(|v| v.len() > 1) {
            for (i, a) in indices.iter().enumerate() {
                for b in &indices[i + 1..] {
                    candidates.insert((*a, *b));
                }
            }
        }

        let mut space = DfsSpace::new(&self.graph);
        for (a, b) in candidates {
            let ordered = has_path_connecting(&self.graph, a, b, Some(&mut space))
                || has_path_connecting(&self.graph, b, a, Some(&mut space));
            if !ordered {
                let (task_a, task_b) = (&self.graph[a], &self.graph[b]);
                return Err(GraphError::OwnershipConflict {
                    task_a: task_a.id.clone(),
                    task_b: task_b.id.clone(),
                    files: task_a.shared_files(task_b),
                });
            }
        }
        Ok(())
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub(crate) fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        let index = *self.task_index.get(id)?;
        self.graph.node_weight_mut(index)
    }

    /// Apply a status transition, returning the previous status.
    ///
    /// # Errors
    /// `InternalConsistency` for an unknown id, `InvalidStatusTransition`
    /// for an illegal move.
    pub(crate) fn transition(&mut self, id: &TaskId, to: TaskStatus) -> Result<TaskStatus> {
        let task = self
            .get_task_mut(id)
            .ok_or_else(|| Error::InternalConsistency(format!("task {} not in graph", id)))?;
        task.transition(to)
    }

    /// Position of the task in the original input.
    pub fn input_index(&self, id: &TaskId) -> Option<usize> {
        self.task_index.get(id).map(|index| index.index())
    }

    /// Number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges in the graph.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// All tasks in input order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_indices().map(move |index| &self.graph[index])
    }

    /// Check if `to` directly depends on `from`.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        match (self.task_index.get(from), self.task_index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.find_edge(a, b).is_some(),
            _ => false,
        }
    }

    /// Tasks that the given task waits on, in input order.
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors_in_order(id, Direction::Incoming)
    }

    /// Tasks that wait on the given task, in input order.
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors_in_order(id, Direction::Outgoing)
    }

    fn neighbors_in_order(&self, id: &TaskId, direction: Direction) -> Vec<&Task> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(index, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors.into_iter().map(|n| &self.graph[n]).collect()
    }

    /// Every task reachable downstream of `id`, in input order.
    pub fn transitive_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        let Some(&start) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.into_iter()
            .map(|n| self.graph[n].id.clone())
            .collect()
    }

    /// Longest chain of `blocked_by` edges, counted in tasks, root first.
    ///
    /// Ties prefer the chain ending at, and passing through, earlier input
    /// positions so the result is reproducible.
    pub fn critical_path(&self) -> Vec<TaskId> {
        let order = match toposort(&self.graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                debug!(node = ?cycle.node_id(), "critical path requested on cyclic graph");
                return Vec::new();
            }
        };

        let n = self.graph.node_count();
        let mut length = vec![1usize; n];
        let mut prev: Vec<Option<NodeIndex>> = vec![None; n];

        for node in order {
            for dep in self.dependency_indices(node) {
                let candidate = length[dep.index()] + 1;
                let better = candidate > length[node.index()]
                    || (candidate == length[node.index()]
                        && prev[node.index()].is_some_and(|p| dep < p));
                if better {
                    length[node.index()] = candidate;
                    prev[node.index()] = Some(dep);
                }
            }
        }

        let Some(end) = self
            .graph
            .node_indices()
            .max_by(|a, b| length[a.index()].cmp(&length[b.index()]).then(b.cmp(a)))
        else {
            return Vec::new();
        };

        let mut path = vec![self.graph[end].id.clone()];
        let mut cursor = prev[end.index()];
        while let Some(node) = cursor {
            path.push(self.graph[node].id.clone());
            cursor = prev[node.index()];
        }
        path.reverse();
        path
    }

    /// Number of unresolved dependencies per node, indexed by input position.
    pub(crate) fn in_degrees(&self) -> Vec<usize> {
        self.graph
            .node_indices()
            .map(|index| self.dependency_indices(index).len())
            .collect()
    }

    pub(crate) fn task_at(&self, position: usize) -> &Task {
        &self.graph[NodeIndex::new(position)]
    }

    /// Input positions of the direct dependents of the node at `position`.
    pub(crate) fn dependent_positions(&self, position: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(position), Direction::Outgoing)
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out
    }

    /// Snapshot of every task's status, keyed by id.
    pub fn statuses(&self) -> BTreeMap<TaskId, TaskStatus> {
        self.tasks().map(|t| (t.id.clone(), t.status)).collect()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
