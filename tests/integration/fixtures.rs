//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Predefined task sets
//! - A scripted executor with per-task outcomes
//! - A dispatcher harness that captures lifecycle events

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use taskwave::{
    plan, DispatchEvent, Dispatcher, Executor, ExecutorPool, ExecutorResult, RetryPolicy,
    RunLedger, RunSummary, Task, TaskGraph, TaskId,
};

/// Create a test task whose title matches its id.
pub fn test_task(id: &str) -> Task {
    taskwave::log::init_for_tests();
    Task::new(id, &format!("task {}", id))
}

/// Create a task that owns a single file.
pub fn owning(id: &str, file: &str) -> Task {
    test_task(id).owns(file)
}

/// Create a set of predefined independent tasks.
pub fn independent_tasks(count: usize) -> Vec<Task> {
    (0..count).map(|i| test_task(&format!("T{}", i))).collect()
}

/// Create a diamond-shaped task set: A -> {B, C} -> D
///
/// ```text
///     A
///    / \
///   B   C
///    \ /
///     D
/// ```
pub fn diamond_tasks() -> Vec<Task> {
    vec![
        owning("A", "schema.sql"),
        owning("B", "api.rs").blocked_by("A"),
        owning("C", "ui.rs").blocked_by("A"),
        owning("D", "e2e.rs").blocked_by("B").blocked_by("C"),
    ]
}

/// Create a chain of `len` tasks, each blocked by the previous one.
pub fn chain_tasks(len: usize) -> Vec<Task> {
    (0..len)
        .map(|i| {
            let task = test_task(&format!("C{}", i));
            if i == 0 {
                task
            } else {
                task.blocked_by(format!("C{}", i - 1).as_str())
            }
        })
        .collect()
}

#[derive(Default)]
struct ScriptState {
    scripts: Mutex<HashMap<TaskId, VecDeque<ExecutorResult>>>,
    always_fail: Mutex<HashSet<TaskId>>,
    calls: Mutex<HashMap<TaskId, u32>>,
    order: Mutex<Vec<TaskId>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// Executor whose outcomes are scripted per task.
///
/// Unscripted attempts succeed. Every attempt sleeps for `delay` so that
/// concurrent attempts overlap.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<ScriptState>,
    delay: Duration,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue results for the next attempts of `id`.
    pub fn script(self, id: &str, results: Vec<ExecutorResult>) -> Self {
        self.state
            .scripts
            .lock()
            .unwrap()
            .entry(TaskId::from(id))
            .or_default()
            .extend(results);
        self
    }

    /// Fail the first `times` attempts of `id`.
    pub fn fail_times(self, id: &str, times: usize) -> Self {
        let failures = (0..times)
            .map(|n| ExecutorResult::failure(&format!("scripted failure {}", n + 1)))
            .collect();
        self.script(id, failures)
    }

    /// Fail every attempt of `id`.
    pub fn always_fail(self, id: &str) -> Self {
        self.state
            .always_fail
            .lock()
            .unwrap()
            .insert(TaskId::from(id));
        self
    }

    pub fn calls(&self, id: &str) -> u32 {
        self.state
            .calls
            .lock()
            .unwrap()
            .get(&TaskId::from(id))
            .copied()
            .unwrap_or(0)
    }

    /// Task ids in the order attempts started.
    pub fn start_order(&self) -> Vec<TaskId> {
        self.state.order.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    pub fn into_executor(self) -> Arc<dyn Executor> {
        Arc::new(self)
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, task: Task) -> BoxFuture<'static, ExecutorResult> {
        let state = Arc::clone(&self.state);
        let delay = self.delay;
        Box::pin(async move {
            *state.calls.lock().unwrap().entry(task.id.clone()).or_insert(0) += 1;
            state.order.lock().unwrap().push(task.id.clone());
            let now = state.running.fetch_add(1, Ordering::SeqCst) + 1;
            state.peak.fetch_max(now, Ordering::SeqCst);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let scripted = state
                .scripts
                .lock()
                .unwrap()
                .get_mut(&task.id)
                .and_then(VecDeque::pop_front);
            let result = match scripted {
                Some(result) => result,
                None if state.always_fail.lock().unwrap().contains(&task.id) => {
                    ExecutorResult::failure("always fails")
                }
                None => ExecutorResult::success(&format!("{} done", task.id)),
            };

            state.running.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

/// Test harness for dispatcher runs.
pub struct RunHarness {
    pub dispatcher: Dispatcher,
    pub event_rx: mpsc::Receiver<DispatchEvent>,
}

impl RunHarness {
    /// Create a harness with default retry ceilings and a high-tier cap of 1.
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_pool(ExecutorPool::new(max_concurrency, 1).unwrap(), RetryPolicy::default())
    }

    pub fn with_pool(pool: ExecutorPool, policy: RetryPolicy) -> Self {
        let (tx, event_rx) = mpsc::channel(1024);
        let dispatcher =
            Dispatcher::new(pool, policy, Arc::new(RunLedger::new())).with_events(tx);
        Self {
            dispatcher,
            event_rx,
        }
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        self.dispatcher.ledger()
    }

    /// Build, plan and run `tasks`.
    pub async fn run(&self, tasks: Vec<Task>, executor: &ScriptedExecutor) -> RunSummary {
        let graph = TaskGraph::build(tasks).expect("valid task graph");
        let waves = plan(&graph).expect("plan");
        self.dispatcher
            .run(graph, waves, executor.clone().into_executor())
            .await
            .expect("run")
    }

    /// All events emitted so far.
    pub fn drain_events(&mut self) -> Vec<DispatchEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}
