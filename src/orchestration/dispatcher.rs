//! Dispatcher for wave-by-wave task execution.
//!
//! The Dispatcher walks the planned waves in order. Within a wave it
//! feeds ready tasks to the executor pool up to its capacity, waits for
//! attempts to finish, and applies the retry policy to failures. A wave
//! is only left once every dispatched task reached a terminal status.
//! Every status change is appended to the run ledger before the
//! Dispatcher moves on.

use crate::config::Config;
use crate::core::complexity::{score, Tier};
use crate::core::dag::TaskGraph;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::ledger::{RunLedger, RunRecord};
use crate::orchestration::escalation::EscalationEvent;
use crate::orchestration::executor::{Executor, ExecutorResult};
use crate::orchestration::planner::Wave;
use crate::orchestration::pool::{ExecutorPool, PoolPermit};
use crate::orchestration::retry::{Decision, FailureKind, RetryPolicy, RetryTracker};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events emitted by the dispatcher for run lifecycle changes.
///
/// These let observers follow a run without polling the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    WaveStarted { index: usize, ready: usize },
    WaveFinished { index: usize },
    TaskStarted { task_id: TaskId, attempt: u32, tier: Tier },
    TaskCompleted { task_id: TaskId, attempt: u32 },
    TaskFailed { task_id: TaskId, attempt: u32, detail: String },
    TaskRetrying { task_id: TaskId, next_attempt: u32 },
    /// A task is blocked; `stranded` lists dependents that will stay pending.
    TaskBlocked { task_id: TaskId, stranded: Vec<TaskId> },
    Escalated(EscalationEvent),
    RunCancelled,
    RunFinished,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total_tasks: usize,
    pub completed: usize,
    /// Tasks with at least one failed attempt, whatever their final status.
    ///
    /// Overlaps with `completed`, `blocked` and `cancelled`: a task that
    /// recovered on retry is counted here and in `completed`. No task ends
    /// a run in `failed`, so this is not a final-status count.
    pub tasks_with_failures: usize,
    pub blocked: usize,
    pub cancelled: usize,
    /// Waves in which at least one task was dispatched.
    pub waves_executed: usize,
    pub critical_path: Vec<TaskId>,
    pub escalations: Vec<EscalationEvent>,
    /// Tasks left pending because a dependency never completed.
    pub unreached: Vec<TaskId>,
    pub blocked_tasks: Vec<TaskId>,
    pub total_attempts: u32,
    pub failed_attempts: u32,
    pub statuses: BTreeMap<TaskId, TaskStatus>,
    pub was_cancelled: bool,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// True when every task completed.
    pub fn is_success(&self) -> bool {
        self.completed == self.total_tasks
    }

    pub fn status_of(&self, id: &TaskId) -> Option<TaskStatus> {
        self.statuses.get(id).copied()
    }
}

/// How an attempt ended, before any interpretation.
#[derive(Debug)]
enum AttemptResult {
    Finished(ExecutorResult),
    TimedOut(Duration),
    Panicked(String),
}

#[derive(Debug)]
struct AttemptOutcome {
    task_id: TaskId,
    attempt: u32,
    result: AttemptResult,
    elapsed: Duration,
}

/// What the wave loop does with a task after handling an outcome.
enum Next {
    Requeue(TaskId),
    Done,
}

enum Wake {
    Cancelled,
    Joined(Option<std::result::Result<AttemptOutcome, JoinError>>),
}

/// Mutable bookkeeping for a single run.
#[derive(Default)]
struct RunState {
    tracker: RetryTracker,
    escalations: Vec<EscalationEvent>,
    failed_tasks: BTreeSet<TaskId>,
    failed_attempts: u32,
    /// Owned file -> task currently writing it.
    writers: HashMap<PathBuf, TaskId>,
    cancelled: bool,
}

/// Executes a planned task graph on a bounded executor pool.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use taskwave::{Dispatcher, ExecutorPool, ExecutorResult, RetryPolicy, RunLedger, Task, TaskGraph};
///
/// let graph = TaskGraph::build(vec![Task::new("T1", "model")])?;
/// let waves = taskwave::plan(&graph)?;
/// let dispatcher = Dispatcher::new(ExecutorPool::new(4, 1)?, RetryPolicy::default(), Arc::new(RunLedger::new()));
/// let executor = Arc::new(|task: Task| async move { ExecutorResult::success(&task.title) });
/// let summary = dispatcher.run(graph, waves, executor).await?;
/// ```
pub struct Dispatcher {
    pool: ExecutorPool,
    policy: RetryPolicy,
    ledger: Arc<RunLedger>,
    attempt_timeout: Option<Duration>,
    cancel: CancellationToken,
    event_tx: Option<mpsc::Sender<DispatchEvent>>,
}

impl Dispatcher {
    pub fn new(pool: ExecutorPool, policy: RetryPolicy, ledger: Arc<RunLedger>) -> Self {
        Self {
            pool,
            policy,
            ledger,
            attempt_timeout: None,
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Build a dispatcher from engine configuration.
    ///
    /// The ledger is mirrored to `ledger_path` when one is configured and
    /// kept in memory otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let ledger = match config.ledger_path() {
            Some(path) => RunLedger::with_file(&path)?,
            None => RunLedger::new(),
        };
        let ledger = Arc::new(ledger);
        let pool = ExecutorPool::new(config.max_concurrency, config.high_tier_cap)?;
        let mut dispatcher = Self::new(pool, RetryPolicy::new(config.retry), ledger);
        dispatcher.attempt_timeout = config.attempt_timeout();
        Ok(dispatcher)
    }

    /// Limit how long a single executor attempt may take.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Send lifecycle events to `tx`. The receiver must keep draining it.
    pub fn with_events(mut self, tx: mpsc::Sender<DispatchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Tie this dispatcher's cancellation to a parent token.
    pub fn with_parent_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Token that cancels the run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    pub fn pool(&self) -> &ExecutorPool {
        &self.pool
    }

    /// Execute `waves` over `graph` and report the outcome.
    ///
    /// # Errors
    /// Only for fatal conditions: an inconsistent plan, an illegal status
    /// transition, a runtime ownership clash or a ledger write failure.
    /// Task failures are reported in the summary instead.
    pub async fn run(
        &self,
        mut graph: TaskGraph,
        waves: Vec<Wave>,
        executor: Arc<dyn Executor>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        check_plan(&graph, &waves)?;
        info!(
            run_id = %self.ledger.run_id(),
            tasks = graph.task_count(),
            waves = waves.len(),
            max_concurrency = self.pool.max_concurrency(),
            "run started"
        );

        let mut state = RunState::default();
        let mut waves_executed = 0;

        for wave in &waves {
            if self.cancel.is_cancelled() {
                warn!(wave = wave.index, "run cancelled between waves");
                state.cancelled = true;
                self.emit(DispatchEvent::RunCancelled).await;
                break;
            }

            let ready = self.promote_ready(&mut graph, wave)?;
            if ready.is_empty() {
                debug!(wave = wave.index, "wave has no reachable tasks");
                continue;
            }

            waves_executed += 1;
            info!(wave = wave.index, ready = ready.len(), "wave started");
            self.emit(DispatchEvent::WaveStarted {
                index: wave.index,
                ready: ready.len(),
            })
            .await;

            self.run_wave(&mut graph, &mut state, wave.index, ready, &executor)
                .await?;

            info!(wave = wave.index, "wave finished");
            self.emit(DispatchEvent::WaveFinished { index: wave.index })
                .await;

            if state.cancelled {
                break;
            }
        }

        if state.cancelled {
            self.cancel_remaining(&mut graph, &state)?;
        }

        let summary = self.summarize(&graph, state, waves_executed, started.elapsed());
        info!(
            completed = summary.completed,
            blocked = summary.blocked,
            unreached = summary.unreached.len(),
            cancelled = summary.cancelled,
            "run finished"
        );
        self.emit(DispatchEvent::RunFinished).await;
        Ok(summary)
    }

    /// Move wave members whose dependencies all completed to `ready`.
    fn promote_ready(&self, graph: &mut TaskGraph, wave: &Wave) -> Result<Vec<TaskId>> {
        let mut ready = Vec::with_capacity(wave.len());
        for id in &wave.members {
            let reachable = graph
                .get_dependencies(id)
                .iter()
                .all(|dep| dep.status == TaskStatus::Completed);
            if reachable {
                self.transition(graph, id, TaskStatus::Ready, 0, None, None)?;
                ready.push(id.clone());
            } else {
                debug!(task = %id, "dependency did not complete; task stays pending");
            }
        }
        Ok(ready)
    }

    async fn run_wave(
        &self,
        graph: &mut TaskGraph,
        state: &mut RunState,
        wave_index: usize,
        ready: Vec<TaskId>,
        executor: &Arc<dyn Executor>,
    ) -> Result<()> {
        let mut queue: VecDeque<TaskId> = ready.into();
        let mut in_flight: JoinSet<AttemptOutcome> = JoinSet::new();

        loop {
            if !state.cancelled {
                self.dispatch_ready(graph, state, &mut queue, &mut in_flight, executor)
                    .await?;
            }

            if in_flight.is_empty() {
                if queue.is_empty() || state.cancelled {
                    return Ok(());
                }
                return Err(Error::InternalConsistency(format!(
                    "wave {} has {} ready tasks but nothing running",
                    wave_index,
                    queue.len()
                )));
            }

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !state.cancelled => Wake::Cancelled,
                joined = in_flight.join_next() => Wake::Joined(joined),
            };

            match wake {
                Wake::Cancelled => {
                    warn!(wave = wave_index, in_flight = in_flight.len(), "run cancelled");
                    state.cancelled = true;
                    while let Some(id) = queue.pop_front() {
                        let attempt = state.tracker.attempts(&id);
                        self.transition(
                            graph,
                            &id,
                            TaskStatus::Cancelled,
                            attempt,
                            Some("run cancelled".to_string()),
                            None,
                        )?;
                    }
                    self.emit(DispatchEvent::RunCancelled).await;
                }
                Wake::Joined(None) => {}
                Wake::Joined(Some(joined)) => {
                    let outcome = joined.map_err(|e| Error::TaskJoin(e.to_string()))?;
                    state.writers.retain(|_, writer| writer != &outcome.task_id);
                    if let Next::Requeue(id) = self.handle_outcome(graph, state, outcome).await? {
                        queue.push_back(id);
                    }
                }
            }
        }
    }

    /// Start attempts for queued tasks while the pool has room.
    ///
    /// `High`-tier tasks that hit the tier cap are skipped over, not
    /// waited on, and keep their place at the front of the queue.
    async fn dispatch_ready(
        &self,
        graph: &mut TaskGraph,
        state: &mut RunState,
        queue: &mut VecDeque<TaskId>,
        in_flight: &mut JoinSet<AttemptOutcome>,
        executor: &Arc<dyn Executor>,
    ) -> Result<()> {
        let mut deferred = Vec::new();

        while self.pool.has_capacity() {
            let Some(id) = queue.pop_front() else {
                break;
            };
            let task = graph
                .get_task(&id)
                .cloned()
                .ok_or_else(|| Error::InternalConsistency(format!("task {} not in graph", id)))?;
            let tier = score(&task);

            if !self.pool.can_accept(tier) {
                debug!(
                    task = %id,
                    %tier,
                    active_high_tier = self.pool.active_high_tier(),
                    "tier lane full; deferring"
                );
                deferred.push(id);
                continue;
            }
            let permit = self.pool.try_acquire(tier).ok_or_else(|| {
                Error::InternalConsistency(format!(
                    "pool refused a {} slot it reported free",
                    tier
                ))
            })?;

            self.guard_ownership(state, &task)?;

            let attempt = state.tracker.next_attempt(&id);
            self.transition(graph, &id, TaskStatus::InProgress, attempt, None, None)?;
            for file in &task.owned_files {
                state.writers.insert(file.clone(), id.clone());
            }

            info!(task = %id, attempt, %tier, "task dispatched");
            self.emit(DispatchEvent::TaskStarted {
                task_id: id.clone(),
                attempt,
                tier,
            })
            .await;

            self.spawn_attempt(in_flight, executor, task, attempt, permit);
        }

        for id in deferred.into_iter().rev() {
            queue.push_front(id);
        }
        Ok(())
    }

    /// Refuse to start a task whose files are being written by another.
    ///
    /// Graph validation rules this out, so a hit means the engine is broken.
    fn guard_ownership(&self, state: &RunState, task: &Task) -> Result<()> {
        let clash = task
            .owned_files
            .iter()
            .find_map(|file| state.writers.get(file).map(|writer| (file, writer)));
        let Some((file, writer)) = clash else {
            return Ok(());
        };

        let message = format!(
            "task {} would write {} while {} is running",
            task.id,
            file.display(),
            writer
        );
        let failure = FailureKind::Unretryable(message.clone());
        let attempt = state.tracker.attempts(&task.id) + 1;
        let decision = self.policy.decide_failure(task, attempt, &failure);
        error!(task = %task.id, ?decision, "runtime ownership conflict");
        Err(Error::InternalConsistency(message))
    }

    fn spawn_attempt(
        &self,
        in_flight: &mut JoinSet<AttemptOutcome>,
        executor: &Arc<dyn Executor>,
        task: Task,
        attempt: u32,
        permit: PoolPermit,
    ) {
        let task_id = task.id.clone();
        let timeout = self.attempt_timeout;
        let work = AssertUnwindSafe(executor.execute(task)).catch_unwind();

        in_flight.spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(finished) => attempt_result(finished),
                    Err(_) => AttemptResult::TimedOut(limit),
                },
                None => attempt_result(work.await),
            };
            AttemptOutcome {
                task_id,
                attempt,
                result,
                elapsed: started.elapsed(),
            }
        });
    }

    async fn handle_outcome(
        &self,
        graph: &mut TaskGraph,
        state: &mut RunState,
        outcome: AttemptOutcome,
    ) -> Result<Next> {
        let AttemptOutcome {
            task_id,
            attempt,
            result,
            elapsed,
        } = outcome;
        let elapsed_ms = elapsed.as_millis() as u64;

        let (success, detail, requests, blocker) = match result {
            AttemptResult::Finished(r) => {
                let blocker = r.has_blocker();
                (r.success, r.detail, r.escalations, blocker)
            }
            AttemptResult::TimedOut(limit) => {
                (false, Error::Timeout(limit).to_string(), Vec::new(), false)
            }
            AttemptResult::Panicked(message) => (
                false,
                format!("executor panicked: {}", message),
                Vec::new(),
                false,
            ),
        };
        for request in requests {
            let event = EscalationEvent::from_request(&task_id, attempt, request);
            self.escalate(state, event).await?;
        }

        if success {
            info!(task = %task_id, attempt, elapsed_ms, "task completed");
            self.transition(
                graph,
                &task_id,
                TaskStatus::Completed,
                attempt,
                Some(detail),
                Some(elapsed_ms),
            )?;
            self.emit(DispatchEvent::TaskCompleted { task_id, attempt })
                .await;
            return Ok(Next::Done);
        }

        let failure = Error::ExecutorFailure {
            task: task_id.clone(),
            detail: detail.clone(),
        };
        warn!(attempt, elapsed_ms, "{}", failure);
        state.failed_attempts += 1;
        state.failed_tasks.insert(task_id.clone());
        self.transition(
            graph,
            &task_id,
            TaskStatus::Failed,
            attempt,
            Some(detail.clone()),
            Some(elapsed_ms),
        )?;
        self.emit(DispatchEvent::TaskFailed {
            task_id: task_id.clone(),
            attempt,
            detail,
        })
        .await;

        let kind = if blocker {
            FailureKind::Blocked
        } else {
            FailureKind::Retryable
        };
        let task = graph
            .get_task(&task_id)
            .ok_or_else(|| Error::InternalConsistency(format!("task {} not in graph", task_id)))?;
        let decision = self.policy.decide_failure(task, attempt, &kind);

        match decision {
            Decision::Retry if state.cancelled => {
                self.transition(
                    graph,
                    &task_id,
                    TaskStatus::Cancelled,
                    attempt,
                    Some("run cancelled before retry".to_string()),
                    None,
                )?;
                Ok(Next::Done)
            }
            Decision::Retry => {
                debug!(task = %task_id, next_attempt = attempt + 1, "retrying task");
                self.transition(graph, &task_id, TaskStatus::Ready, attempt, None, None)?;
                self.emit(DispatchEvent::TaskRetrying {
                    task_id: task_id.clone(),
                    next_attempt: attempt + 1,
                })
                .await;
                Ok(Next::Requeue(task_id))
            }
            Decision::Escalate => {
                let reason = if blocker {
                    "executor reported a blocker".to_string()
                } else {
                    let exhausted = Error::EscalationExhausted {
                        task: task_id.clone(),
                        attempts: attempt,
                    };
                    let event =
                        EscalationEvent::retries_exhausted(&task_id, attempt, exhausted.to_string());
                    self.escalate(state, event).await?;
                    exhausted.to_string()
                };
                self.transition(
                    graph,
                    &task_id,
                    TaskStatus::Blocked,
                    attempt,
                    Some(reason),
                    None,
                )?;
                let stranded = graph.transitive_dependents(&task_id);
                if !stranded.is_empty() {
                    warn!(
                        task = %task_id,
                        stranded = stranded.len(),
                        "blocked task strands its dependents"
                    );
                }
                self.emit(DispatchEvent::TaskBlocked { task_id, stranded })
                    .await;
                Ok(Next::Done)
            }
            Decision::Fail => Err(Error::InternalConsistency(format!(
                "unretryable failure on task {}",
                task_id
            ))),
        }
    }

    async fn escalate(&self, state: &mut RunState, event: EscalationEvent) -> Result<()> {
        warn!(
            task = %event.from_task,
            kind = %event.kind,
            target = ?event.target,
            "escalation: {}",
            event.message
        );
        self.ledger.record_escalation(event.clone())?;
        state.escalations.push(event.clone());
        self.emit(DispatchEvent::Escalated(event)).await;
        Ok(())
    }

    /// Cancel every task that has not started yet.
    fn cancel_remaining(&self, graph: &mut TaskGraph, state: &RunState) -> Result<()> {
        let remaining: Vec<TaskId> = graph
            .tasks()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready))
            .map(|t| t.id.clone())
            .collect();
        for id in remaining {
            let attempt = state.tracker.attempts(&id);
            self.transition(
                graph,
                &id,
                TaskStatus::Cancelled,
                attempt,
                Some("run cancelled".to_string()),
                None,
            )?;
        }
        Ok(())
    }

    /// Apply a status change to the graph and append it to the ledger.
    fn transition(
        &self,
        graph: &mut TaskGraph,
        id: &TaskId,
        to: TaskStatus,
        attempt: u32,
        detail: Option<String>,
        elapsed_ms: Option<u64>,
    ) -> Result<()> {
        let from = graph.transition(id, to)?;
        let mut record = RunRecord::new(id.clone(), from, to, attempt);
        record.detail = detail;
        record.elapsed_ms = elapsed_ms;
        self.ledger.record_transition(record)?;
        Ok(())
    }

    async fn emit(&self, event: DispatchEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    fn summarize(
        &self,
        graph: &TaskGraph,
        state: RunState,
        waves_executed: usize,
        elapsed: Duration,
    ) -> RunSummary {
        let statuses = graph.statuses();
        let with_status = |status: TaskStatus| -> Vec<TaskId> {
            graph
                .tasks()
                .filter(|t| t.status == status)
                .map(|t| t.id.clone())
                .collect()
        };
        let unreached = with_status(TaskStatus::Pending);
        let blocked_tasks = with_status(TaskStatus::Blocked);

        RunSummary {
            run_id: self.ledger.run_id(),
            total_tasks: graph.task_count(),
            completed: with_status(TaskStatus::Completed).len(),
            tasks_with_failures: state.failed_tasks.len(),
            blocked: blocked_tasks.len(),
            cancelled: with_status(TaskStatus::Cancelled).len(),
            waves_executed,
            critical_path: graph.critical_path(),
            escalations: state.escalations,
            unreached,
            blocked_tasks,
            total_attempts: state.tracker.total(),
            failed_attempts: state.failed_attempts,
            statuses,
            was_cancelled: state.cancelled,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pool", &self.pool)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("ledger", &self.ledger)
            .finish()
    }
}

fn attempt_result(finished: std::result::Result<ExecutorResult, Box<dyn Any + Send>>) -> AttemptResult {
    match finished {
        Ok(result) => AttemptResult::Finished(result),
        Err(payload) => AttemptResult::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Verify a wave list places every task exactly once, after its dependencies.
fn check_plan(graph: &TaskGraph, waves: &[Wave]) -> Result<()> {
    let mut wave_of: HashMap<&TaskId, usize> = HashMap::with_capacity(graph.task_count());
    for (position, wave) in waves.iter().enumerate() {
        if wave.index != position {
            return Err(Error::InternalConsistency(format!(
                "wave at position {} has index {}",
                position, wave.index
            )));
        }
        for id in &wave.members {
            if !graph.contains_task(id) {
                return Err(Error::InternalConsistency(format!(
                    "wave {} names unknown task {}",
                    wave.index, id
                )));
            }
            if wave_of.insert(id, wave.index).is_some() {
                return Err(Error::InternalConsistency(format!(
                    "task {} appears in more than one wave",
                    id
                )));
            }
        }
    }

    for task in graph.tasks() {
        let Some(&index) = wave_of.get(&task.id) else {
            return Err(Error::InternalConsistency(format!(
                "task {} is not in any wave",
                task.id
            )));
        };
        for dep in &task.blocked_by {
            if wave_of.get(dep).map_or(true, |&dep_index| dep_index >= index) {
                return Err(Error::InternalConsistency(format!(
                    "task {} in wave {} does not follow its dependency {}",
                    task.id, index, dep
                )));
            }
        }
    }
    Ok(())
}

/// Run `waves` with an in-memory ledger and default retry ceilings.
pub async fn run(
    graph: TaskGraph,
    waves: Vec<Wave>,
    executor: Arc<dyn Executor>,
    max_concurrency: usize,
) -> Result<RunSummary> {
    let pool = ExecutorPool::new(max_concurrency, crate::orchestration::pool::DEFAULT_HIGH_TIER_CAP)?;
    let dispatcher = Dispatcher::new(pool, RetryPolicy::default(), Arc::new(RunLedger::new()));
    dispatcher.run(graph, waves, executor).await
}
