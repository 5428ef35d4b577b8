//! Dispatcher behaviour under load, failure and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use taskwave::{
    plan, replay, score, ComplexityDimensions, Config, DispatchEvent, Dispatcher, EscalationKind,
    EscalationRequest, Executor, ExecutorPool, ExecutorResult, OperationClass, RetryCeilings,
    RetryPolicy, RunLedger, Task, TaskGraph, TaskId, TaskStatus, Tier,
};

use crate::fixtures::{
    chain_tasks, diamond_tasks, independent_tasks, test_task, RunHarness, ScriptedExecutor,
};

fn high() -> ComplexityDimensions {
    ComplexityDimensions::new(2, 2, 2, 2, 1).unwrap()
}

/// Test: Parallel execution respects capacity
/// Given 8 independent tasks and a limit of 3
/// When the run completes
/// Then no more than 3 attempts ever overlapped
#[tokio::test]
async fn test_parallel_respects_capacity() {
    let harness = RunHarness::new(3);
    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(20));

    let summary = harness.run(independent_tasks(8), &executor).await;

    assert!(summary.is_success());
    assert_eq!(summary.waves_executed, 1);
    assert!(executor.peak_concurrency() <= 3);
    assert!(executor.peak_concurrency() >= 2, "independent tasks should overlap");
}

/// Test: High-tier lane
/// Given three High-tier tasks and a generous pool
/// When the run completes
/// Then High-tier attempts never overlapped
#[tokio::test]
async fn test_high_tier_tasks_never_overlap() {
    let tasks = vec![
        test_task("H1").with_complexity(high()),
        test_task("H2").with_complexity(high()),
        test_task("H3").with_complexity(high()),
    ];
    assert!(tasks.iter().all(|t| score(t) == Tier::High));

    let harness = RunHarness::with_pool(ExecutorPool::new(4, 1).unwrap(), RetryPolicy::default());
    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(10));
    let summary = harness.run(tasks, &executor).await;

    assert!(summary.is_success());
    assert_eq!(executor.peak_concurrency(), 1);
}

/// Test: High-tier tasks do not hold up lower tiers
/// Given two High-tier tasks followed by a Low task in the same wave
/// When the pool has room for two attempts
/// Then the Low task starts before the second High task
#[tokio::test]
async fn test_low_tier_overtakes_deferred_high_tier() {
    let tasks = vec![
        test_task("H1").with_complexity(high()),
        test_task("H2").with_complexity(high()),
        test_task("L1"),
    ];
    let harness = RunHarness::new(2);
    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(10));
    let summary = harness.run(tasks, &executor).await;

    assert!(summary.is_success());
    let order = executor.start_order();
    let pos = |id: &str| order.iter().position(|t| t.as_str() == id).unwrap();
    assert!(pos("L1") < pos("H2"));
}

/// Test: Wave barrier
/// Given a diamond graph
/// When the run completes
/// Then every task of a wave finished before the next wave started
#[tokio::test]
async fn test_wave_barrier_holds() {
    let mut harness = RunHarness::new(4);
    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(5));
    let summary = harness.run(diamond_tasks(), &executor).await;
    assert!(summary.is_success());
    assert_eq!(summary.waves_executed, 3);

    let events = harness.drain_events();
    let finished_wave = |index: usize| {
        events
            .iter()
            .position(|e| *e == DispatchEvent::WaveFinished { index })
            .unwrap()
    };
    let completed = |id: &str| {
        events
            .iter()
            .position(|e| matches!(e, DispatchEvent::TaskCompleted { task_id, .. } if task_id.as_str() == id))
            .unwrap()
    };
    let started = |id: &str| {
        events
            .iter()
            .position(|e| matches!(e, DispatchEvent::TaskStarted { task_id, .. } if task_id.as_str() == id))
            .unwrap()
    };

    assert!(completed("A") < finished_wave(0));
    assert!(finished_wave(0) < started("B"));
    assert!(completed("B") < finished_wave(1));
    assert!(completed("C") < finished_wave(1));
    assert!(finished_wave(1) < started("D"));
    assert_eq!(events.last(), Some(&DispatchEvent::RunFinished));
}

/// Test: Unreached tasks are not failures
/// Given a chain whose head always fails
/// When the run completes
/// Then the rest of the chain is pending and reported as unreached
#[tokio::test]
async fn test_unreached_dependents_are_not_failed() {
    let harness = RunHarness::new(2);
    let executor = ScriptedExecutor::new().always_fail("C0");
    let summary = harness.run(chain_tasks(4), &executor).await;

    assert_eq!(summary.blocked, 1);
    assert_eq!(summary.tasks_with_failures, 1);
    assert_eq!(summary.unreached.len(), 3);
    for id in &summary.unreached {
        assert_eq!(summary.status_of(id), Some(TaskStatus::Pending));
        assert!(harness.ledger().records_for(id).is_empty());
    }
    assert_eq!(summary.critical_path.len(), 4);
}

/// Test: Independent branches keep running
/// Given a diamond where B is blocked
/// When the run completes
/// Then C still completes and only D is unreached
#[tokio::test]
async fn test_blocked_branch_does_not_stop_siblings() {
    let harness = RunHarness::new(4);
    let executor = ScriptedExecutor::new().always_fail("B");
    let summary = harness.run(diamond_tasks(), &executor).await;

    assert_eq!(summary.status_of(&"A".into()), Some(TaskStatus::Completed));
    assert_eq!(summary.status_of(&"B".into()), Some(TaskStatus::Blocked));
    assert_eq!(summary.status_of(&"C".into()), Some(TaskStatus::Completed));
    assert_eq!(summary.unreached, vec![TaskId::from("D")]);
    assert_eq!(summary.completed, 2);
}

/// Test: Per-class ceilings
/// Given a research task that always fails
/// When the run completes
/// Then it was attempted ceiling + 1 times
#[tokio::test]
async fn test_research_ceiling() {
    let harness = RunHarness::new(1);
    let executor = ScriptedExecutor::new().always_fail("R");
    let summary = harness
        .run(
            vec![test_task("R").with_operation_class(OperationClass::Research)],
            &executor,
        )
        .await;

    assert_eq!(executor.calls("R"), 3);
    assert_eq!(summary.failed_attempts, 3);
    assert_eq!(summary.status_of(&"R".into()), Some(TaskStatus::Blocked));
}

/// Test: Blocker escalation
/// Given an executor that reports a blocker on the first attempt
/// When the run completes
/// Then the task is blocked without retries and one blocker escalation is recorded
#[tokio::test]
async fn test_blocker_escalates_immediately() {
    let harness = RunHarness::new(1);
    let executor = ScriptedExecutor::new().script(
        "T1",
        vec![ExecutorResult::failure("no credentials")
            .with_escalation(EscalationRequest::blocker("need production access"))],
    );
    let summary = harness.run(vec![test_task("T1")], &executor).await;

    assert_eq!(executor.calls("T1"), 1);
    assert_eq!(summary.status_of(&"T1".into()), Some(TaskStatus::Blocked));
    assert_eq!(summary.escalations.len(), 1);
    assert_eq!(summary.escalations[0].kind, EscalationKind::Blocker);
}

/// Test: Cross-domain escalation is advisory
/// Given a successful attempt that flags another domain
/// When the run completes
/// Then the task completes and the escalation names its target
#[tokio::test]
async fn test_cross_domain_escalation_recorded() {
    let harness = RunHarness::new(1);
    let executor = ScriptedExecutor::new().script(
        "T1",
        vec![ExecutorResult::success("migrated")
            .with_escalation(EscalationRequest::cross_domain("frontend", "API shape changed"))],
    );
    let summary = harness.run(vec![test_task("T1")], &executor).await;

    assert!(summary.is_success());
    assert_eq!(summary.escalations.len(), 1);
    assert_eq!(summary.escalations[0].target.as_deref(), Some("frontend"));
}

/// Test: Cancellation mid-run
/// Given a chain of slow tasks
/// When the run is cancelled while the first task runs
/// Then that attempt finishes and everything not yet started is cancelled
#[tokio::test]
async fn test_cancellation_stops_new_work() {
    let harness = RunHarness::new(1);
    let token = harness.dispatcher.cancellation_token();
    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(50));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let summary = harness.run(chain_tasks(3), &executor).await;

    assert!(summary.was_cancelled);
    assert_eq!(summary.status_of(&"C0".into()), Some(TaskStatus::Completed));
    assert_eq!(summary.status_of(&"C1".into()), Some(TaskStatus::Cancelled));
    assert_eq!(summary.status_of(&"C2".into()), Some(TaskStatus::Cancelled));
    assert_eq!(summary.cancelled, 2);
    assert_eq!(executor.calls("C1"), 0);
}

/// Test: Attempt timeout
/// Given an executor slower than the attempt timeout
/// When the run completes
/// Then every attempt failed with a timeout and the task is blocked
#[tokio::test(start_paused = true)]
async fn test_attempt_timeout() {
    let dispatcher = Dispatcher::new(
        ExecutorPool::new(1, 1).unwrap(),
        RetryPolicy::new(RetryCeilings {
            build_and_test: 1,
            ..Default::default()
        }),
        Arc::new(RunLedger::new()),
    )
    .with_attempt_timeout(Duration::from_secs(5));
    let executor = ScriptedExecutor::new().with_delay(Duration::from_secs(60));

    let graph = TaskGraph::build(vec![test_task("slow")]).unwrap();
    let waves = plan(&graph).unwrap();
    let summary = dispatcher
        .run(graph, waves, executor.clone().into_executor())
        .await
        .unwrap();

    assert_eq!(summary.status_of(&"slow".into()), Some(TaskStatus::Blocked));
    assert_eq!(summary.failed_attempts, 2);
    let timeouts = dispatcher
        .ledger()
        .records_for(&"slow".into())
        .into_iter()
        .filter(|r| r.to_status == TaskStatus::Failed)
        .filter(|r| r.detail.as_deref().is_some_and(|d| d.contains("timed out")))
        .count();
    assert_eq!(timeouts, 2);
}

/// Test: Configuration drives the dispatcher
/// Given a config with a single slot
/// When independent tasks run
/// Then attempts never overlap
#[tokio::test]
async fn test_dispatcher_from_config() {
    let config = Config {
        max_concurrency: 1,
        ..Default::default()
    };
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    assert_eq!(dispatcher.pool().max_concurrency(), 1);
    assert!(dispatcher.ledger().path().is_none());

    let executor = ScriptedExecutor::new().with_delay(Duration::from_millis(5));
    let graph = TaskGraph::build(independent_tasks(3)).unwrap();
    let waves = plan(&graph).unwrap();
    let summary = dispatcher
        .run(graph, waves, executor.clone().into_executor())
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(executor.peak_concurrency(), 1);
}

/// Test: Configured ledger path
/// Given a config naming a ledger file
/// When a dispatcher is built from it and runs
/// Then the ledger is written to that file
#[tokio::test]
async fn test_dispatcher_from_config_persists_ledger() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.ndjson");
    let config = Config {
        ledger_path: Some(path.to_string_lossy().into_owned()),
        ..Default::default()
    };
    let dispatcher = Dispatcher::from_config(&config).unwrap();
    assert_eq!(dispatcher.ledger().path(), Some(path.as_path()));

    let graph = TaskGraph::build(diamond_tasks()).unwrap();
    let waves = plan(&graph).unwrap();
    let summary = dispatcher
        .run(graph, waves, ScriptedExecutor::new().into_executor())
        .await
        .unwrap();

    let loaded = RunLedger::load(&path).unwrap();
    assert_eq!(loaded.len(), dispatcher.ledger().len());
    assert!(loaded.iter().all(|e| e.run_id == summary.run_id));
}

/// Test: Cancellation while a retry is pending
/// Given an executor that cancels the run and then fails with retries left
/// When the failure is handled
/// Then the task is cancelled instead of retried or blocked
#[tokio::test]
async fn test_cancellation_before_retry() {
    let harness = RunHarness::new(1);
    let token = harness.dispatcher.cancellation_token();
    let executor: Arc<dyn Executor> = Arc::new(move |_task: Task| {
        let token = token.clone();
        async move {
            token.cancel();
            ExecutorResult::failure("tests red")
        }
    });

    let graph = TaskGraph::build(vec![test_task("T1"), test_task("T2").blocked_by("T1")]).unwrap();
    let waves = plan(&graph).unwrap();
    let summary = harness.dispatcher.run(graph, waves, executor).await.unwrap();

    assert_eq!(summary.status_of(&"T1".into()), Some(TaskStatus::Cancelled));
    assert_eq!(summary.blocked, 0);
    assert_eq!(summary.cancelled, 2);
    assert_eq!(summary.total_attempts, 1);

    let records = harness.ledger().records_for(&"T1".into());
    let last = records.last().unwrap();
    assert_eq!(
        (last.from_status, last.to_status),
        (TaskStatus::Failed, TaskStatus::Cancelled)
    );
    assert_eq!(last.detail.as_deref(), Some("run cancelled before retry"));

    let replayed = replay(&harness.ledger().entries(), summary.statuses.keys().cloned()).unwrap();
    assert_eq!(replayed, summary.statuses);
}

/// Test: Empty input
/// Given no tasks
/// When the run completes
/// Then the summary is empty and successful
#[tokio::test]
async fn test_empty_run() {
    let harness = RunHarness::new(2);
    let summary = harness.run(Vec::new(), &ScriptedExecutor::new()).await;
    assert_eq!(summary.total_tasks, 0);
    assert_eq!(summary.waves_executed, 0);
    assert!(summary.critical_path.is_empty());
    assert!(summary.is_success());
}
