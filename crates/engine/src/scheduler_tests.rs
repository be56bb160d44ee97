//! Tests for plan validation and the stage scheduler.
//!
//! Steps are `MockStep`s; the tokio clock is paused so delays are virtual
//! and concurrency shows up as elapsed time equal to the slowest step.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;

use steps::mock::{CompletionLog, MockStep};
use steps::{Step, StepStatus};

use crate::{EngineError, ExecutionTrace, Invocation, Plan, Stage, StageScheduler};

fn ok(name: &str) -> Arc<MockStep> {
    Arc::new(MockStep::succeeding(name, json!({})))
}

fn failing(name: &str) -> Arc<MockStep> {
    Arc::new(MockStep::failing(name, format!("{name} broke")))
}

fn inv(step: &Arc<MockStep>) -> Invocation {
    Invocation::from(Arc::clone(step))
}

fn statuses(trace: &ExecutionTrace) -> Vec<(&str, StepStatus)> {
    trace.statuses()
}

// ============================================================
// Plan validation
// ============================================================

#[test]
fn duplicate_step_ids_are_rejected() {
    let a = ok("a");
    let err = Plan::builder()
        .step(a.clone())
        .group([inv(&ok("b")), inv(&a)])
        .build()
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateStepId(id) if id == "a"));
}

#[test]
fn empty_group_is_rejected() {
    let err = Plan::new(vec![Stage::Single(inv(&ok("a"))), Stage::Group(vec![])]).unwrap_err();
    assert!(matches!(err, EngineError::EmptyGroup { stage: 1 }));
}

// ============================================================
// Execution
// ============================================================

#[tokio::test]
async fn empty_plan_yields_empty_trace() {
    let trace = StageScheduler::new().execute(&Plan::default()).await;
    assert!(trace.is_empty());
    assert!(!trace.has_failure());
}

#[tokio::test]
async fn all_successful_steps_run_once_in_plan_order() {
    let (a, b, c, d) = (ok("a"), ok("b"), ok("c"), ok("d"));
    let plan = Plan::builder()
        .step(a.clone())
        .group([inv(&b), inv(&c)])
        .step(d.clone())
        .build()
        .unwrap();

    let trace = StageScheduler::new().execute(&plan).await;

    assert_eq!(
        statuses(&trace),
        vec![
            ("a", StepStatus::Success),
            ("b", StepStatus::Success),
            ("c", StepStatus::Success),
            ("d", StepStatus::Success),
        ]
    );
    for step in [&a, &b, &c, &d] {
        assert_eq!(step.call_count(), 1);
    }
}

#[tokio::test]
async fn failure_in_group_skips_later_stages() {
    let (a, b, c, d) = (ok("a"), ok("b"), failing("c"), ok("d"));
    let plan = Plan::builder()
        .step(a.clone())
        .group([inv(&b), inv(&c)])
        .step(d.clone())
        .build()
        .unwrap();

    let trace = StageScheduler::new().execute(&plan).await;

    assert_eq!(
        statuses(&trace),
        vec![
            ("a", StepStatus::Success),
            ("b", StepStatus::Success),
            ("c", StepStatus::Failure),
            ("d", StepStatus::Skipped),
        ]
    );
    assert_eq!(trace.get("c").unwrap().error(), Some("c broke"));
    assert_eq!(d.call_count(), 0, "skipped step must not run");
}

#[tokio::test]
async fn every_step_after_first_failure_is_skipped_including_groups() {
    let (a, b, c, d, e) = (failing("a"), ok("b"), ok("c"), ok("d"), ok("e"));
    let plan = Plan::builder()
        .step(a.clone())
        .group([inv(&b), inv(&c)])
        .step(d.clone())
        .group([inv(&e)])
        .build()
        .unwrap();

    let trace = StageScheduler::new().execute(&plan).await;

    assert_eq!(trace.len(), 5);
    assert_eq!(trace.first_failure().unwrap().step_id(), "a");
    let skipped: Vec<&str> = trace
        .iter()
        .filter(|r| r.status() == StepStatus::Skipped)
        .map(|r| r.step_id())
        .collect();
    assert_eq!(skipped, vec!["b", "c", "d", "e"]);
    for step in [&b, &c, &d, &e] {
        assert_eq!(step.call_count(), 0);
    }
    assert_eq!(trace.counts()["SKIPPED"], 4);
}

#[tokio::test(start_paused = true)]
async fn group_results_follow_declared_order_not_completion_order() {
    let log: CompletionLog = Arc::new(Mutex::new(Vec::new()));
    let slow = Arc::new(
        MockStep::succeeding("slow", json!({}))
            .delayed(Duration::from_millis(300))
            .recording_into(log.clone()),
    );
    let medium = Arc::new(
        MockStep::succeeding("medium", json!({}))
            .delayed(Duration::from_millis(200))
            .recording_into(log.clone()),
    );
    let fast = Arc::new(
        MockStep::succeeding("fast", json!({}))
            .delayed(Duration::from_millis(100))
            .recording_into(log.clone()),
    );
    let plan = Plan::builder()
        .group([inv(&slow), inv(&medium), inv(&fast)])
        .build()
        .unwrap();

    let started = Instant::now();
    let trace = StageScheduler::new().execute(&plan).await;

    // Concurrent: the stage takes as long as its slowest step.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(350));
    assert_eq!(*log.lock().unwrap(), vec!["fast", "medium", "slow"]);
    let ids: Vec<&str> = trace.iter().map(|r| r.step_id()).collect();
    assert_eq!(ids, vec!["slow", "medium", "fast"]);
}

#[tokio::test(start_paused = true)]
async fn failing_sibling_does_not_cancel_the_rest_of_its_group() {
    let boom = failing("boom");
    let slow = Arc::new(MockStep::succeeding("slow", json!({})).delayed(Duration::from_millis(500)));
    let after = ok("after");
    let plan = Plan::builder()
        .group([inv(&boom), inv(&slow)])
        .step(after.clone())
        .build()
        .unwrap();

    let started = Instant::now();
    let trace = StageScheduler::new().execute(&plan).await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(550));
    assert_eq!(
        statuses(&trace),
        vec![
            ("boom", StepStatus::Failure),
            ("slow", StepStatus::Success),
            ("after", StepStatus::Skipped),
        ]
    );
    assert_eq!(slow.call_count(), 1);
    assert_eq!(after.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stages_are_barriers() {
    let log: CompletionLog = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::new(
        MockStep::succeeding("first", json!({}))
            .delayed(Duration::from_millis(200))
            .recording_into(log.clone()),
    );
    let second = Arc::new(MockStep::succeeding("second", json!({})).recording_into(log.clone()));
    let plan = Plan::builder()
        .step(first.clone())
        .step(second.clone())
        .build()
        .unwrap();

    StageScheduler::new().execute(&plan).await;

    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn run_arguments_are_passed_per_invocation() {
    let a = ok("a");
    let b = ok("b");
    let plan = Plan::builder()
        .step_with_args(a.clone(), vec![json!("--fast"), json!(3)])
        .group([Invocation::with_args(b.clone(), vec![json!({ "k": "v" })])])
        .build()
        .unwrap();

    let trace = StageScheduler::new().execute(&plan).await;

    assert!(!trace.has_failure());
    assert_eq!(a.last_args(), Some(vec![json!("--fast"), json!(3)]));
    assert_eq!(b.last_args(), Some(vec![json!({ "k": "v" })]));
    assert_eq!(trace.get("a").unwrap().output()["step"], "a");
}

#[tokio::test]
async fn panicking_step_becomes_failure_and_cascades() {
    let sibling = ok("sibling");
    let bad = Arc::new(MockStep::panicking("bad", "exploded"));
    let later = ok("later");
    let plan = Plan::builder()
        .group([Invocation::from(bad.clone()), inv(&sibling)])
        .step(later.clone())
        .build()
        .unwrap();

    let trace = StageScheduler::new().execute(&plan).await;

    let bad_result = trace.get("bad").unwrap();
    assert_eq!(bad_result.status(), StepStatus::Failure);
    assert_eq!(bad_result.error(), Some("step panicked: exploded"));
    assert_eq!(trace.get("sibling").unwrap().status(), StepStatus::Success);
    assert_eq!(trace.get("later").unwrap().status(), StepStatus::Skipped);
    assert_eq!(later.call_count(), 0);
}

#[tokio::test]
async fn execute_is_reentrant() {
    let a = ok("a");
    let plan = Plan::builder().step(a.clone()).build().unwrap();
    let scheduler = StageScheduler::new();

    let first = scheduler.execute(&plan).await;
    let second = scheduler.execute(&plan).await;

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(a.call_count(), 2);
}

#[test]
fn skip_is_side_effect_free() {
    let step = ok("idle");
    for _ in 0..3 {
        let result = step.skip();
        assert_eq!(result.status(), StepStatus::Skipped);
        assert_eq!(result.output(), &Value::Null);
    }
    assert_eq!(step.call_count(), 0);
}
