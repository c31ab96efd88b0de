// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{wait_until, Harness};
use gaffer_core::Session;

fn spec(harness: &Harness, command: &str) -> SpawnSpec {
    let session_id = SessionId::from_string("ses-sup");
    let session = Session::new(session_id, "fixture".into(), vec![], 0);
    harness.store().save_session(&session).unwrap();
    SpawnSpec {
        command: command.to_string(),
        cwd: None,
        env: vec![],
        owner: WorkflowId::from_string("wf-sup"),
        session_id,
        log_name: "agent-1".to_string(),
        timeout: None,
    }
}

#[tokio::test]
async fn spawn_captures_output_and_reaps_on_exit() {
    let harness = Harness::new();
    let supervisor = harness.supervisor();

    let (id, done) = supervisor.start(spec(&harness, "echo hello; echo oops >&2")).await_ok();
    assert_eq!(supervisor.records().len(), 1);

    let outcome = done.await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Exited { exit_code: Some(0) });

    // Record reaped once the process exits.
    let supervisor2 = supervisor.clone();
    wait_until("record reaped", move || supervisor2.records().is_empty()).await;

    // Output landed in the per-agent log, stderr tagged.
    let log_path = harness.store().layout().agent_log("ses-sup", "agent-1");
    wait_until("log flushed", || {
        std::fs::read_to_string(&log_path).map(|s| s.contains("hello")).unwrap_or(false)
    })
    .await;
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("hello"));
    assert!(log.contains("[stderr] oops"));
    drop(id);
}

#[tokio::test]
async fn abnormal_exit_surfaces_exit_code() {
    let harness = Harness::new();
    let mut events = harness.collect("process.exited");

    let (_, done) = harness.supervisor().start(spec(&harness, "exit 3")).await_ok();
    let outcome = done.await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Exited { exit_code: Some(3) });

    let event = events.recv().await.unwrap();
    assert!(matches!(event, gaffer_core::Event::ProcessExited { exit_code: Some(3), .. }));
}

#[tokio::test]
async fn spawn_failure_is_synchronous() {
    let harness = Harness::new();
    let mut spec = spec(&harness, "true");
    spec.cwd = Some("/definitely/not/a/real/directory".into());
    let result = harness.supervisor().start(spec);
    assert!(matches!(result, Err(EngineError::SpawnFailed(_))));
}

#[tokio::test]
async fn per_process_timeout_kills_the_child() {
    let harness = Harness::new();
    let mut spec = spec(&harness, "sleep 30");
    spec.timeout = Some(Duration::from_millis(100));

    let (_, done) = harness.supervisor().start(spec).await_ok();
    let outcome = done.await.unwrap();
    assert_eq!(outcome, ProcessOutcome::TimedOut);
}

#[tokio::test]
async fn stuck_processes_are_detected_and_killed() {
    // Threshold of 150ms; the child sleeps silently far longer.
    let harness = Harness::builder().stuck_threshold(Duration::from_millis(150)).build();
    let mut stuck_events = harness.collect("process.stuck");

    let (id, done) = harness.supervisor().start(spec(&harness, "sleep 600")).await_ok();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let killed = harness.supervisor().kill_stuck();
    assert_eq!(killed, vec![id]);

    let outcome = done.await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::KilledStuck { .. }));

    let event = stuck_events.recv().await.unwrap();
    match event {
        gaffer_core::Event::ProcessStuck { id: event_id, idle_ms, .. } => {
            assert_eq!(event_id, id);
            assert!(idle_ms >= 150);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn stuck_detection_follows_the_clock() {
    // Deterministic variant: a FakeClock advances past the threshold
    // without waiting for wall time.
    let harness = Harness::new();
    let clock = gaffer_core::FakeClock::new();
    let supervisor = ProcessSupervisor::new(
        clock.clone(),
        harness.bus().clone(),
        Arc::clone(harness.store()),
        Duration::from_secs(600),
    );

    let (id, done) = supervisor.start(spec(&harness, "sleep 30")).await_ok();
    assert!(supervisor.kill_stuck().is_empty(), "fresh process is not stuck");

    clock.advance(Duration::from_secs(601));
    assert_eq!(supervisor.kill_stuck(), vec![id]);
    assert!(matches!(done.await.unwrap(), ProcessOutcome::KilledStuck { .. }));
}

#[tokio::test]
async fn active_processes_are_not_stuck() {
    let harness = Harness::builder().stuck_threshold(Duration::from_millis(200)).build();

    // Chatty child refreshes its activity every 50ms.
    let (_, done) = harness
        .supervisor()
        .start(spec(&harness, "for i in 1 2 3 4 5 6; do echo tick; sleep 0.05; done"))
        .await_ok();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(harness.supervisor().kill_stuck().is_empty());
    let outcome = done.await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Exited { exit_code: Some(0) });
}

#[tokio::test]
async fn stop_terminates_gracefully() {
    let harness = Harness::new();
    let (id, done) = harness.supervisor().start(spec(&harness, "sleep 30")).await_ok();

    harness.supervisor().stop(id, false);
    let outcome = done.await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Killed);
}

#[tokio::test]
async fn stop_owner_kills_every_owned_child() {
    let harness = Harness::new();
    let (_, done_a) = harness.supervisor().start(spec(&harness, "sleep 30")).await_ok();
    let (_, done_b) = harness.supervisor().start(spec(&harness, "sleep 30")).await_ok();

    harness.supervisor().stop_owner(WorkflowId::from_string("wf-sup"));
    assert_eq!(done_a.await.unwrap(), ProcessOutcome::Killed);
    assert_eq!(done_b.await.unwrap(), ProcessOutcome::Killed);
}

#[tokio::test]
async fn orphan_sweep_requires_a_signature() {
    let harness = Harness::new();
    // Empty signature: never kill anything.
    assert!(harness.supervisor().kill_orphans("").is_empty());
    assert!(harness.supervisor().kill_orphans("   ").is_empty());
}

#[tokio::test]
async fn orphan_sweep_spares_tracked_processes() {
    let harness = Harness::new();
    let marker = format!("gaffer-orphan-fixture-{}", std::process::id());
    let (_, done) = harness
        .supervisor()
        .start(spec(&harness, &format!("sleep 2 # {marker}")))
        .await_ok();

    let killed = harness.supervisor().kill_orphans(&marker);
    assert!(killed.is_empty(), "tracked child must not be swept: {killed:?}");

    harness.supervisor().stop_owner(WorkflowId::from_string("wf-sup"));
    let _ = done.await;
}

/// Small helper so `start` reads naturally in tests.
trait StartExt {
    fn await_ok(self) -> (ProcessId, tokio::sync::oneshot::Receiver<ProcessOutcome>);
}

impl StartExt for Result<(ProcessId, tokio::sync::oneshot::Receiver<ProcessOutcome>), EngineError> {
    fn await_ok(self) -> (ProcessId, tokio::sync::oneshot::Receiver<ProcessOutcome>) {
        match self {
            Ok(pair) => pair,
            Err(e) => panic!("spawn failed: {e}"),
        }
    }
}
