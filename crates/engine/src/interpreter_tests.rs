// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::Harness;
use gaffer_core::SystemClock;

type Ctx = Arc<crate::context::ExecutionContext<SystemClock>>;

async fn run_graph(harness: &Harness, doc: &str, ctx: Ctx) -> WorkflowResult {
    harness.engine().run(&harness.graph(doc), ctx, RunOptions::default()).await
}

fn params(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn linear_flow_runs_to_completion() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "emit" {
        type = "log"
        config { message = "working" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "emit.in" }
      connect "c2" { from = "emit.out", to = "finish.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.success());
    for node in ["entry", "emit", "finish"] {
        assert!(result.completed.contains(node), "{node} should have completed");
    }
}

#[tokio::test]
async fn if_branching_takes_exactly_one_path() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "check" {
        type = "if"
        config { condition = "value > 10" }
      }
      node "big" {
        type = "log"
        config { message = "big" }
        input "in" { from = "check.true" }
      }
      node "small" {
        type = "log"
        config { message = "small" }
        input "in" { from = "check.false" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "check.in" }
      connect "c2" { from = "big.out", to = "finish.in" }
      connect "c3" { from = "small.out", to = "finish.in" }
    }"#;

    // value = 42: the "big" path runs, "small" never does.
    let ctx = harness.context(params(&[("value", Value::Number(42.0))]));
    let session = ctx.session_id;
    let result = run_graph(&harness, doc, ctx).await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.completed.contains("big"));
    assert!(!result.completed.contains("small"));
    let log = std::fs::read_to_string(harness.store().layout().progress_log(session.as_str()))
        .unwrap();
    assert!(log.contains("big"));
    assert!(!log.contains("small"));

    // value = 3: the other way round.
    let ctx = harness.context(params(&[("value", Value::Number(3.0))]));
    let session = ctx.session_id;
    let result = run_graph(&harness, doc, ctx).await;
    assert!(result.completed.contains("small"));
    assert!(!result.completed.contains("big"));
    let log = std::fs::read_to_string(harness.store().layout().progress_log(session.as_str()))
        .unwrap();
    assert!(log.contains("small"));
    assert!(!log.contains("big"));
}

#[tokio::test]
async fn for_loop_collects_results_in_order() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "loop" {
        type = "for_loop"
        config { items = "[1, 2, 3]" }
      }
      node "square" {
        type = "script"
        config { code = "return {out: item * item}" }
        output "out" { type = "number" }
        input "in" { from = "loop.body" }
      }
      node "finish" {
        type = "end"
        input "in" { from = "loop.done" }
        input "results" { from = "loop.results" }
      }
      connect "c1" { from = "entry.out", to = "loop.in" }
      connect "c2" { from = "square.done", to = "loop.continue" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(
        result.outputs.get("results"),
        Some(&Value::List(vec![
            Value::Number(1.0),
            Value::Number(4.0),
            Value::Number(9.0)
        ]))
    );
}

#[tokio::test]
async fn for_loop_over_empty_items_skips_the_body() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "loop" {
        type = "for_loop"
        config { items = "[]" }
      }
      node "body" {
        type = "log"
        config { message = "never" }
        input "in" { from = "loop.body" }
      }
      node "finish" {
        type = "end"
        input "in" { from = "loop.done" }
        input "results" { from = "loop.results" }
      }
      connect "c1" { from = "entry.out", to = "loop.in" }
      connect "c2" { from = "body.out", to = "loop.continue" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(!result.completed.contains("body"));
    assert_eq!(result.outputs.get("results"), Some(&Value::List(vec![])));
}

#[tokio::test]
async fn while_loop_stops_at_max_iterations() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "loop" {
        type = "while_loop"
        config {
          condition      = "true"
          max_iterations = 3
        }
      }
      node "tick" {
        type = "log"
        config { message = "tick {{index}}" }
        input "in" { from = "loop.body" }
      }
      node "finish" {
        type = "end"
        input "in" { from = "loop.done" }
        input "index" { from = "loop.index" }
      }
      connect "c1" { from = "entry.out", to = "loop.in" }
      connect "c2" { from = "tick.out", to = "loop.continue" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.outputs.get("index"), Some(&Value::Number(3.0)));
}

#[tokio::test]
async fn while_loop_with_false_condition_never_runs_body() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "loop" {
        type = "while_loop"
        config { condition = "false" }
      }
      node "body" {
        type = "log"
        config { message = "never" }
        input "in" { from = "loop.body" }
      }
      node "finish" {
        type = "end"
        input "in" { from = "loop.done" }
      }
      connect "c1" { from = "entry.out", to = "loop.in" }
      connect "c2" { from = "body.out", to = "loop.continue" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(!result.completed.contains("body"));
}

#[tokio::test]
async fn parallel_sync_all_waits_for_every_branch() {
    let harness = Harness::new();
    let mut node_events = harness.collect("node_complete");
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "fan" {
        type = "parallel"
        output "a" { type = "trigger" }
        output "b" { type = "trigger" }
      }
      node "fast" {
        type = "variable_set"
        config { name = "fast_done", value = "true" }
        input "in" { from = "fan.a" }
      }
      node "slow" {
        type = "delay"
        config { duration_ms = 120 }
        input "in" { from = "fan.b" }
      }
      node "join" {
        type = "sync"
        config { mode = "all" }
        input "a" { type = "trigger", from = "fast.out" }
        input "b" { type = "trigger", from = "slow.out" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "fan.in" }
      connect "c2" { from = "join.out", to = "finish.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;
    assert_eq!(result.status, WorkflowStatus::Completed);

    // The join completes only after both branches.
    let mut order = Vec::new();
    while let Ok(event) = node_events.try_recv() {
        if let Event::NodeComplete { node_id, .. } = event {
            order.push(node_id);
        }
    }
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("join") > pos("fast"));
    assert!(pos("join") > pos("slow"));
    assert!(pos("finish") > pos("join"));
}

#[tokio::test]
async fn sync_any_proceeds_after_first_branch() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "fan" {
        type = "parallel"
        output "a" { type = "trigger" }
        output "b" { type = "trigger" }
      }
      node "fast" {
        type = "variable_set"
        config { name = "winner", value = "'fast'" }
        input "in" { from = "fan.a" }
      }
      node "slow" {
        type = "delay"
        config { duration_ms = 150 }
        input "in" { from = "fan.b" }
      }
      node "join" {
        type = "sync"
        config { mode = "any" }
        input "a" { type = "trigger", from = "fast.out" }
        input "b" { type = "trigger", from = "slow.out" }
      }
      node "after" {
        type = "variable_set"
        config { name = "joined", value = "'yes'" }
        input "in" { from = "join.out" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "fan.in" }
      connect "c2" { from = "after.out", to = "finish.in" }
    }"#;
    let ctx = harness.context(BTreeMap::new());
    let started = std::time::Instant::now();
    let result = run_graph(&harness, doc, Arc::clone(&ctx)).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(ctx.get_var("joined"), Some(Value::String("yes".into())));
    // The slow branch was allowed to finish (let-complete-but-ignore).
    assert!(result.completed.contains("slow"));
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn parallel_branches_share_variables_last_writer_wins() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "fan" {
        type = "parallel"
        output "a" { type = "trigger" }
        output "b" { type = "trigger" }
      }
      node "quick" {
        type = "variable_set"
        config { name = "who", value = "'quick'" }
        input "in" { from = "fan.a" }
      }
      node "late" {
        type = "delay"
        config { duration_ms = 60 }
        input "in" { from = "fan.b" }
      }
      node "late_set" {
        type = "variable_set"
        config { name = "who", value = "'late'" }
        input "in" { from = "late.out" }
      }
      node "join" {
        type = "sync"
        input "a" { type = "trigger", from = "quick.out" }
        input "b" { type = "trigger", from = "late_set.out" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "fan.in" }
      connect "c2" { from = "join.out", to = "finish.in" }
    }"#;
    let ctx = harness.context(BTreeMap::new());
    let result = run_graph(&harness, doc, Arc::clone(&ctx)).await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(ctx.get_var("who"), Some(Value::String("late".into())));
}

#[tokio::test]
async fn retry_policy_exhausts_into_retry_exhausted() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "flaky" {
        type = "script"
        config { code = "1 / 0" }
        on_error {
          policy      = "retry"
          max_retries = 2
          delay_ms    = 10
        }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "flaky.in" }
      connect "c2" { from = "flaky.done", to = "finish.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("node.retry_exhausted"));
    assert!(result.error.unwrap_or_default().contains("3 attempt"));
}

#[tokio::test]
async fn skip_policy_masks_the_error_and_continues() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "flaky" {
        type = "script"
        config { code = "1 / 0" }
        output "out" { type = "number" }
        on_error {
          policy  = "skip"
          default = { out = 0 }
        }
      }
      node "finish" {
        type = "end"
        input "in" { from = "flaky.done" }
        input "out" { from = "flaky.out" }
      }
      connect "c1" { from = "entry.out", to = "flaky.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.outputs.get("out"), Some(&Value::Number(0.0)));
}

#[tokio::test]
async fn goto_policy_jumps_to_the_named_node() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "flaky" {
        type = "script"
        config { code = "1 / 0" }
        on_error {
          policy = "goto"
          target = "cleanup"
        }
      }
      node "cleanup" {
        type = "variable_set"
        config { name = "cleaned", value = "'yes'" }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "flaky.in" }
      connect "c2" { from = "flaky.done", to = "finish.in" }
      connect "c3" { from = "cleanup.out", to = "finish.in" }
    }"#;
    let ctx = harness.context(BTreeMap::new());
    let result = run_graph(&harness, doc, Arc::clone(&ctx)).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(ctx.get_var("cleaned"), Some(Value::String("yes".into())));
    assert!(!result.completed.contains("flaky"));
}

#[tokio::test]
async fn node_timeout_feeds_the_error_policy() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "slow" {
        type       = "delay"
        config { duration_ms = 60000 }
        timeout_ms = 80
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "slow.in" }
      connect "c2" { from = "slow.out", to = "finish.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.error_code.as_deref(), Some("workflow.timeout"));
}

#[tokio::test]
async fn cancellation_returns_cancelled_at_the_next_await() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "slow" {
        type = "delay"
        config { duration_ms = 60000 }
      }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "slow.in" }
      connect "c2" { from = "slow.out", to = "finish.in" }
    }"#;
    let ctx = harness.context(BTreeMap::new());
    let cancel = ctx.cancel_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = run_graph(&harness, doc, ctx).await;
    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert_eq!(result.error_code.as_deref(), Some("workflow.cancelled"));
}

const CHECKPOINT_DOC: &str = r#"graph "g" {
  node "a" { type = "start" }
  node "b" {
    type       = "script"
    checkpoint = true
    config { code = "return {out: 7}" }
    output "out" { type = "number" }
  }
  node "c" {
    type = "wait_event"
    config {
      topic      = "release.c"
      timeout_ms = 150
    }
    input "in" { from = "b.done" }
  }
  node "finish" {
    type = "end"
    input "in" { from = "c.out" }
    input "out" { from = "b.out" }
  }
  connect "c1" { from = "a.out", to = "b.in" }
}"#;

#[tokio::test]
async fn checkpoint_resume_skips_completed_nodes() {
    let harness = Harness::new();

    // First run: B checkpoints, C times out, workflow fails — simulating a
    // run torn down after B.
    let ctx = harness.context(BTreeMap::new());
    let session = ctx.session_id;
    let result = run_graph(&harness, CHECKPOINT_DOC, ctx).await;
    assert_eq!(result.status, WorkflowStatus::Failed);

    let checkpoints = harness.store().list_checkpoints(&session).unwrap();
    assert_eq!(checkpoints.len(), 1);
    let ckpt = checkpoints.into_iter().next().unwrap();
    assert!(ckpt.completed_nodes.contains("a"));
    assert!(ckpt.completed_nodes.contains("b"));
    assert!(!ckpt.completed_nodes.contains("c"));

    // Second run resumes from the checkpoint; A and B never re-execute.
    let mut starts = harness.collect("node_start");
    let ctx2 = harness.context_in(session, BTreeMap::new());
    let bus = harness.bus().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        bus.publish(Event::Custom { topic: "release.c".into(), payload: serde_json::json!({}) });
    });
    let result2 = harness
        .engine()
        .run(
            &harness.graph(CHECKPOINT_DOC),
            ctx2,
            RunOptions { resume: Some(ckpt), ..RunOptions::default() },
        )
        .await;
    assert_eq!(result2.status, WorkflowStatus::Completed);
    // Outputs match a single uninterrupted run's data flow.
    assert_eq!(result2.outputs.get("out"), Some(&Value::Number(7.0)));

    let mut started = Vec::new();
    while let Ok(event) = starts.try_recv() {
        if let Event::NodeStart { node_id, .. } = event {
            started.push(node_id);
        }
    }
    assert!(!started.contains(&"a".to_string()));
    assert!(!started.contains(&"b".to_string()));
    assert!(started.contains(&"c".to_string()));
}

#[tokio::test]
async fn subgraph_runs_child_graph_and_returns_outputs() {
    let harness = Harness::new();
    harness.graphs.insert(
        "child",
        r#"graph "child" {
          node "entry" { type = "start" }
          node "calc" {
            type = "script"
            config { code = "return {sum: base + 1}" }
            output "sum" { type = "number" }
          }
          node "finish" {
            type = "end"
            input "in" { from = "calc.done" }
            input "sum" { from = "calc.sum" }
          }
          connect "c1" { from = "entry.out", to = "calc.in" }
        }"#,
    );
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "sub" {
        type = "subgraph"
        config {
          path  = "child"
          input = { base = "{{value}}" }
        }
      }
      node "finish" {
        type = "end"
        input "in" { from = "sub.out" }
        input "result" { from = "sub.result" }
      }
      connect "c1" { from = "entry.out", to = "sub.in" }
    }"#;
    let ctx = harness.context(params(&[("value", Value::Number(41.0))]));
    let result = run_graph(&harness, doc, ctx).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    let sub_result = result.outputs.get("result").and_then(Value::as_map).unwrap();
    assert_eq!(sub_result.get("sum"), Some(&Value::Number(42.0)));
}

#[tokio::test]
async fn subgraph_depth_bound_is_enforced() {
    let harness = Harness::new();
    harness.graphs.insert(
        "recurse",
        r#"graph "recurse" {
          node "entry" { type = "start" }
          node "again" {
            type = "subgraph"
            config { path = "recurse" }
          }
          node "finish" {
            type = "end"
            input "in" { from = "again.out" }
          }
          connect "c1" { from = "entry.out", to = "again.in" }
        }"#,
    );
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "sub" {
        type = "subgraph"
        config { path = "recurse" }
      }
      node "finish" {
        type = "end"
        input "in" { from = "sub.out" }
      }
      connect "c1" { from = "entry.out", to = "sub.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    // The inner depth failure propagates as a workflow failure on the host.
    assert!(result.error.unwrap_or_default().contains("depth"));
}

#[tokio::test]
async fn mocked_nodes_short_circuit_and_skip_checkpoints() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "work" {
        type       = "agentic_work"
        checkpoint = true
        config {
          seat   = 1
          prompt = "never sent"
        }
      }
      node "finish" {
        type = "end"
        input "in" { from = "work.out" }
        input "reply" { from = "work.reply" }
      }
      connect "c1" { from = "entry.out", to = "work.in" }
    }"#;

    let mocks = HashMap::from([(
        "work".to_string(),
        BTreeMap::from([("reply".to_string(), Value::String("mocked".into()))]),
    )]);
    let ctx = harness.context(BTreeMap::new());
    let session = ctx.session_id;
    let (_, gate) = DebugController::new();
    let result = harness
        .engine()
        .run(
            &harness.graph(doc),
            ctx,
            RunOptions {
                debug: Some((DebugOptions { mocks, ..DebugOptions::default() }, gate)),
                ..RunOptions::default()
            },
        )
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.outputs.get("reply"), Some(&Value::String("mocked".into())));
    // Debug mode never persists checkpoints for mocked runs.
    assert!(harness.store().list_checkpoints(&session).unwrap().is_empty());
}

#[tokio::test]
async fn step_mode_waits_for_the_controller() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "finish" { type = "end" }
      connect "c1" { from = "entry.out", to = "finish.in" }
    }"#;

    let (controller, gate) = DebugController::new();
    let mut step_events = harness.collect("step");

    let engine = harness.engine();
    let graph = harness.graph(doc);
    let ctx = harness.context(BTreeMap::new());
    let run = tokio::spawn(async move {
        engine
            .run(
                &graph,
                ctx,
                RunOptions {
                    debug: Some((DebugOptions { step: true, ..DebugOptions::default() }, gate)),
                    ..RunOptions::default()
                },
            )
            .await
    });

    // The interpreter announces the pending node, then waits.
    let first = step_events.recv().await.unwrap();
    assert!(matches!(first, Event::Step { .. }));
    assert!(!run.is_finished());

    // Two permits walk it through both nodes.
    controller.step();
    controller.step();
    let result = run.await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn workflow_without_end_node_still_completes() {
    let harness = Harness::new();
    let doc = r#"graph "g" {
      node "entry" { type = "start" }
      node "emit" {
        type = "log"
        config { message = "done" }
      }
      connect "c1" { from = "entry.out", to = "emit.in" }
    }"#;
    let result = run_graph(&harness, doc, harness.context(BTreeMap::new())).await;
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.outputs.is_empty());
}
