// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::session::SessionId;

#[test]
fn terminal_statuses() {
    assert!(WorkflowStatus::Completed.is_terminal());
    assert!(WorkflowStatus::Failed.is_terminal());
    assert!(WorkflowStatus::Cancelled.is_terminal());
    assert!(!WorkflowStatus::Running.is_terminal());
    assert!(!WorkflowStatus::Paused.is_terminal());
    assert!(!WorkflowStatus::Queued.is_terminal());
}

#[test]
fn new_instance_starts_queued() {
    let wf = WorkflowInstance::new(
        WorkflowId::from_string("wf-1"),
        SessionId::from_string("ses-1"),
        "planning",
        WorkflowKind::Planning,
        500,
    );
    assert_eq!(wf.status, WorkflowStatus::Queued);
    assert_eq!(wf.started_at_ms, 500);
    assert!(wf.node_results.is_empty());
}

#[test]
fn checkpoint_serde_round_trip() {
    let mut node_results = BTreeMap::new();
    let mut outputs = BTreeMap::new();
    outputs.insert("out".to_string(), Value::Number(9.0));
    node_results.insert("square".to_string(), outputs);

    let mut variables = BTreeMap::new();
    variables.insert("total".to_string(), Value::Number(14.0));

    let ckpt = Checkpoint {
        workflow_id: WorkflowId::from_string("wf-1"),
        graph: "execute".to_string(),
        taken_at_ms: 123,
        completed_nodes: BTreeSet::from(["start".to_string(), "square".to_string()]),
        variables,
        node_results,
        running_nodes: BTreeSet::from(["emit".to_string()]),
    };

    let json = serde_json::to_string_pretty(&ckpt).unwrap();
    let back: Checkpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ckpt);
}

#[test]
fn workflow_kind_display() {
    assert_eq!(WorkflowKind::SingleTask.to_string(), "single_task");
    assert_eq!(WorkflowKind::Planning.to_string(), "planning");
}
