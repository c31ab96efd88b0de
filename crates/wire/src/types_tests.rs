// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::{SessionStatus, SlotState, WorkflowKind, WorkflowStatus};

#[test]
fn snapshot_round_trips() {
    let snapshot = StateSnapshot {
        sessions: vec![SessionSummary {
            id: "ses-1".into(),
            requirement: "add combo system".into(),
            status: SessionStatus::Executing,
            plan_version: Some(2),
            created_at_ms: 1,
            updated_at_ms: 2,
            live_workflow: Some("wf-1".into()),
        }],
        pool: PoolStatus {
            available: 1,
            busy: 1,
            resting: 0,
            total: 2,
            slots: vec![SlotDetail {
                name: "agent-1".into(),
                state: SlotState::Busy,
                role: Some("engineer".into()),
                workflow_id: Some("wf-1".into()),
            }],
        },
        workflows: vec![WorkflowSummary {
            id: "wf-1".into(),
            session_id: "ses-1".into(),
            graph: "execute".into(),
            kind: WorkflowKind::Execute,
            status: WorkflowStatus::Running,
            started_at_ms: 1,
            ended_at_ms: None,
        }],
        uptime_ms: 1234,
    };
    let json = serde_json::to_string(&snapshot).unwrap();
    let back: StateSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
