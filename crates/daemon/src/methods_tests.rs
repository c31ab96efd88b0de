// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gaffer_core::{ErrorCode, SessionStatus};
use gaffer_engine::test_support::{wait_until, Harness};
use gaffer_wire::Method;

fn result_of(envelope: gaffer_wire::Envelope) -> serde_json::Value {
    assert!(envelope.error.is_none(), "unexpected error: {:?}", envelope.error);
    envelope.result.unwrap()
}

#[tokio::test]
async fn create_and_get_session() {
    let harness = Harness::new();
    let manager = harness.manager();

    let created = dispatch_method(
        &manager,
        Method::CreateSession { requirement: "add combo system".into(), docs: vec![] },
        1,
        0,
    );
    let id = result_of(created)["id"].as_str().unwrap().to_string();

    let got = dispatch_method(&manager, Method::GetSession { id: id.clone() }, 2, 0);
    let summary = result_of(got);
    assert_eq!(summary["requirement"], "add combo system");

    let probe = manager.clone();
    let probe_id = id.clone();
    wait_until("planning completes", move || {
        probe
            .get_session(&probe_id)
            .map(|s| s.status == SessionStatus::Reviewing)
            .unwrap_or(false)
    })
    .await;

    let list = dispatch_method(&manager, Method::ListSessions, 3, 0);
    assert_eq!(result_of(list).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_carries_uptime() {
    let harness = Harness::new();
    let snapshot = dispatch_method(&harness.manager(), Method::Snapshot, 1, 4321);
    assert_eq!(result_of(snapshot)["uptime_ms"], 4321);
}

#[tokio::test]
async fn pool_resize_and_status() {
    let harness = Harness::new();
    let manager = harness.manager();

    result_of(dispatch_method(&manager, Method::PoolResize { size: 4 }, 1, 0));
    let status = result_of(dispatch_method(&manager, Method::PoolStatus, 2, 0));
    assert_eq!(status["total"], 4);

    let refused = dispatch_method(&manager, Method::PoolResize { size: 0 }, 3, 0);
    assert_eq!(refused.error.unwrap().code, ErrorCode::PoolShrinkConflict);
}

#[tokio::test]
async fn errors_map_to_codes() {
    let harness = Harness::new();
    let manager = harness.manager();

    let missing = dispatch_method(&manager, Method::GetSession { id: "ses-x".into() }, 1, 0);
    assert_eq!(missing.error.unwrap().code, ErrorCode::SessionNotFound);

    let id = result_of(dispatch_method(
        &manager,
        Method::CreateSession { requirement: "x".into(), docs: vec![] },
        2,
        0,
    ))["id"]
        .as_str()
        .unwrap()
        .to_string();
    // Approving during planning is a bad transition.
    let bad = dispatch_method(
        &manager,
        Method::ApproveSession { id, auto_start: false },
        3,
        0,
    );
    assert_eq!(bad.error.unwrap().code, ErrorCode::SessionBadTransition);
}

#[tokio::test]
async fn read_plan_returns_versioned_text() {
    let harness = Harness::new();
    let manager = harness.manager();

    let id = result_of(dispatch_method(
        &manager,
        Method::CreateSession { requirement: "combo".into(), docs: vec![] },
        1,
        0,
    ))["id"]
        .as_str()
        .unwrap()
        .to_string();

    let probe = manager.clone();
    let probe_id = id.clone();
    wait_until("plan lands", move || {
        probe.get_session(&probe_id).map(|s| s.current_plan().is_some()).unwrap_or(false)
    })
    .await;

    let plan = result_of(dispatch_method(
        &manager,
        Method::ReadPlan { id: id.clone(), version: None },
        2,
        0,
    ));
    assert_eq!(plan["text"], "# Plan: combo");

    let explicit = result_of(dispatch_method(
        &manager,
        Method::ReadPlan { id, version: Some(1) },
        3,
        0,
    ));
    assert_eq!(explicit["text"], "# Plan: combo");
}
