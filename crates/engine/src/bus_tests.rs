// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn pool_event() -> Event {
    Event::PoolChanged { available: 1, busy: 0, resting: 0, total: 1 }
}

#[tokio::test]
async fn exact_topic_subscription_receives_events() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    bus.subscribe("pool.changed", bus.owner(), Dispatch::Inline, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(pool_event());
    bus.publish(Event::Custom { topic: "other.topic".into(), payload: serde_json::json!({}) });
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wildcard_patterns_match_prefixes() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));

    let all = Arc::clone(&count);
    bus.subscribe("*", bus.owner(), Dispatch::Inline, move |_| {
        all.fetch_add(100, Ordering::SeqCst);
    });
    let prefixed = Arc::clone(&count);
    bus.subscribe("session.*", bus.owner(), Dispatch::Inline, move |_| {
        prefixed.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(Event::SessionDeleted { id: gaffer_core::SessionId::from_string("ses-1") });
    assert_eq!(count.load(Ordering::SeqCst), 101);

    bus.publish(pool_event());
    assert_eq!(count.load(Ordering::SeqCst), 201);
}

#[tokio::test]
async fn unsubscribe_owner_removes_all_handlers_atomically() {
    let bus = EventBus::new();
    let owner = bus.owner();
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let counter = Arc::clone(&count);
        bus.subscribe("pool.changed", owner, Dispatch::Inline, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(bus.subscriber_count(), 3);

    bus.unsubscribe_owner(owner);
    assert_eq!(bus.subscriber_count(), 0);
    bus.publish(pool_event());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_handler_never_breaks_the_publisher() {
    let bus = EventBus::new();
    bus.subscribe("pool.changed", bus.owner(), Dispatch::Inline, |_| {
        panic!("subscriber bug");
    });
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    bus.subscribe("pool.changed", bus.owner(), Dispatch::Inline, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    // Publisher survives and later handlers still run.
    bus.publish(pool_event());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn worker_dispatch_runs_off_the_publisher_task() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    bus.subscribe("pool.changed", bus.owner(), Dispatch::Worker, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    bus.publish(pool_event());
    crate::test_support::wait_until("worker handler ran", || count.load(Ordering::SeqCst) == 1)
        .await;
}

#[tokio::test]
async fn channel_subscription_receives_clones() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe_channel("workflow.*", bus.owner());

    let event = Event::WorkflowPaused { id: gaffer_core::WorkflowId::from_string("wf-1") };
    bus.publish(event.clone());
    assert_eq!(rx.recv().await, Some(event));
}

#[tokio::test]
async fn sequence_numbers_ascend() {
    let bus = EventBus::new();
    let a = bus.publish(pool_event());
    let b = bus.publish(pool_event());
    assert!(b > a);
}
