// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus.
//!
//! Topics are the dotted event names; subscribers register handlers under an
//! owner token so cancelling an owner removes all of its handlers at once.
//! Publication is synchronous for inline handlers — a panicking handler is
//! isolated and never breaks the publisher — while `Dispatch::Worker`
//! handlers run on a bounded worker pool so slow consumers cannot stall
//! publication.

use gaffer_core::Event;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Number of worker tasks draining the slow-handler queue.
const WORKER_POOL_SIZE: usize = 4;
/// Bounded depth of the slow-handler queue.
const WORKER_QUEUE_DEPTH: usize = 256;

/// Handler registration token. All handlers registered under one token are
/// removed together by `unsubscribe_owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

/// How a handler is invoked on publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Called synchronously on the publisher's task. Must be fast.
    Inline,
    /// Queued to the bounded worker pool.
    Worker,
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    pattern: String,
    owner: OwnerToken,
    dispatch: Dispatch,
    handler: Handler,
}

struct BusInner {
    subs: Mutex<Vec<Subscription>>,
    worker_tx: mpsc::Sender<(Handler, Event)>,
    next_owner: AtomicU64,
    seq: AtomicU64,
}

/// Cloneable handle to the in-process bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create the bus and spawn its worker pool on the current runtime.
    pub fn new() -> Self {
        let (worker_tx, worker_rx) = mpsc::channel::<(Handler, Event)>(WORKER_QUEUE_DEPTH);
        let bus = Self {
            inner: Arc::new(BusInner {
                subs: Mutex::new(Vec::new()),
                worker_tx,
                next_owner: AtomicU64::new(1),
                seq: AtomicU64::new(0),
            }),
        };
        spawn_workers(worker_rx);
        bus
    }

    /// Mint a fresh owner token.
    pub fn owner(&self) -> OwnerToken {
        OwnerToken(self.inner.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler for a topic pattern.
    ///
    /// Patterns are exact topics, a trailing-`*` prefix (`session.*`), or
    /// `*` for everything.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        owner: OwnerToken,
        dispatch: Dispatch,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) {
        self.inner.subs.lock().push(Subscription {
            pattern: pattern.into(),
            owner,
            dispatch,
            handler: Arc::new(handler),
        });
    }

    /// Channel subscription: every matching event is cloned into the
    /// returned receiver. Used by `wait_event`, the coordinator, and IPC
    /// connections.
    pub fn subscribe_channel(
        &self,
        pattern: impl Into<String>,
        owner: OwnerToken,
    ) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(pattern, owner, Dispatch::Inline, move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Remove every handler registered under `owner`.
    pub fn unsubscribe_owner(&self, owner: OwnerToken) {
        self.inner.subs.lock().retain(|s| s.owner != owner);
    }

    /// Publish an event to all matching subscribers. Returns the event's
    /// sequence number. Per-topic total order follows from publication
    /// holding the subscription list lock only to snapshot handlers.
    pub fn publish(&self, event: Event) -> u64 {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic().to_string();

        let matching: Vec<(Dispatch, Handler)> = {
            let subs = self.inner.subs.lock();
            subs.iter()
                .filter(|s| topic_matches(&s.pattern, &topic))
                .map(|s| (s.dispatch, Arc::clone(&s.handler)))
                .collect()
        };

        for (dispatch, handler) in matching {
            match dispatch {
                Dispatch::Inline => {
                    // A panicking subscriber must never break the publisher.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        handler(&event)
                    }));
                    if result.is_err() {
                        tracing::error!(topic = %topic, "event handler panicked");
                    }
                }
                Dispatch::Worker => {
                    if self.inner.worker_tx.try_send((handler, event.clone())).is_err() {
                        tracing::warn!(topic = %topic, "worker queue full, dropping dispatch");
                    }
                }
            }
        }
        seq
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.subs.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_workers(worker_rx: mpsc::Receiver<(Handler, Event)>) {
    let shared = Arc::new(tokio::sync::Mutex::new(worker_rx));
    for _ in 0..WORKER_POOL_SIZE {
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                let item = { shared.lock().await.recv().await };
                match item {
                    Some((handler, event)) => {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                            || handler(&event),
                        ));
                        if result.is_err() {
                            tracing::error!(topic = %event.topic(), "worker handler panicked");
                        }
                    }
                    None => break,
                }
            }
        });
    }
}

/// Exact topic, `prefix.*`, or `*`.
fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" || pattern == topic {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => topic.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.')),
        None => false,
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
