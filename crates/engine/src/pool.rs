// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent pool: a bounded set of named worker slots.
//!
//! Slot names are minted once per workspace and persist across restarts.
//! Allocation requests wait in FIFO order per role; a release wakes exactly
//! one compatible waiter. Released slots rest for the configured duration
//! before returning to service.

use crate::bus::EventBus;
use crate::error::EngineError;
use gaffer_core::{AgentSlot, Clock, Event, SlotState, WorkflowId};
use gaffer_storage::StateStore;
use gaffer_wire::{PoolStatus, SlotDetail};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Pool size bounds (mirrors the config bounds).
pub const MIN_POOL_SIZE: usize = 1;
pub const MAX_POOL_SIZE: usize = 32;

/// Role → slot compatibility policy plug-in.
pub trait RolePolicy: Send + Sync {
    /// Whether the role exists at all. Unknown roles fail synchronously.
    fn knows(&self, role: &str) -> bool;

    /// Whether a slot may serve a role. Default policy: any role on any slot.
    fn permits(&self, role: &str, slot: &AgentSlot) -> bool;
}

/// The default policy: every role is known, every slot serves every role.
#[derive(Debug, Default, Clone)]
pub struct AnyRolePolicy;

impl RolePolicy for AnyRolePolicy {
    fn knows(&self, _role: &str) -> bool {
        true
    }

    fn permits(&self, _role: &str, _slot: &AgentSlot) -> bool {
        true
    }
}

struct Waiter {
    id: u64,
    role: String,
    tx: oneshot::Sender<String>,
}

struct PoolInner {
    slots: Vec<AgentSlot>,
    /// FIFO across roles; insertion order is service order.
    waiters: VecDeque<Waiter>,
    /// Slots to retire on release instead of returning to available.
    pending_retire: HashSet<String>,
    next_waiter_id: u64,
    /// Highest slot index ever minted; names are never reused.
    next_slot_index: usize,
}

/// The agent pool. Cloneable handle; all clones share state.
pub struct AgentPool<C: Clock> {
    inner: Arc<Mutex<PoolInner>>,
    clock: C,
    rest: Duration,
    policy: Arc<dyn RolePolicy>,
    bus: EventBus,
    store: Arc<StateStore>,
}

impl<C: Clock> Clone for AgentPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: self.clock.clone(),
            rest: self.rest,
            policy: Arc::clone(&self.policy),
            bus: self.bus.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: Clock> AgentPool<C> {
    /// Build the pool, restoring persisted slots and topping up to `size`.
    ///
    /// Restored `allocated`/`busy`/`resting` slots from a previous daemon
    /// lifetime are returned to `available` — their workflows died with the
    /// daemon and recovery re-requests what it needs.
    pub fn new(
        size: usize,
        rest: Duration,
        policy: Arc<dyn RolePolicy>,
        clock: C,
        bus: EventBus,
        store: Arc<StateStore>,
    ) -> Result<Self, EngineError> {
        let mut slots = store.load_pool()?;
        for slot in &mut slots {
            if matches!(slot.state, SlotState::Allocated | SlotState::Busy | SlotState::Resting) {
                slot.state = SlotState::Available;
                slot.clear_allocation();
                slot.rest_until_ms = None;
            }
        }
        let mut next_slot_index = slots
            .iter()
            .filter_map(|s| s.name.strip_prefix("agent-").and_then(|n| n.parse::<usize>().ok()))
            .max()
            .unwrap_or(0);
        while slots.iter().filter(|s| s.state != SlotState::Retired).count() < size {
            next_slot_index += 1;
            slots.push(AgentSlot::new(format!("agent-{next_slot_index}")));
        }

        let pool = Self {
            inner: Arc::new(Mutex::new(PoolInner {
                slots,
                waiters: VecDeque::new(),
                pending_retire: HashSet::new(),
                next_waiter_id: 0,
                next_slot_index,
            })),
            clock,
            rest,
            policy,
            bus,
            store,
        };
        pool.persist_and_announce();
        Ok(pool)
    }

    /// Allocate a slot for `role`, waiting up to `timeout` in FIFO order.
    ///
    /// `timeout` of zero fails immediately when no slot is free. The
    /// cancellation token interrupts an in-flight wait.
    pub async fn request(
        &self,
        role: &str,
        timeout: Duration,
        owner: WorkflowId,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<String, EngineError> {
        if !self.policy.knows(role) {
            return Err(EngineError::PoolUnknownRole { role: role.to_string() });
        }

        let (waiter_id, rx) = {
            let mut inner = self.inner.lock();
            if let Some(name) = self.try_allocate_locked(&mut inner, role, owner) {
                drop(inner);
                self.persist_and_announce();
                return Ok(name);
            }
            if timeout.is_zero() {
                return Err(EngineError::PoolTimeout { role: role.to_string() });
            }
            let (tx, rx) = oneshot::channel();
            inner.next_waiter_id += 1;
            let id = inner.next_waiter_id;
            inner.waiters.push_back(Waiter { id, role: role.to_string(), tx });
            (id, rx)
        };

        tokio::select! {
            result = rx => match result {
                Ok(name) => {
                    // Slot was already marked allocated by the releaser;
                    // stamp ownership.
                    self.stamp_owner(&name, role, owner);
                    self.persist_and_announce();
                    Ok(name)
                }
                Err(_) => Err(EngineError::PoolTimeout { role: role.to_string() }),
            },
            _ = tokio::time::sleep(timeout) => {
                self.remove_waiter(waiter_id);
                Err(EngineError::PoolTimeout { role: role.to_string() })
            }
            _ = cancel.cancelled() => {
                self.remove_waiter(waiter_id);
                Err(EngineError::Cancelled)
            }
        }
    }

    /// Mark an allocated slot busy (an agent process is running on it).
    pub fn mark_busy(&self, name: &str) {
        {
            let mut inner = self.inner.lock();
            if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) {
                if slot.state == SlotState::Allocated {
                    slot.state = SlotState::Busy;
                }
            }
        }
        self.persist_and_announce();
    }

    /// Release a slot back to the pool, honoring the rest period.
    /// Releasing an unknown or idle slot is a warning no-op.
    pub fn release(&self, name: &str) {
        self.release_inner(name, false);
    }

    /// Release bypassing rest (stop/cancel paths).
    pub fn force_release(&self, name: &str) {
        self.release_inner(name, true);
    }

    fn release_inner(&self, name: &str, force: bool) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) else {
            tracing::warn!(slot = name, "release of unknown slot ignored");
            return;
        };
        if !matches!(slot.state, SlotState::Allocated | SlotState::Busy) {
            tracing::warn!(slot = name, state = %slot.state, "release of idle slot ignored");
            return;
        }

        slot.clear_allocation();
        let retire = inner.pending_retire.remove(name);
        let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) else { return };

        if retire {
            slot.state = SlotState::Retired;
            drop(inner);
            self.persist_and_announce();
            return;
        }

        if force || self.rest.is_zero() {
            self.make_available_locked(&mut inner, name);
            drop(inner);
            self.persist_and_announce();
            return;
        }

        slot.state = SlotState::Resting;
        slot.rest_until_ms = Some(self.clock.epoch_ms() + self.rest.as_millis() as u64);
        drop(inner);
        self.persist_and_announce();

        // Rest timer: return to available (and serve a waiter) once elapsed.
        let pool = self.clone();
        let name = name.to_string();
        let rest = self.rest;
        tokio::spawn(async move {
            tokio::time::sleep(rest).await;
            {
                let mut inner = pool.inner.lock();
                let still_resting = inner
                    .slots
                    .iter()
                    .any(|s| s.name == name && s.state == SlotState::Resting);
                if !still_resting {
                    return;
                }
                pool.make_available_locked(&mut inner, &name);
            }
            pool.persist_and_announce();
        });
    }

    /// Grow or shrink the pool to `size` non-retired slots.
    pub fn resize(&self, size: usize) -> Result<(), EngineError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(EngineError::PoolShrinkConflict {
                requested: size,
                reason: format!("size must be within {MIN_POOL_SIZE}..={MAX_POOL_SIZE}"),
            });
        }
        {
            let mut inner = self.inner.lock();
            let active = inner.slots.iter().filter(|s| s.state != SlotState::Retired).count();

            if size > active {
                for _ in 0..(size - active) {
                    inner.next_slot_index += 1;
                    let name = format!("agent-{}", inner.next_slot_index);
                    inner.slots.push(AgentSlot::new(name));
                }
            } else if size < active {
                let mut excess = active - size;
                // Retire free slots first.
                let free: Vec<String> = inner
                    .slots
                    .iter()
                    .filter(|s| s.is_free() || s.state == SlotState::Resting)
                    .map(|s| s.name.clone())
                    .take(excess)
                    .collect();
                for name in &free {
                    if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == *name) {
                        slot.state = SlotState::Retired;
                        slot.clear_allocation();
                        slot.rest_until_ms = None;
                        excess -= 1;
                    }
                }
                // Busy slots retire when their current allocation releases.
                if excess > 0 {
                    let busy: Vec<String> = inner
                        .slots
                        .iter()
                        .filter(|s| matches!(s.state, SlotState::Allocated | SlotState::Busy))
                        .map(|s| s.name.clone())
                        .take(excess)
                        .collect();
                    for name in busy {
                        inner.pending_retire.insert(name);
                    }
                }
            }
        }
        self.persist_and_announce();
        Ok(())
    }

    /// Pool status counts plus per-slot detail.
    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock();
        let mut status = PoolStatus { available: 0, busy: 0, resting: 0, total: 0, slots: vec![] };
        for slot in &inner.slots {
            if slot.state == SlotState::Retired {
                continue;
            }
            status.total += 1;
            match slot.state {
                SlotState::Available => status.available += 1,
                SlotState::Allocated | SlotState::Busy => status.busy += 1,
                SlotState::Resting => status.resting += 1,
                SlotState::Retired => {}
            }
            status.slots.push(SlotDetail {
                name: slot.name.clone(),
                state: slot.state,
                role: slot.role.clone(),
                workflow_id: slot.workflow_id.map(|id| id.to_string()),
            });
        }
        status
    }

    /// Release every slot held by a workflow (cancel/stop path).
    pub fn force_release_owner(&self, owner: WorkflowId) {
        let held: Vec<String> = {
            let inner = self.inner.lock();
            inner
                .slots
                .iter()
                .filter(|s| s.workflow_id == Some(owner))
                .map(|s| s.name.clone())
                .collect()
        };
        for name in held {
            self.force_release(&name);
        }
    }

    // ------------------------------------------------------------ internal

    /// Find and claim an available compatible slot. Caller persists.
    fn try_allocate_locked(
        &self,
        inner: &mut PoolInner,
        role: &str,
        owner: WorkflowId,
    ) -> Option<String> {
        let now_ms = self.clock.epoch_ms();
        let policy = &self.policy;
        let slot = inner
            .slots
            .iter_mut()
            .find(|s| s.is_free() && policy.permits(role, s))?;
        slot.state = SlotState::Allocated;
        slot.role = Some(role.to_string());
        slot.workflow_id = Some(owner);
        slot.allocated_at_ms = Some(now_ms);
        Some(slot.name.clone())
    }

    /// Transition a slot to available, or hand it straight to the oldest
    /// compatible waiter. Exactly one waiter is woken.
    fn make_available_locked(&self, inner: &mut PoolInner, name: &str) {
        // Serve the oldest compatible waiter, skipping any whose receiver
        // is already gone (timed out or cancelled).
        loop {
            let candidate = {
                let slots = &inner.slots;
                let slot = match slots.iter().find(|s| s.name == name) {
                    Some(slot) => slot.clone(),
                    None => return,
                };
                inner
                    .waiters
                    .iter()
                    .position(|w| !w.tx.is_closed() && self.policy.permits(&w.role, &slot))
            };
            match candidate {
                Some(pos) => {
                    let Some(waiter) = inner.waiters.remove(pos) else { return };
                    if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) {
                        slot.state = SlotState::Allocated;
                        slot.rest_until_ms = None;
                        slot.role = Some(waiter.role.clone());
                        slot.allocated_at_ms = Some(self.clock.epoch_ms());
                    }
                    if waiter.tx.send(name.to_string()).is_ok() {
                        return;
                    }
                    // Receiver vanished between the check and the send; put
                    // the slot back and try the next waiter.
                    if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) {
                        slot.state = SlotState::Available;
                        slot.clear_allocation();
                    }
                }
                None => {
                    if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) {
                        slot.state = SlotState::Available;
                        slot.clear_allocation();
                        slot.rest_until_ms = None;
                    }
                    return;
                }
            }
        }
    }

    fn stamp_owner(&self, name: &str, role: &str, owner: WorkflowId) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.iter_mut().find(|s| s.name == name) {
            slot.workflow_id = Some(owner);
            slot.role = Some(role.to_string());
        }
    }

    fn remove_waiter(&self, waiter_id: u64) {
        self.inner.lock().waiters.retain(|w| w.id != waiter_id);
    }

    fn persist_and_announce(&self) {
        let slots = self.inner.lock().slots.clone();
        if let Err(e) = self.store.save_pool(&slots) {
            tracing::error!(error = %e, "failed to persist pool snapshot");
        }
        let status = self.status();
        self.bus.publish(Event::PoolChanged {
            available: status.available,
            busy: status.busy,
            resting: status.resting,
            total: status.total,
        });
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
