// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor.
//!
//! Spawns child agent processes, captures their streams line-by-line into
//! per-agent log files, tracks activity for stuck detection, enforces
//! per-process budgets, and sweeps orphans left by previous daemon
//! lifetimes. The supervisor is the only mutator of process records.

use crate::bus::EventBus;
use crate::error::EngineError;
use gaffer_core::{Clock, Event, ProcessId, ProcessRecord, SessionId, WorkflowId};
use gaffer_storage::StateStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Grace period between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// What to run and where its output goes.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Shell command line (run via `sh -c`).
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub owner: WorkflowId,
    pub session_id: SessionId,
    /// Log file tag: output lands in `agent-<log_name>.log`.
    pub log_name: String,
    /// Per-process budget; `None` means unbounded.
    pub timeout: Option<Duration>,
}

/// Terminal outcome of a supervised process.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Exited { exit_code: Option<i32> },
    TimedOut,
    KilledStuck { idle_ms: u64 },
    Killed,
}

struct Tracked {
    record: ProcessRecord,
    cancel: CancellationToken,
    /// Set by kill paths so the wait task reports the right outcome.
    forced: Option<ProcessOutcome>,
}

struct SupInner {
    processes: HashMap<ProcessId, Tracked>,
}

/// Cloneable supervisor handle.
pub struct ProcessSupervisor<C: Clock> {
    inner: Arc<Mutex<SupInner>>,
    clock: C,
    bus: EventBus,
    store: Arc<StateStore>,
    stuck_threshold: Duration,
}

impl<C: Clock> Clone for ProcessSupervisor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: self.clock.clone(),
            bus: self.bus.clone(),
            store: Arc::clone(&self.store),
            stuck_threshold: self.stuck_threshold,
        }
    }
}

impl<C: Clock> ProcessSupervisor<C> {
    pub fn new(
        clock: C,
        bus: EventBus,
        store: Arc<StateStore>,
        stuck_threshold: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SupInner { processes: HashMap::new() })),
            clock,
            bus,
            store,
            stuck_threshold,
        }
    }

    /// Spawn a child. Failure surfaces synchronously; completion arrives on
    /// the returned receiver and as a `process.exited` event.
    pub fn start(
        &self,
        spec: SpawnSpec,
    ) -> Result<(ProcessId, oneshot::Receiver<ProcessOutcome>), EngineError> {
        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(&spec.command);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child =
            command.spawn().map_err(|e| EngineError::SpawnFailed(e.to_string()))?;

        let id = ProcessId::new();
        let now_ms = self.clock.epoch_ms();
        let record = ProcessRecord {
            id,
            pid: child.id(),
            command: spec.command.clone(),
            owner: spec.owner,
            started_at_ms: now_ms,
            last_activity_ms: now_ms,
            stdout_bytes: 0,
            stderr_bytes: 0,
        };
        let cancel = CancellationToken::new();
        self.inner
            .lock()
            .processes
            .insert(id, Tracked { record, cancel: cancel.clone(), forced: None });

        // Stream readers: every captured byte refreshes last-activity.
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader(id, &spec, stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader(id, &spec, stderr, true);
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.spawn_waiter(id, spec, child, cancel, done_tx);
        Ok((id, done_rx))
    }

    fn spawn_reader(
        &self,
        id: ProcessId,
        spec: &SpawnSpec,
        stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
        is_stderr: bool,
    ) {
        let supervisor = self.clone();
        let session_id = spec.session_id;
        let log_name = spec.log_name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let bytes = line.len() as u64 + 1;
                {
                    let mut inner = supervisor.inner.lock();
                    if let Some(tracked) = inner.processes.get_mut(&id) {
                        tracked.record.last_activity_ms = supervisor.clock.epoch_ms();
                        if is_stderr {
                            tracked.record.stderr_bytes += bytes;
                        } else {
                            tracked.record.stdout_bytes += bytes;
                        }
                    }
                }
                let prefix = if is_stderr { "[stderr] " } else { "" };
                let entry = format!("{prefix}{line}\n");
                if let Err(e) =
                    supervisor.store.append_agent_log(&session_id, &log_name, entry.as_bytes())
                {
                    tracing::warn!(error = %e, "failed to append agent log");
                }
            }
        });
    }

    fn spawn_waiter(
        &self,
        id: ProcessId,
        spec: SpawnSpec,
        mut child: tokio::process::Child,
        cancel: CancellationToken,
        done_tx: oneshot::Sender<ProcessOutcome>,
    ) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let budget = spec.timeout.unwrap_or(Duration::MAX);
            let outcome = tokio::select! {
                status = child.wait() => {
                    let exit_code = status.ok().and_then(|s| s.code());
                    // A kill path may have terminated the child; report the
                    // forced outcome instead of a plain exit.
                    let forced = supervisor
                        .inner
                        .lock()
                        .processes
                        .get(&id)
                        .and_then(|t| t.forced.clone());
                    forced.unwrap_or(ProcessOutcome::Exited { exit_code })
                }
                _ = tokio::time::sleep(budget) => {
                    supervisor.terminate_child(&mut child).await;
                    ProcessOutcome::TimedOut
                }
                _ = cancel.cancelled() => {
                    supervisor.terminate_child(&mut child).await;
                    let forced = supervisor
                        .inner
                        .lock()
                        .processes
                        .get(&id)
                        .and_then(|t| t.forced.clone());
                    forced.unwrap_or(ProcessOutcome::Killed)
                }
            };

            // Reap the record; invariant: tracked set only holds live
            // processes.
            supervisor.inner.lock().processes.remove(&id);

            let exit_code = match &outcome {
                ProcessOutcome::Exited { exit_code } => *exit_code,
                _ => None,
            };
            supervisor.bus.publish(Event::ProcessExited {
                id,
                workflow_id: spec.owner,
                exit_code,
            });
            let _ = done_tx.send(outcome);
        });
    }

    /// Graceful terminate, escalating to a group kill after the grace
    /// period (or immediately when `force`).
    pub fn stop(&self, id: ProcessId, force: bool) {
        let inner = self.inner.lock();
        let Some(tracked) = inner.processes.get(&id) else { return };
        if force {
            if let Some(pid) = tracked.record.pid {
                kill_group(pid, true);
            }
        }
        tracked.cancel.cancel();
    }

    /// Stop every process owned by a workflow (cancel path).
    pub fn stop_owner(&self, owner: WorkflowId) {
        let ids: Vec<ProcessId> = {
            let inner = self.inner.lock();
            inner
                .processes
                .values()
                .filter(|t| t.record.owner == owner)
                .map(|t| t.record.id)
                .collect()
        };
        for id in ids {
            self.stop(id, false);
        }
    }

    /// Kill every process whose inactivity exceeds the stuck threshold.
    /// Returns the killed ids.
    pub fn kill_stuck(&self) -> Vec<ProcessId> {
        let now_ms = self.clock.epoch_ms();
        let threshold_ms = self.stuck_threshold.as_millis() as u64;
        let stuck: Vec<(ProcessId, WorkflowId, u64)> = {
            let mut inner = self.inner.lock();
            inner
                .processes
                .values_mut()
                .filter(|t| t.record.idle_ms(now_ms) > threshold_ms)
                .map(|t| {
                    let idle_ms = t.record.idle_ms(now_ms);
                    t.forced = Some(ProcessOutcome::KilledStuck { idle_ms });
                    (t.record.id, t.record.owner, idle_ms)
                })
                .collect()
        };
        for (id, workflow_id, idle_ms) in &stuck {
            tracing::warn!(process = %id, idle_ms, "killing stuck process");
            self.bus.publish(Event::ProcessStuck {
                id: *id,
                workflow_id: *workflow_id,
                idle_ms: *idle_ms,
            });
            self.stop(*id, true);
        }
        stuck.into_iter().map(|(id, _, _)| id).collect()
    }

    /// Kill OS processes matching `signature` that this daemon does not
    /// track. An empty signature disables the sweep entirely — when in
    /// doubt, don't kill.
    pub fn kill_orphans(&self, signature: &str) -> Vec<u32> {
        if signature.trim().is_empty() {
            return Vec::new();
        }
        let tracked: std::collections::HashSet<u32> = {
            let inner = self.inner.lock();
            inner.processes.values().filter_map(|t| t.record.pid).collect()
        };
        let own_pid = std::process::id();
        let mut killed = Vec::new();
        for (pid, command) in list_processes() {
            if pid == own_pid || tracked.contains(&pid) {
                continue;
            }
            if command.contains(signature) {
                tracing::warn!(pid, command = %command, "killing orphan process");
                kill_group(pid, false);
                killed.push(pid);
            }
        }
        killed
    }

    /// Snapshot of tracked records.
    pub fn records(&self) -> Vec<ProcessRecord> {
        self.inner.lock().processes.values().map(|t| t.record.clone()).collect()
    }

    /// Periodic heartbeat: stuck sweep on every tick until `shutdown`.
    pub fn spawn_heartbeat(&self, interval: Duration, shutdown: CancellationToken) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        supervisor.kill_stuck();
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    async fn terminate_child(&self, child: &mut tokio::process::Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            kill_group(pid, false);
            if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
                return;
            }
            kill_group(pid, true);
        }
        let _ = child.kill().await;
    }
}

/// Send SIGTERM (or SIGKILL) to a process group on unix; fall back to the
/// single pid when the group signal fails.
#[cfg(unix)]
fn kill_group(pid: u32, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    let group = Pid::from_raw(-(pid as i32));
    if kill(group, signal).is_err() {
        let _ = kill(Pid::from_raw(pid as i32), signal);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32, _force: bool) {}

/// Enumerate (pid, command line) pairs via `ps` (portable across unixes).
#[cfg(unix)]
fn list_processes() -> Vec<(u32, String)> {
    let output = match std::process::Command::new("ps").args(["-axo", "pid=,args="]).output() {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "orphan sweep: ps failed");
            return Vec::new();
        }
    };
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let (pid, rest) = trimmed.split_once(' ')?;
            Some((pid.parse().ok()?, rest.trim().to_string()))
        })
        .collect()
}

#[cfg(not(unix))]
fn list_processes() -> Vec<(u32, String)> {
    Vec::new()
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
