// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The state store.
//!
//! Single writer per workspace; every file write is temp-then-atomic-rename
//! so external watchers (CLI, editor extension) only ever see whole files.
//! An in-memory index mirrors the on-disk sessions; `reload_from_files`
//! rebuilds it after external edits.

use crate::layout::Layout;
use gaffer_core::{AgentSlot, Checkpoint, Session, SessionId, SessionStatus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Minimum interval between change notifications to external watchers.
pub const NOTIFY_DEBOUNCE: Duration = Duration::from_millis(250);

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workspace lock already held: {path}")]
    LockHeld { path: PathBuf },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),
}

impl StoreError {
    /// Stable wire code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::LockHeld { .. } => "store.lock_held",
            StoreError::Io { .. } | StoreError::Corrupt { .. } => "store.io_error",
            StoreError::SessionNotFound(_) => "session.not_found",
        }
    }
}

/// Persisted pool snapshot (`.cache/pool.json`).
#[derive(Debug, Default, Serialize, Deserialize)]
struct PoolFile {
    slots: Vec<AgentSlot>,
}

/// Callback invoked (debounced) after state changes land on disk.
pub type ChangeNotifier = Box<dyn Fn() + Send + Sync>;

struct NotifyState {
    last_sent: Option<Instant>,
    pending: bool,
}

/// Durable, crash-safe storage of sessions, pool, and checkpoints.
pub struct StateStore {
    layout: Layout,
    /// Serializes all writes. Readers snapshot the in-memory index.
    write_lock: Mutex<()>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    notifier: Option<ChangeNotifier>,
    notify_state: Mutex<NotifyState>,
}

impl StateStore {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            write_lock: Mutex::new(()),
            sessions: Mutex::new(HashMap::new()),
            notifier: None,
            notify_state: Mutex::new(NotifyState { last_sent: None, pending: false }),
        }
    }

    /// Attach a debounced change notifier (external watcher refresh).
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Create directories and build the in-memory index from disk.
    /// Returns the number of sessions loaded.
    pub fn load(&self) -> Result<usize, StoreError> {
        create_dir(&self.layout.cache_dir())?;
        create_dir(&self.layout.plans_dir())?;
        self.reload_from_files()
    }

    /// Rebuild the in-memory index from the on-disk files.
    ///
    /// Unreadable session records are skipped with a warning rather than
    /// failing the whole reload; external writers own those files too.
    pub fn reload_from_files(&self) -> Result<usize, StoreError> {
        let _write = self.write_lock.lock();
        let mut loaded = HashMap::new();
        let plans = self.layout.plans_dir();
        if plans.exists() {
            let entries = std::fs::read_dir(&plans)
                .map_err(|source| StoreError::Io { path: plans.clone(), source })?;
            for entry in entries.flatten() {
                if !entry.path().is_dir() {
                    continue;
                }
                let record = entry.path().join("session.json");
                if !record.exists() {
                    continue;
                }
                match read_json::<Session>(&record) {
                    Ok(session) => {
                        loaded.insert(session.id, session);
                    }
                    Err(e) => {
                        tracing::warn!(path = %record.display(), error = %e, "skipping unreadable session record");
                    }
                }
            }
        }
        let count = loaded.len();
        *self.sessions.lock() = loaded;
        Ok(count)
    }

    // ---------------------------------------------------------- sessions

    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        let dir = self.layout.session_dir(&session.id);
        create_dir(&dir)?;
        write_json_atomic(&self.layout.session_json(&session.id), session)?;
        self.sessions.lock().insert(session.id, session.clone());
        drop(_write);
        self.notify_changed();
        Ok(())
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Completed sessions, most recently updated first, capped at `limit`.
    pub fn completed_sessions(&self, limit: usize) -> Vec<Session> {
        let mut done: Vec<Session> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.status == SessionStatus::Completed)
            .cloned()
            .collect();
        done.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        done.truncate(limit);
        done
    }

    /// Remove a session and its directory. The caller enforces the
    /// no-live-workflow precondition.
    pub fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        if self.sessions.lock().remove(id).is_none() {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        let dir = self.layout.session_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|source| StoreError::Io { path: dir, source })?;
        }
        drop(_write);
        self.notify_changed();
        Ok(())
    }

    // -------------------------------------------------------------- pool

    pub fn save_pool(&self, slots: &[AgentSlot]) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.cache_dir())?;
        write_json_atomic(&self.layout.pool_path(), &PoolFile { slots: slots.to_vec() })?;
        drop(_write);
        self.notify_changed();
        Ok(())
    }

    pub fn load_pool(&self) -> Result<Vec<AgentSlot>, StoreError> {
        let path = self.layout.pool_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(read_json::<PoolFile>(&path)?.slots)
    }

    // -------------------------------------------------------- checkpoints

    pub fn save_checkpoint(
        &self,
        session_id: &SessionId,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.checkpoints_dir(session_id))?;
        write_json_atomic(
            &self.layout.checkpoint_path(session_id, &checkpoint.workflow_id),
            checkpoint,
        )
    }

    pub fn load_checkpoint(
        &self,
        session_id: &SessionId,
        workflow_id: &str,
    ) -> Result<Option<Checkpoint>, StoreError> {
        let path = self.layout.checkpoint_path(session_id, workflow_id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    pub fn remove_checkpoint(
        &self,
        session_id: &SessionId,
        workflow_id: &str,
    ) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        let path = self.layout.checkpoint_path(session_id, workflow_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })?;
        }
        Ok(())
    }

    /// Checkpoints on disk for a session (newest runs still unresumed).
    pub fn list_checkpoints(&self, session_id: &SessionId) -> Result<Vec<Checkpoint>, StoreError> {
        let dir = self.layout.checkpoints_dir(session_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut checkpoints = Vec::new();
        let entries =
            std::fs::read_dir(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        for entry in entries.flatten() {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Checkpoint>(&entry.path()) {
                Ok(ckpt) => checkpoints.push(ckpt),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable checkpoint")
                }
            }
        }
        checkpoints.sort_by(|a, b| a.taken_at_ms.cmp(&b.taken_at_ms));
        Ok(checkpoints)
    }

    // ------------------------------------------------------------- plans

    /// Write a plan artifact for `version`, returning its path.
    pub fn write_plan(
        &self,
        session_id: &SessionId,
        version: u32,
        text: &str,
    ) -> Result<PathBuf, StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.session_dir(session_id))?;
        let path = self.layout.plan_path(session_id, version);
        write_atomic(&path, text.as_bytes())?;
        drop(_write);
        self.notify_changed();
        Ok(path)
    }

    pub fn read_plan(&self, session_id: &SessionId, version: u32) -> Result<String, StoreError> {
        let path = self.layout.plan_path(session_id, version);
        std::fs::read_to_string(&path).map_err(|source| StoreError::Io { path, source })
    }

    // -------------------------------------------------------------- logs

    /// Append one line to the session's progress log, stamped with UTC time.
    pub fn append_progress(&self, session_id: &SessionId, line: &str) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.session_dir(session_id))?;
        let path = self.layout.progress_log(session_id);
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        append(&path, format!("{stamp} {line}\n").as_bytes())
    }

    /// Append captured agent output to the per-agent log.
    pub fn append_agent_log(
        &self,
        session_id: &SessionId,
        agent: &str,
        chunk: &[u8],
    ) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.session_dir(session_id))?;
        append(&self.layout.agent_log(session_id, agent), chunk)
    }

    // --------------------------------------------------------- port file

    pub fn write_port_file(&self, port: u16) -> Result<(), StoreError> {
        let _write = self.write_lock.lock();
        create_dir(&self.layout.cache_dir())?;
        write_atomic(&self.layout.port_path(), port.to_string().as_bytes())
    }

    pub fn remove_port_file(&self) {
        let _ = std::fs::remove_file(self.layout.port_path());
    }

    // ------------------------------------------------------ notifications

    /// Emit the change notification, or mark it pending inside the
    /// debounce window. `flush_pending` delivers trailing notifications.
    fn notify_changed(&self) {
        let Some(notifier) = &self.notifier else { return };
        let mut state = self.notify_state.lock();
        let now = Instant::now();
        match state.last_sent {
            Some(last) if now.duration_since(last) < NOTIFY_DEBOUNCE => {
                state.pending = true;
            }
            _ => {
                state.last_sent = Some(now);
                state.pending = false;
                drop(state);
                notifier();
            }
        }
    }

    /// Deliver a pending notification once the debounce window has passed.
    /// Driven by the daemon's periodic flush tick.
    pub fn flush_pending(&self) {
        let Some(notifier) = &self.notifier else { return };
        let mut state = self.notify_state.lock();
        if !state.pending {
            return;
        }
        let now = Instant::now();
        if state.last_sent.map(|last| now.duration_since(last) >= NOTIFY_DEBOUNCE).unwrap_or(true) {
            state.last_sent = Some(now);
            state.pending = false;
            drop(state);
            notifier();
        }
    }
}

// ------------------------------------------------------------- file ops

fn create_dir(path: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(path)
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|source| StoreError::Corrupt { path: path.to_path_buf(), source })?;
    write_atomic(path, &json)
}

/// Write-temp-then-atomic-rename. The temp file lives next to the target so
/// the rename never crosses filesystems.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err =
        |source: std::io::Error| StoreError::Io { path: path.to_path_buf(), source };
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    std::fs::rename(&tmp, path).map_err(io_err)
}

fn append(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err =
        |source: std::io::Error| StoreError::Io { path: path.to_path_buf(), source };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(bytes).map_err(io_err)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
