// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup, background tasks, and shutdown.
//!
//! Startup order: config (exit 64 on invalid) → workspace lock (exit 69
//! when another daemon holds it) → store load → component wiring → socket
//! bind + port file → orphan sweep → session recovery. Everything else is
//! unexpected (exit 70).

use crate::listener::Listener;
use gaffer_core::{DaemonConfig, Event, SystemClock};
use gaffer_engine::{
    backend_for, AnyRolePolicy, Coordinator, Dispatch, EngineDeps, EventBus, FileGraphSource,
    SessionManager,
};
use gaffer_engine::{AgentPool, ProcessSupervisor};
use gaffer_storage::{Layout, StateStore, WorkspaceLock, DEFAULT_STALE_TTL};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Supervisor heartbeat cadence for the stuck-process sweep.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] gaffer_core::config::ConfigError),

    #[error("workspace already locked: {0}")]
    LockHeld(PathBuf),

    #[error("storage error: {0}")]
    Store(#[from] gaffer_storage::StoreError),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    /// Documented daemon exit codes.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Config(_) => 64,
            LifecycleError::LockHeld(_) => 69,
            _ => 70,
        }
    }
}

/// A running daemon.
pub struct Daemon {
    pub config: DaemonConfig,
    pub sessions: SessionManager<SystemClock>,
    pub deps: Arc<EngineDeps<SystemClock>>,
    pub port: u16,
    start_time: Instant,
    shutdown: CancellationToken,
    // Held for the daemon's lifetime.
    _lock: WorkspaceLock,
}

impl Daemon {
    /// Build and start a daemon rooted at `workspace`.
    pub async fn start(workspace: &Path) -> Result<Self, LifecycleError> {
        let config = DaemonConfig::load(workspace)?;
        let working_dir = config.working_dir(workspace);
        let layout = Layout::new(working_dir.clone());

        // Lock first; everything after this owns the workspace.
        let lock = WorkspaceLock::acquire(&layout.lock_path(), DEFAULT_STALE_TTL).map_err(
            |e| match e {
                gaffer_storage::StoreError::LockHeld { path } => LifecycleError::LockHeld(path),
                other => LifecycleError::Store(other),
            },
        )?;

        let store = Arc::new(StateStore::new(layout));
        let loaded = store.load()?;
        info!(sessions = loaded, "state loaded");

        let bus = EventBus::new();
        let clock = SystemClock;
        let pool = AgentPool::new(
            config.agent_pool_size,
            config.rest_duration(),
            Arc::new(AnyRolePolicy),
            clock.clone(),
            bus.clone(),
            Arc::clone(&store),
        )
        .map_err(|e| LifecycleError::Internal(e.to_string()))?;
        let supervisor = ProcessSupervisor::new(
            clock.clone(),
            bus.clone(),
            Arc::clone(&store),
            config.stuck_threshold(),
        );

        let registry = Arc::new(gaffer_graph::builtin_registry());
        let graphs = Arc::new(FileGraphSource::new(
            working_dir.join("graphs"),
            Arc::clone(&registry),
        ));

        let deps = Arc::new(EngineDeps {
            clock,
            config: config.clone(),
            bus: bus.clone(),
            store: Arc::clone(&store),
            pool,
            supervisor,
            backend: backend_for(config.default_agent_backend),
            registry,
            graphs,
        });
        let sessions = SessionManager::new(Arc::clone(&deps));

        let shutdown = CancellationToken::new();

        // Coordinator loop, woken by completion events.
        let coordinator = Arc::new(Coordinator::new(
            sessions.clone(),
            config.debounce(),
            config.cooldown(),
        ));
        for topic in ["workflow.completed", "session.updated", "task.failedFinal"] {
            let coord = Arc::clone(&coordinator);
            bus.subscribe(topic, bus.owner(), Dispatch::Inline, move |_| coord.notify());
        }
        {
            let coord = Arc::clone(&coordinator);
            let token = shutdown.clone();
            tokio::spawn(async move { coord.run(token).await });
        }

        // Supervisor heartbeat: stuck sweep.
        deps.supervisor.spawn_heartbeat(HEARTBEAT_INTERVAL, shutdown.clone());

        // Store flush cadence (debounced watcher notifications).
        {
            let store = Arc::clone(&store);
            let token = shutdown.clone();
            let interval = Duration::from_millis(config.state_update_interval_ms);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => store.flush_pending(),
                        _ = token.cancelled() => break,
                    }
                }
            });
        }

        // IPC: loopback TCP, port discovered via the well-known file.
        let tcp = TcpListener::bind(("127.0.0.1", 0)).await.map_err(LifecycleError::Bind)?;
        let port = tcp.local_addr().map_err(LifecycleError::Bind)?.port();
        store.write_port_file(port)?;
        let listener = Listener::new(sessions.clone(), bus.clone(), Instant::now());
        listener.spawn(tcp, shutdown.clone());

        // Orphans from previous daemon lifetimes.
        let orphans = deps.supervisor.kill_orphans(&config.orphan_signature);
        if !orphans.is_empty() {
            warn!(count = orphans.len(), "killed orphan processes");
        }

        // Resume non-terminal sessions.
        let recovered = sessions.recover_all();
        if recovered > 0 {
            info!(recovered, "sessions recovered");
        }

        bus.publish(Event::Custom {
            topic: "daemon.ready".to_string(),
            payload: serde_json::json!({ "port": port }),
        });
        info!(port, "daemon started");

        Ok(Self {
            config,
            sessions,
            deps,
            port,
            start_time: Instant::now(),
            shutdown,
            _lock: lock,
        })
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Block until SIGINT/SIGTERM (or an explicit shutdown), then unwind.
    pub async fn run_until_signal(self) {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = ctrl_c => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        self.stop().await;
    }

    /// Graceful shutdown: stop dispatching, cancel workflows, reclaim
    /// agents, remove the port file, release the lock.
    pub async fn stop(self) {
        info!("daemon shutting down");
        self.shutdown.cancel();

        for session in self.sessions.sessions() {
            if let Some(workflow) = session.live_workflow {
                let _ = self.sessions.stop_workflow(&workflow.to_string());
            }
        }
        // Give interpreters a moment to observe cancellation.
        tokio::time::sleep(Duration::from_millis(100)).await;

        self.deps.store.remove_port_file();
        info!("daemon stopped");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
