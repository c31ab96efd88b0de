// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine dependency bundle.
//!
//! Built once by the daemon's root builder and shared by the interpreter,
//! session manager, and coordinator. No global registries: tests construct
//! as many independent bundles as they like.

use crate::backend::AgentBackend;
use crate::bus::EventBus;
use crate::error::EngineError;
use crate::pool::AgentPool;
use crate::supervisor::ProcessSupervisor;
use gaffer_core::{Clock, DaemonConfig};
use gaffer_graph::{load_graph_file, Graph, NodeRegistry};
use gaffer_storage::StateStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Where workflow graphs come from.
pub trait GraphSource: Send + Sync {
    /// Resolve a graph by name (session workflows) or relative path
    /// (subgraph nodes).
    fn load(&self, name: &str) -> Result<Graph, EngineError>;
}

/// Loads `<dir>/<name>.hcl` through the graph loader.
pub struct FileGraphSource {
    dir: PathBuf,
    registry: Arc<NodeRegistry>,
}

impl FileGraphSource {
    pub fn new(dir: PathBuf, registry: Arc<NodeRegistry>) -> Self {
        Self { dir, registry }
    }
}

impl GraphSource for FileGraphSource {
    fn load(&self, name: &str) -> Result<Graph, EngineError> {
        let file = if name.ends_with(".hcl") {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{name}.hcl"))
        };
        let (graph, _warnings) =
            load_graph_file(&file, &self.registry).map_err(|e| EngineError::Graph(e.to_string()))?;
        Ok(graph)
    }
}

/// Shared dependency bundle for everything the engine runs.
pub struct EngineDeps<C: Clock> {
    pub clock: C,
    pub config: DaemonConfig,
    pub bus: EventBus,
    pub store: Arc<StateStore>,
    pub pool: AgentPool<C>,
    pub supervisor: ProcessSupervisor<C>,
    pub backend: Arc<dyn AgentBackend>,
    pub registry: Arc<NodeRegistry>,
    pub graphs: Arc<dyn GraphSource>,
}
