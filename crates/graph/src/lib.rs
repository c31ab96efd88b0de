// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow graph definitions for Gaffer.
//!
//! Graph documents are HCL files describing typed node graphs. This crate
//! owns the node type registry, the loader/validator/dumper, and the
//! restricted template/expression sublanguage used by `script`, `if`,
//! `while_loop`, and template-bearing node configs. Execution lives in
//! `gaffer-engine`; nothing here performs I/O beyond reading graph files.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod builtin;
pub mod expr;
pub mod graph;
pub mod loader;
pub mod port;
pub mod registry;
pub mod template;
pub mod validate;

pub use builtin::builtin_registry;
pub use expr::{evaluate, EvalBudget, ExprError, Resolver};
pub use graph::{
    Connection, ErrorPolicy, Graph, NodeInstance, ParamDecl, SENTINEL_BRANCH, SENTINEL_LOOP,
    SENTINEL_PARALLEL, SENTINEL_SUBGRAPH, SENTINEL_SYNC,
};
pub use loader::{dump_graph, load_graph, load_graph_file, LoadError};
pub use port::{compatibility, Compatibility, DataType, PortDef, PortDirection};
pub use registry::{
    ConfigField, ConfigFieldType, ConfigValidator, NodeCategory, NodeRegistry, NodeTypeDef,
};
pub use template::render_template;
pub use validate::{validate_graph, Issue, Severity};
