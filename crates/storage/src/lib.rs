// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed state persistence for Gaffer.
//!
//! Everything the daemon persists lives under the workspace working
//! directory: one directory per session (record, plan artifacts, logs,
//! checkpoints), a pool snapshot, and the IPC port file. Writes are
//! serialized through a single writer and always go write-temp-then-rename
//! so readers never observe a partial file.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod layout;
pub mod lock;
pub mod store;

pub use layout::Layout;
pub use lock::{WorkspaceLock, DEFAULT_STALE_TTL};
pub use store::{StateStore, StoreError};
