// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Clients
//! subscribe to bus topics, issue request/response pairs correlated by id,
//! and receive server-initiated event frames.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod envelope;
mod frame;
mod method;
mod types;

pub use envelope::{Envelope, EnvelopeKind};
pub use frame::{decode, encode, read_envelope, write_envelope, ProtocolError, MAX_FRAME_LEN};
pub use method::Method;
pub use types::{
    PoolStatus, SessionSummary, SlotDetail, StateSnapshot, WorkflowSummary,
};

#[cfg(test)]
mod property_tests;
