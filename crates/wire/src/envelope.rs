// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message envelope shared by both directions of the IPC stream.

use gaffer_core::{ErrorCode, GafferError};
use serde::{Deserialize, Serialize};

/// Envelope discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Subscribe,
    Unsubscribe,
    Request,
    Response,
    Event,
}

/// `{type, id?, topic?, method?, params?, result?, error?, payload?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Request/response correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Subscribe/unsubscribe/event topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GafferError>,
    /// Event payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    fn bare(kind: EnvelopeKind) -> Self {
        Self {
            kind,
            id: None,
            topic: None,
            method: None,
            params: None,
            result: None,
            error: None,
            payload: None,
        }
    }

    pub fn subscribe(topic: impl Into<String>) -> Self {
        Self { topic: Some(topic.into()), ..Self::bare(EnvelopeKind::Subscribe) }
    }

    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self { topic: Some(topic.into()), ..Self::bare(EnvelopeKind::Unsubscribe) }
    }

    pub fn request(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params: Some(params),
            ..Self::bare(EnvelopeKind::Request)
        }
    }

    pub fn response_ok(id: u64, result: serde_json::Value) -> Self {
        Self { id: Some(id), result: Some(result), ..Self::bare(EnvelopeKind::Response) }
    }

    pub fn response_err(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            error: Some(GafferError::new(code, message)),
            ..Self::bare(EnvelopeKind::Response)
        }
    }

    pub fn event(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: Some(topic.into()),
            payload: Some(payload),
            ..Self::bare(EnvelopeKind::Event)
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
