// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC listener.
//!
//! Accepts loopback TCP connections and speaks the framed envelope
//! protocol: clients subscribe to bus topics and issue requests; the server
//! pushes event frames as topics fire and correlates responses by id.
//! Abrupt disconnects are tolerated — a connection's subscriptions die with
//! its task.

use crate::methods::dispatch_method;
use gaffer_core::{ErrorCode, SystemClock};
use gaffer_engine::{EventBus, SessionManager};
use gaffer_wire::{
    read_envelope, write_envelope, Envelope, EnvelopeKind, Method, ProtocolError,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Write-side timeout for response and event frames.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Idle read timeout; generous because connections are long-lived.
const READ_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared context for client connections.
pub struct Listener {
    sessions: SessionManager<SystemClock>,
    bus: EventBus,
    start_time: Instant,
}

impl Listener {
    pub fn new(sessions: SessionManager<SystemClock>, bus: EventBus, start_time: Instant) -> Self {
        Self { sessions, bus, start_time }
    }

    /// Spawn the accept loop.
    pub fn spawn(self, tcp: TcpListener, shutdown: CancellationToken) {
        let listener = Arc::new(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = tcp.accept() => match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "client connected");
                            let listener = Arc::clone(&listener);
                            let token = shutdown.clone();
                            tokio::spawn(async move {
                                let (reader, writer) = stream.into_split();
                                listener.handle_connection(reader, writer, token).await;
                            });
                        }
                        Err(e) => error!(error = %e, "accept error"),
                    },
                    _ = shutdown.cancelled() => {
                        info!("listener stopping");
                        break;
                    }
                }
            }
        });
    }

    /// Serve one client until it disconnects or the daemon stops.
    async fn handle_connection<R, W>(
        &self,
        mut reader: R,
        mut writer: W,
        shutdown: CancellationToken,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let owner = self.bus.owner();
        let mut events = self.bus.subscribe_channel("*", owner);
        let mut topics: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                frame = read_envelope(&mut reader, READ_TIMEOUT) => {
                    let envelope = match frame {
                        Ok(envelope) => envelope,
                        Err(ProtocolError::ConnectionClosed) => {
                            debug!("client disconnected");
                            break;
                        }
                        Err(e) => {
                            debug!(error = %e, "dropping client after protocol error");
                            break;
                        }
                    };
                    if !self.handle_frame(envelope, &mut topics, &mut writer).await {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let topic = event.topic();
                    if !subscribed(&topics, topic) {
                        continue;
                    }
                    let payload = serde_json::to_value(&event).unwrap_or_default();
                    let frame = Envelope::event(topic, payload);
                    if write_envelope(&mut writer, &frame, WRITE_TIMEOUT).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        // Garbage-collect this connection's subscriptions.
        self.bus.unsubscribe_owner(owner);
    }

    /// Returns false when the connection should close.
    async fn handle_frame<W>(
        &self,
        envelope: Envelope,
        topics: &mut HashSet<String>,
        writer: &mut W,
    ) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        match envelope.kind {
            EnvelopeKind::Subscribe => {
                if let Some(topic) = envelope.topic {
                    topics.insert(topic);
                }
                true
            }
            EnvelopeKind::Unsubscribe => {
                if let Some(topic) = envelope.topic {
                    topics.remove(&topic);
                }
                true
            }
            EnvelopeKind::Request => {
                let id = envelope.id.unwrap_or(0);
                let response = match envelope.method.as_deref() {
                    Some(name) => match Method::from_parts(name, envelope.params.as_ref()) {
                        Ok(method) => {
                            debug!(method = method.name(), "request");
                            dispatch_method(
                                &self.sessions,
                                method,
                                id,
                                self.start_time.elapsed().as_millis() as u64,
                            )
                        }
                        Err(_) => Envelope::response_err(
                            id,
                            ErrorCode::IpcUnknownMethod,
                            format!("unknown method '{name}'"),
                        ),
                    },
                    None => Envelope::response_err(
                        id,
                        ErrorCode::IpcProtocolError,
                        "request without method",
                    ),
                };
                write_envelope(writer, &response, WRITE_TIMEOUT).await.is_ok()
            }
            EnvelopeKind::Response | EnvelopeKind::Event => {
                // Clients do not send these.
                let id = envelope.id.unwrap_or(0);
                let response = Envelope::response_err(
                    id,
                    ErrorCode::IpcProtocolError,
                    "unexpected frame kind",
                );
                write_envelope(writer, &response, WRITE_TIMEOUT).await.is_ok()
            }
        }
    }
}

/// Exact topic, `prefix.*`, or `*` — mirroring the bus's matching.
fn subscribed(topics: &HashSet<String>, topic: &str) -> bool {
    topics.iter().any(|pattern| {
        pattern == "*"
            || pattern == topic
            || pattern
                .strip_suffix(".*")
                .is_some_and(|prefix| {
                    topic.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
                })
    })
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
