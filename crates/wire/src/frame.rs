// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing.

use crate::envelope::Envelope;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is a protocol error.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

/// Framing and envelope errors (`ipc.protocol_error` on the wire).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o timeout")]
    Timeout,

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(u32),

    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode an envelope to its framed byte form.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(envelope)?;
    let len = payload.len() as u32;
    let mut bytes = Vec::with_capacity(4 + payload.len());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode one framed envelope from a byte slice, returning the envelope and
/// the number of bytes consumed. `None` when the slice holds a partial frame.
pub fn decode(bytes: &[u8]) -> Result<Option<(Envelope, usize)>, ProtocolError> {
    if bytes.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let total = 4 + len as usize;
    if bytes.len() < total {
        return Ok(None);
    }
    let envelope = serde_json::from_slice(&bytes[4..total])?;
    Ok(Some((envelope, total)))
}

/// Read one envelope with a timeout.
pub async fn read_envelope<R>(reader: &mut R, timeout: Duration) -> Result<Envelope, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_envelope_inner(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

async fn read_envelope_inner<R>(reader: &mut R) -> Result<Envelope, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_slice(&payload)?)
}

/// Write one envelope with a timeout.
pub async fn write_envelope<W>(
    writer: &mut W,
    envelope: &Envelope,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(envelope)?;
    tokio::time::timeout(timeout, async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)?
    .map_err(ProtocolError::Io)
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
