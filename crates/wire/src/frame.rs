// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec: async framed read/write plus body field helpers.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use xr_core::{RegError, PAYLOAD_MAX};

use crate::header::{Header, Op, HEADER_LEN};

/// Errors from framed I/O.
#[derive(Debug, Error)]
pub enum WireError {
    /// Peer closed the connection (EOF at a frame boundary or mid-frame).
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame announced a body larger than the payload limit. The body has
    /// been drained, so the caller may answer with EINVAL and keep the
    /// connection; the offending header is preserved for the reply.
    #[error("frame body of {} bytes exceeds the payload limit", .header.len)]
    Oversize { header: Header },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(op: Op, req_id: u32, tx_id: u32, body: Vec<u8>) -> Self {
        let header = Header::new(op, req_id, tx_id, body.len() as u32);
        Frame { header, body }
    }

    /// Acknowledgement frame: echoes the op and carries `OK` + NUL.
    pub fn ack(op: Op, req_id: u32, tx_id: u32) -> Self {
        Frame::new(op, req_id, tx_id, b"OK\0".to_vec())
    }

    /// ERROR frame carrying the wire token for `err` + NUL.
    pub fn error(req_id: u32, tx_id: u32, err: RegError) -> Self {
        let mut body = err.token().as_bytes().to_vec();
        body.push(0);
        Frame::new(Op::Error, req_id, tx_id, body)
    }

    /// Out-of-band watch event: `req_id = tx_id = 0`, body `path NUL token NUL`.
    pub fn watch_event(path: &str, token: &str) -> Self {
        let mut body = Vec::with_capacity(path.len() + token.len() + 2);
        body.extend_from_slice(path.as_bytes());
        body.push(0);
        body.extend_from_slice(token.as_bytes());
        body.push(0);
        Frame::new(Op::WatchEvent, 0, 0, body)
    }
}

/// Read one frame.
///
/// EOF at the frame boundary (or mid-frame) reports `ConnectionClosed`.
/// A body longer than [`PAYLOAD_MAX`] is consumed and reported as
/// `Oversize` so the connection stays framed.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut hdr_buf = [0u8; HEADER_LEN];
    if let Err(e) = reader.read_exact(&mut hdr_buf).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => WireError::ConnectionClosed,
            _ => WireError::Io(e),
        });
    }
    let header = Header::decode(&hdr_buf);

    let len = header.len as usize;
    if len > PAYLOAD_MAX {
        drain(reader, len).await?;
        return Err(WireError::Oversize { header });
    }

    let mut body = vec![0u8; len];
    if let Err(e) = reader.read_exact(&mut body).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => WireError::ConnectionClosed,
            _ => WireError::Io(e),
        });
    }
    Ok(Frame { header, body })
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut header = frame.header;
    header.len = frame.body.len() as u32;
    writer.write_all(&header.encode()).await?;
    writer.write_all(&frame.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Discard `len` body bytes of an oversize frame.
async fn drain<R>(reader: &mut R, len: usize) -> Result<(), WireError>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = len as u64;
    let mut sink = [0u8; 1024];
    while remaining > 0 {
        let want = remaining.min(sink.len() as u64) as usize;
        let n = reader.read(&mut sink[..want]).await?;
        if n == 0 {
            return Err(WireError::ConnectionClosed);
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Split an all-string body into its NUL-separated fields.
///
/// A single trailing NUL does not produce an empty field; clients differ
/// on whether they send the implicit string terminator.
pub fn split_fields(body: &[u8]) -> Result<Vec<&str>, RegError> {
    let body = body.strip_suffix(&[0]).unwrap_or(body);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    body.split(|b| *b == 0)
        .map(|f| std::str::from_utf8(f).map_err(|_| RegError::Invalid))
        .collect()
}

/// Split a WRITE body into its path field and raw value bytes.
///
/// The value follows the first NUL and may itself contain NULs.
pub fn path_and_value(body: &[u8]) -> Result<(&str, &[u8]), RegError> {
    let (path, value) = match body.iter().position(|b| *b == 0) {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, &body[body.len()..]),
    };
    let path = std::str::from_utf8(path).map_err(|_| RegError::Invalid)?;
    Ok((path, value))
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
