// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-memory ring channel.
//!
//! One page per guest holds two circular byte queues: `req` carries guest
//! requests to the daemon, `rsp` carries responses and watch events back.
//! Each queue has 32-bit producer/consumer cursors maintained by opposite
//! sides; cursors only ever grow and are masked into the buffer. Cursor
//! reads are acquire, publications are release stores, and the peer is
//! signalled through the bound event port after publishing.
//!
//! The daemon side is bridged to the generic client engine through a
//! [`tokio::io::duplex`] pair driven by a single pump task, so ring
//! clients run the exact same protocol code as socket clients.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::gate::EventPort;

/// Bytes per ring queue, fixed by the shared page layout.
pub const RING_SIZE: usize = 1024;

/// One circular byte queue with free-running cursors.
pub struct RingBuffer {
    data: [AtomicU8; RING_SIZE],
    cons: AtomicU32,
    prod: AtomicU32,
}

impl RingBuffer {
    fn new() -> Self {
        RingBuffer {
            data: std::array::from_fn(|_| AtomicU8::new(0)),
            cons: AtomicU32::new(0),
            prod: AtomicU32::new(0),
        }
    }

    /// Producer side: copy in as much of `src` as fits, publish the new
    /// producer cursor, and return the bytes accepted.
    pub fn produce(&self, src: &[u8]) -> usize {
        let cons = self.cons.load(Ordering::Acquire);
        let prod = self.prod.load(Ordering::Relaxed);
        let free = RING_SIZE - prod.wrapping_sub(cons) as usize;
        let n = free.min(src.len());
        for (i, byte) in src[..n].iter().enumerate() {
            let idx = (prod.wrapping_add(i as u32)) as usize % RING_SIZE;
            self.data[idx].store(*byte, Ordering::Relaxed);
        }
        self.prod.store(prod.wrapping_add(n as u32), Ordering::Release);
        n
    }

    /// Consumer side: copy out as much as is available, publish the new
    /// consumer cursor, and return the bytes taken.
    pub fn consume(&self, dst: &mut [u8]) -> usize {
        let prod = self.prod.load(Ordering::Acquire);
        let cons = self.cons.load(Ordering::Relaxed);
        let avail = prod.wrapping_sub(cons) as usize;
        let n = avail.min(dst.len());
        for (i, slot) in dst[..n].iter_mut().enumerate() {
            let idx = (cons.wrapping_add(i as u32)) as usize % RING_SIZE;
            *slot = self.data[idx].load(Ordering::Relaxed);
        }
        self.cons.store(cons.wrapping_add(n as u32), Ordering::Release);
        n
    }

    /// Unconsumed bytes currently in the queue.
    pub fn len(&self) -> usize {
        let prod = self.prod.load(Ordering::Acquire);
        let cons = self.cons.load(Ordering::Acquire);
        prod.wrapping_sub(cons) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The shared page: both queues of one guest's channel.
pub struct RingInterface {
    pub req: RingBuffer,
    pub rsp: RingBuffer,
}

impl RingInterface {
    pub fn new() -> Self {
        RingInterface { req: RingBuffer::new(), rsp: RingBuffer::new() }
    }
}

impl Default for RingInterface {
    fn default() -> Self {
        RingInterface::new()
    }
}

/// Bridge a mapped ring to a byte stream the client engine can drive.
///
/// The returned stream is the engine's transport; the pump task moves
/// bytes between it and the shared page until the token is cancelled or
/// the engine side closes. The pump is the only waiter on the event port,
/// so a signal arriving between a drained check and the wait is never
/// lost (the port stores the permit).
pub fn spawn_pump(
    iface: Arc<RingInterface>,
    port: Arc<dyn EventPort>,
    cancel: CancellationToken,
) -> DuplexStream {
    let (engine_side, pump_side) = tokio::io::duplex(RING_SIZE * 4);
    let (mut from_engine, mut to_engine) = tokio::io::split(pump_side);

    tokio::spawn(async move {
        let mut ring_buf = [0u8; RING_SIZE];
        let mut engine_buf = [0u8; RING_SIZE];
        // Response bytes accepted from the engine but not yet in the ring.
        let mut pending: Vec<u8> = Vec::new();
        loop {
            // Publish pending response bytes as ring space allows.
            while !pending.is_empty() {
                let n = iface.rsp.produce(&pending);
                if n == 0 {
                    break;
                }
                pending.drain(..n);
                port.signal();
            }

            // Drain guest requests into the engine.
            loop {
                let n = iface.req.consume(&mut ring_buf);
                if n == 0 {
                    break;
                }
                port.signal();
                if to_engine.write_all(&ring_buf[..n]).await.is_err() {
                    return;
                }
            }
            if to_engine.flush().await.is_err() {
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    trace!("ring pump cancelled");
                    return;
                }
                _ = port.wait() => {}
                read = from_engine.read(&mut engine_buf), if pending.is_empty() => {
                    match read {
                        Ok(0) | Err(_) => return,
                        Ok(n) => pending.extend_from_slice(&engine_buf[..n]),
                    }
                }
            }
        }
    });

    engine_side
}

#[cfg(test)]
#[path = "ring_tests.rs"]
mod tests;
