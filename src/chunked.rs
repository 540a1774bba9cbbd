//! MTU-bounded byte streams over a single characteristic
//!
//! A characteristic moves at most `mtu` bytes per operation. The writer
//! splits a payload into consecutive chunks of at most that size; the reader
//! keeps reading until the requested number of bytes has arrived.
//!
//! ```text
//! payload (53 bytes), mtu = 20
//! ┌────────────────────┬────────────────────┬─────────────┐
//! │ write #1: 20 bytes │ write #2: 20 bytes │ #3: 13 bytes│
//! └────────────────────┴────────────────────┴─────────────┘
//! ```
//!
//! Payload lengths travel separately on the control characteristics as a
//! 4-byte big-endian prefix, see [`encode_length`].

use log::trace;
use thiserror::Error;

use crate::transport::{BoxError, Characteristic};

/// Size of the length prefix on the TX and RX control characteristics
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Failures while moving bytes over a characteristic
#[derive(Debug, Error)]
pub enum TransportFault {
    #[error("wrote {written} bytes, expected to write {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("characteristic reports an MTU of zero")]
    ZeroMtu,
    #[error("get MTU: {0}")]
    Mtu(#[source] BoxError),
    #[error("read from characteristic: {0}")]
    Read(#[source] BoxError),
    #[error("write chunk to characteristic: {0}")]
    Write(#[source] BoxError),
}

pub fn encode_length(length: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    length.to_be_bytes()
}

pub fn decode_length(bytes: [u8; LENGTH_PREFIX_SIZE]) -> u32 {
    u32::from_be_bytes(bytes)
}

fn mtu_of<C: Characteristic>(characteristic: &C) -> Result<usize, TransportFault> {
    match characteristic.mtu() {
        Ok(0) => Err(TransportFault::ZeroMtu),
        Ok(mtu) => Ok(mtu),
        Err(e) => Err(TransportFault::Mtu(Box::new(e))),
    }
}

/// Write `data` with a single operation, bypassing chunking
///
/// Used for the 4-byte length prefix, which always fits in one MTU.
pub fn write_once<C: Characteristic>(
    characteristic: &mut C,
    data: &[u8],
) -> Result<(), TransportFault> {
    let written = characteristic
        .write_without_response(data)
        .map_err(|e| TransportFault::Write(Box::new(e)))?;
    if written != data.len() {
        return Err(TransportFault::ShortWrite {
            written,
            expected: data.len(),
        });
    }
    Ok(())
}

/// Write `data` in order as chunks of at most `mtu` bytes
///
/// Stops at the first chunk the characteristic does not fully accept; no
/// further chunks are attempted.
pub fn write_chunked<C: Characteristic>(
    characteristic: &mut C,
    data: &[u8],
) -> Result<(), TransportFault> {
    if data.is_empty() {
        return Ok(());
    }
    let mtu = mtu_of(characteristic)?;

    for chunk in data.chunks(mtu) {
        write_once(characteristic, chunk)?;
        trace!("wrote chunk of {} bytes (mtu {})", chunk.len(), mtu);
    }

    Ok(())
}

/// Read exactly `length` bytes
///
/// Each underlying read is offered a buffer of `min(mtu, remaining)` bytes.
/// Short and empty reads are retried; nothing past `length` is ever returned.
pub fn read_chunked<C: Characteristic>(
    characteristic: &mut C,
    length: usize,
) -> Result<Vec<u8>, TransportFault> {
    if length == 0 {
        return Ok(Vec::new());
    }
    let mtu = mtu_of(characteristic)?;
    // `length` comes off the wire; grow as bytes arrive instead of trusting it.
    let mut out = Vec::with_capacity(length.min(mtu));
    let mut buffer = vec![0u8; mtu.min(length)];

    while out.len() < length {
        let want = (length - out.len()).min(buffer.len());
        let n = characteristic
            .read(&mut buffer[..want])
            .map_err(|e| TransportFault::Read(Box::new(e)))?;
        // A misbehaving stack may claim more than the buffer it was given.
        let n = n.min(want);
        out.extend_from_slice(&buffer[..n]);
        trace!("read {} bytes, {}/{} total", n, out.len(), length);
    }

    Ok(out)
}

/// Read the 4-byte big-endian length prefix
pub fn read_length<C: Characteristic>(characteristic: &mut C) -> Result<u32, TransportFault> {
    let bytes = read_chunked(characteristic, LENGTH_PREFIX_SIZE)?;
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    prefix.copy_from_slice(&bytes);
    Ok(decode_length(prefix))
}

// ============================================================================
// Value buffering
// ============================================================================

/// Serves whole attribute values through caller-sized read buffers
///
/// Some stacks return the complete attribute value on every read. The part
/// that does not fit the caller's buffer is held here and handed out by the
/// following reads. Held bytes belong to one exchange only: when the
/// `exchange` counter passed to [`read_with`](Self::read_with) differs from
/// the one the bytes were fetched under, they are dropped before reading.
#[derive(Debug, Default)]
pub struct ValueBuffer {
    pending: Vec<u8>,
    exchange: u64,
}

impl ValueBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes fetched but not yet handed out
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Copy held bytes into `buffer`, calling `fetch` for a fresh value
    /// when nothing from the current exchange is left
    pub fn read_with<E>(
        &mut self,
        buffer: &mut [u8],
        exchange: u64,
        fetch: impl FnOnce() -> Result<Vec<u8>, E>,
    ) -> Result<usize, E> {
        if self.exchange != exchange {
            if !self.pending.is_empty() {
                trace!("dropping {} stale bytes", self.pending.len());
            }
            self.pending.clear();
            self.exchange = exchange;
        }
        if self.pending.is_empty() {
            self.pending = fetch()?;
        }
        let n = buffer.len().min(self.pending.len());
        buffer[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

// ============================================================================
// Tests
// ============================================================================
