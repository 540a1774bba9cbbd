//! Property tests for the chunked characteristic I/O and the length prefix.

use proptest::prelude::*;
use shelly_rpc::chunked::{decode_length, encode_length, read_chunked, write_chunked};
use shelly_rpc::{Characteristic, TransportError};
use std::collections::VecDeque;

#[derive(Debug)]
struct Never;

impl core::fmt::Display for Never {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unreachable")
    }
}

impl std::error::Error for Never {}

impl TransportError for Never {}

/// Records writes and serves reads from a byte queue, `sizes` bytes at a time
struct Recorder {
    mtu: usize,
    writes: Vec<Vec<u8>>,
    source: VecDeque<u8>,
    sizes: Vec<usize>,
    reads: usize,
}

impl Recorder {
    fn new(mtu: usize) -> Self {
        Self {
            mtu,
            writes: Vec::new(),
            source: VecDeque::new(),
            sizes: Vec::new(),
            reads: 0,
        }
    }
}

impl Characteristic for Recorder {
    type Error = Never;

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Self::Error> {
        let cap = self.sizes[self.reads % self.sizes.len()];
        self.reads += 1;
        let n = buffer.len().min(cap).min(self.source.len());
        for (slot, byte) in buffer.iter_mut().zip(self.source.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_without_response(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        assert!(data.len() <= self.mtu, "chunk larger than mtu");
        self.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn mtu(&self) -> Result<usize, Self::Error> {
        Ok(self.mtu)
    }
}

proptest! {
    /// Chunks never exceed the MTU and concatenate back to the input.
    #[test]
    fn writer_preserves_bytes(
        mtu in 1usize..64,
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut ch = Recorder::new(mtu);
        write_chunked(&mut ch, &data).unwrap();

        prop_assert!(ch.writes.iter().all(|w| !w.is_empty() && w.len() <= mtu));
        prop_assert_eq!(ch.writes.len(), data.len().div_ceil(mtu));
        prop_assert_eq!(ch.writes.concat(), data);
    }

    /// Whatever the read sizes, the reader returns exactly `length` bytes,
    /// taken from the front of the stream.
    #[test]
    fn reader_returns_exact_length(
        mtu in 1usize..64,
        stream in proptest::collection::vec(any::<u8>(), 1..512),
        sizes in proptest::collection::vec(1usize..100, 1..8),
        cut in any::<prop::sample::Index>(),
    ) {
        let length = cut.index(stream.len() + 1);
        let mut ch = Recorder::new(mtu);
        ch.source = stream.iter().copied().collect();
        ch.sizes = sizes;

        let out = read_chunked(&mut ch, length).unwrap();

        prop_assert_eq!(out.len(), length);
        prop_assert_eq!(&out[..], &stream[..length]);
        prop_assert_eq!(ch.source.len(), stream.len() - length);
    }

    #[test]
    fn length_prefix_bijection(n in any::<u32>()) {
        prop_assert_eq!(decode_length(encode_length(n)), n);
    }
}

#[test]
fn length_prefix_extremes() {
    for n in [0, 1, 53, 255, 256, u32::MAX - 1, u32::MAX] {
        assert_eq!(decode_length(encode_length(n)), n);
    }
    assert_eq!(encode_length(u32::MAX), [0xFF; 4]);
}
