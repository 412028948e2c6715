//! C1: the ring-buffer pair. A thin, byte-oriented wrapper around
//! `ringbuf`'s lock-free SPSC heap queue, exposing exactly the operation
//! names spec.md §4.1 names: `read_space`, `write_space`, `read`,
//! `write`, `read_advance`.
//!
//! Sizing is fixed at construction (spec.md §3: "No dynamic allocation
//! after activation") and writes that don't fit are dropped whole rather
//! than partially written, with an overflow diagnostic — the PLL, not
//! this buffer, is the defence against sustained overflow.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::warn;

pub struct RingWriter {
    name: &'static str,
    prod: HeapProd<u8>,
}

pub struct RingReader {
    name: &'static str,
    cons: HeapCons<u8>,
}

/// Builds one SPSC byte queue, split into its producer and consumer ends.
/// `name` is carried through purely for diagnostics (`"o2j"` / `"j2o"`).
pub fn ring_pair(name: &'static str, capacity_bytes: usize) -> (RingWriter, RingReader) {
    let rb = HeapRb::<u8>::new(capacity_bytes);
    let (prod, cons) = rb.split();
    (RingWriter { name, prod }, RingReader { name, cons })
}

impl RingWriter {
    pub fn write_space(&self) -> usize {
        self.prod.vacant_len()
    }

    /// Writes `src` whole or not at all. Returns `true` on success.
    /// A write that doesn't fit is dropped in its entirety, never
    /// partially written, and logs an overflow diagnostic.
    pub fn write(&mut self, src: &[u8]) -> bool {
        if src.len() > self.prod.vacant_len() {
            warn!(ring = self.name, bytes = src.len(), "buffer overflow, discarding data");
            return false;
        }
        let n = self.prod.push_slice(src);
        debug_assert_eq!(n, src.len());
        true
    }
}

impl RingReader {
    pub fn read_space(&self) -> usize {
        self.cons.occupied_len()
    }

    /// Copies up to `dst.len()` bytes, consuming them. Returns the number
    /// of bytes actually copied (may be less than `dst.len()`).
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.cons.pop_slice(dst)
    }

    /// Discards up to `n` bytes without copying them anywhere (used by
    /// the o2j feeder's priming-to-running flush).
    pub fn read_advance(&mut self, n: usize) -> usize {
        self.cons.skip(n)
    }
}
