// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Reassembles fixed-width telemetry records from a byte stream.
//!
//! Records carry no framing, so the reader must start on a record boundary (the first byte
//! after reset). Used by the host bench and the tests to read back what the rig emitted.

use core::marker::PhantomData;

use crate::protocol::telemetry::Record;

pub struct RecordReader<R: Record> {
    buf: R::Bytes,
    filled: usize,
    _record: PhantomData<R>,
}

impl<R: Record> RecordReader<R> {
    pub fn new() -> Self {
        Self {
            buf: R::Bytes::default(),
            filled: 0,
            _record: PhantomData,
        }
    }

    /// Process a single incoming byte. Returns the record it completes, if any.
    pub fn push(&mut self, byte: u8) -> Option<R> {
        let buf = self.buf.as_mut();
        buf[self.filled] = byte;
        self.filled += 1;
        if self.filled < buf.len() {
            return None;
        }
        self.filled = 0;
        Some(R::from_bytes(&self.buf))
    }

    /// Bytes of a partial record currently held.
    pub fn pending(&self) -> usize {
        self.filled
    }

    /// Drop any partial record.
    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

impl<R: Record> Default for RecordReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::telemetry::ContactRecord;

    #[test]
    fn splits_a_stream_into_records() {
        let a = ContactRecord {
            timestamp_ms: 1,
            object_position: 0.25,
            force_timestamp_ms: 1,
            force: -1.0,
        };
        let b = ContactRecord {
            timestamp_ms: 2,
            ..a
        };
        let mut reader = RecordReader::<ContactRecord>::new();
        let mut out = [None; 2];
        let mut n = 0;
        for byte in a.to_bytes().into_iter().chain(b.to_bytes()) {
            if let Some(r) = reader.push(byte) {
                out[n] = Some(r);
                n += 1;
            }
        }
        assert_eq!(out, [Some(a), Some(b)]);
        assert_eq!(reader.pending(), 0);
    }
}
