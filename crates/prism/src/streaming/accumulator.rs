//! Incremental Object Accumulator
//!
//! Reassembles complete top-level JSON objects from a byte stream whose
//! chunk boundaries can fall anywhere: between objects, inside a string,
//! or in the middle of a multi-byte UTF-8 sequence.
//!
//! The scan works on raw bytes. Braces, quotes and backslashes are ASCII
//! and never occur inside a multi-byte sequence, so no decoding is needed
//! until a balanced span is handed to `serde_json`.

use serde_json::{Map, Value};
use tracing::debug;

/// One complete top-level object decoded from an upstream stream.
pub type DecodedObject = Map<String, Value>;

/// Counters kept by an accumulator over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatorStats {
    /// Bytes fed in
    pub bytes_in: usize,
    /// Objects decoded successfully
    pub objects: usize,
    /// Balanced spans that failed to parse and were dropped
    pub dropped: usize,
}

/// Scan progress over the pending object, kept across `feed` calls so a
/// large object arriving in many chunks is scanned once, not once per chunk.
#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    /// Whether the buffer starts with an unterminated object
    open: bool,
    /// Next buffer offset to inspect
    cursor: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

/// Buffers raw bytes for one upstream source and yields every complete
/// top-level object as soon as its closing brace arrives.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    buffer: Vec<u8>,
    scan: ScanState,
    stats: AccumulatorStats,
}

impl ChunkAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every object it completes, in stream order.
    ///
    /// Bytes belonging to an object whose closing brace has not arrived yet
    /// stay buffered and are prefixed to the next chunk. Bytes outside any
    /// object (array brackets, commas, whitespace) are discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedObject> {
        self.stats.bytes_in += bytes.len();
        self.buffer.extend_from_slice(bytes);

        let mut objects = Vec::new();
        while let Some(end) = self.scan_to_close() {
            let parsed = serde_json::from_slice::<DecodedObject>(&self.buffer[..=end]);
            self.buffer.drain(..=end);
            self.scan = ScanState::default();

            match parsed {
                Ok(object) => {
                    self.stats.objects += 1;
                    objects.push(object);
                }
                Err(err) => {
                    self.stats.dropped += 1;
                    debug!(span_len = end + 1, error = %err, "dropping malformed object span");
                }
            }
        }
        objects
    }

    /// Attempt a final parse of whatever is left once the source has ended.
    ///
    /// The accumulator is empty afterwards regardless of the outcome.
    pub fn flush(&mut self) -> Option<DecodedObject> {
        let remainder = std::mem::take(&mut self.buffer);
        self.scan = ScanState::default();

        let trimmed = remainder.trim_ascii();
        if trimmed.is_empty() {
            return None;
        }

        match serde_json::from_slice::<DecodedObject>(trimmed) {
            Ok(object) => {
                self.stats.objects += 1;
                Some(object)
            }
            Err(err) => {
                self.stats.dropped += 1;
                debug!(
                    remainder_len = trimmed.len(),
                    error = %err,
                    "discarding unterminated remainder at end of stream"
                );
                None
            }
        }
    }

    /// Number of bytes currently held back waiting for more input
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> AccumulatorStats {
        self.stats
    }

    /// Advance the scan and return the offset of the closing brace of the
    /// object at the front of the buffer, if it has arrived.
    fn scan_to_close(&mut self) -> Option<usize> {
        if !self.scan.open {
            match self.buffer.iter().position(|&b| b == b'{') {
                Some(start) => {
                    self.buffer.drain(..start);
                    self.scan = ScanState {
                        open: true,
                        ..ScanState::default()
                    };
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
        }

        let scan = &mut self.scan;
        let mut i = scan.cursor;
        while i < self.buffer.len() {
            let byte = self.buffer[i];
            i += 1;

            if scan.in_string {
                // A backslash escapes exactly one following byte, so runs of
                // backslashes before a quote resolve by parity.
                if scan.escaped {
                    scan.escaped = false;
                } else if byte == b'\\' {
                    scan.escaped = true;
                } else if byte == b'"' {
                    scan.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => scan.in_string = true,
                b'{' => scan.depth += 1,
                b'}' => {
                    scan.depth = scan.depth.saturating_sub(1);
                    if scan.depth == 0 {
                        scan.cursor = i;
                        return Some(i - 1);
                    }
                }
                _ => {}
            }
        }

        scan.cursor = i;
        None
    }
}
