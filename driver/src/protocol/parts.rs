//! Slices that travel as several messages
//!
//! A worker's input slice and its results may not fit in one frame. They go
//! out as consecutive parts on their channel, each small enough for the
//! transport's limit. The receiver knows the total from the partition and
//! keeps reading until it has it. At least one part is always sent, so an
//! empty slice is a single empty part.

use std::ops::Range;

/// Largest CBOR encoding of one input sample (two i32, five f64)
pub const INPUT_SAMPLE_BYTES: usize = 2 * 5 + 5 * 9;

/// Largest CBOR encoding of one output sample (seven f64 and a status name)
pub const OUTPUT_SAMPLE_BYTES: usize = 7 * 9 + 7;

/// Room left in every frame for enum tags, field names and array headers
pub const PART_OVERHEAD_BYTES: usize = 512;

/// Samples per part when a message may be at most `max_message_bytes`
///
/// `None` means the transport has no limit and a slice goes as one part.
pub fn samples_per_part(max_message_bytes: Option<usize>, sample_bytes: usize) -> usize {
    match max_message_bytes {
        Some(max) => (max.saturating_sub(PART_OVERHEAD_BYTES) / sample_bytes).max(1),
        None => usize::MAX,
    }
}

/// Split `range` into consecutive ranges of at most `per_part` samples
///
/// An empty `range` yields one empty part.
pub fn part_ranges(range: Range<usize>, per_part: usize) -> Vec<Range<usize>> {
    if range.is_empty() {
        return vec![range];
    }

    let per_part = per_part.max(1);
    let mut parts = Vec::with_capacity((range.end - range.start).div_ceil(per_part));
    let mut start = range.start;
    while start < range.end {
        let end = start.saturating_add(per_part).min(range.end);
        parts.push(start..end);
        start = end;
    }
    parts
}

/// Receive-side count of one slice arriving in parts
#[derive(Debug, Clone, Copy)]
pub struct SliceAssembly {
    received: usize,
    expected: usize,
}

impl SliceAssembly {
    pub fn new(expected: usize) -> Self {
        Self {
            received: 0,
            expected,
        }
    }

    /// Samples accounted for so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Account for a part of `len` samples
    ///
    /// Returns false, leaving the count alone, when the part would overrun
    /// the expected total or is empty while samples are still due.
    pub fn accept(&mut self, len: usize) -> bool {
        let due = self.expected - self.received;
        if len > due || (len == 0 && due > 0) {
            return false;
        }
        self.received += len;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }
}
