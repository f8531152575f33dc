// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logical addresses into the data and index segment chains.
//!
//! A [`SequenceNumber`] packs a segment number and a byte offset into a single
//! `u64`:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────────────────────┐
//! │ segment (16 bit) │ offset within segment (48 bit)               │
//! └──────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The same encoding is used for both the data stream (DSN) and the index
//! stream (ISN); the two are independent address spaces. Because the segment
//! lives in the high bits, ordering the raw `u64` orders by `(segment, offset)`.

use std::fmt;

use serde::{Deserialize, Serialize};

const OFFSET_BITS: u32 = 48;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// Largest offset representable inside one segment.
pub const MAX_SEGMENT_OFFSET: u64 = OFFSET_MASK;

/// A `(segment, offset)` address packed into 64 bits.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// The first address of segment 0.
    pub const ZERO: Self = Self(0);

    pub const fn new(segment: u16, offset: u64) -> Self {
        Self(((segment as u64) << OFFSET_BITS) | (offset & OFFSET_MASK))
    }

    /// Reinterpret a raw value read from disk.
    pub const fn from_raw(raw: u64) -> Self { Self(raw) }

    pub const fn raw(self) -> u64 { self.0 }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn segment(self) -> u16 { (self.0 >> OFFSET_BITS) as u16 }

    pub const fn offset(self) -> u64 { self.0 & OFFSET_MASK }

    /// Offset 0 of the following segment.
    #[must_use]
    pub const fn next_segment(self) -> Self { Self::new(self.segment().wrapping_add(1), 0) }

    /// Move forward `by` bytes inside the current segment.
    #[must_use]
    pub const fn advance(self, by: u64) -> Self { Self::new(self.segment(), self.offset() + by) }

    /// Returns the address where a slot of `slot` bytes has to be placed.
    ///
    /// A slot never straddles two segments: if it does not fit in what is
    /// left of the current one, it moves to offset 0 of the next segment.
    #[must_use]
    pub const fn with_rollover(self, slot: u64, capacity: u64) -> Self {
        if self.offset() + slot > capacity {
            self.next_segment()
        } else {
            self
        }
    }

    /// The address of the fixed-width record following the one at `self`,
    /// applying the same rollover rule writers use when reserving.
    #[must_use]
    pub const fn next_record(self, width: u64, capacity: u64) -> Self {
        self.advance(width).with_rollover(width, capacity)
    }

    /// Position as a byte count over a chain of equally sized segments.
    pub const fn linear(self, capacity: u64) -> u64 {
        self.segment() as u64 * capacity + self.offset()
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:#014x}", self.segment(), self.offset())
    }
}

impl From<SequenceNumber> for u64 {
    fn from(sn: SequenceNumber) -> Self { sn.0 }
}
