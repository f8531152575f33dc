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

//! Message types and the data slot format.
//!
//! ## On-Disk Slot Format
//!
//! Payloads are stored in data segments as length-prefixed slots:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┐
//! │  Length (4B)    │   Payload (variable) │
//! │  little-endian  │   raw bytes          │
//! └─────────────────┴──────────────────────┘
//! ```
//!
//! A slot never spans two segments. Nothing but the index points into a data
//! segment, so slots are not scanned sequentially and carry no checksum.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::sequence::SequenceNumber;

/// Size of the length prefix in bytes (4 bytes = u32).
pub const SLOT_LENGTH_SIZE: u64 = 4;

/// Total on-disk size of a slot holding `payload_len` bytes.
///
/// ```ignore
/// // A 390-byte payload takes a 394-byte slot.
/// assert_eq!(slot_size(390), 394);
/// ```
#[inline]
pub const fn slot_size(payload_len: u64) -> u64 { SLOT_LENGTH_SIZE + payload_len }

/// A message read from the queue, with the metadata its index record holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Index address of the message. Pass it to
    /// [`Tailer::dequeue`](crate::Tailer::dequeue) to read it again.
    pub isn: SequenceNumber,

    /// Address of the data slot.
    pub dsn: SequenceNumber,

    /// Enqueue time, if the queue records timestamps.
    pub timestamp: Option<DateTime<Utc>>,

    pub payload: Bytes,
}

impl Message {
    pub fn len(&self) -> usize { self.payload.len() }

    pub fn is_empty(&self) -> bool { self.payload.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_size() {
        assert_eq!(slot_size(0), 4);
        assert_eq!(slot_size(1), 5);
        assert_eq!(slot_size(390), 394);
    }
}
