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

//! Index records.
//!
//! Every enqueued item gets one fixed-width record in the index stream,
//! pointing at its data slot. The shape is fixed per queue by the header
//! flags:
//!
//! ```text
//! ┌──────────┬───────────┬────────────────┐
//! │ DSN (8B) │ size (4B) │ timestamp (8B) │
//! └──────────┴───────────┴────────────────┘
//!             optional    optional
//! ```
//!
//! giving records of 8, 12, 16 or 20 bytes. The timestamp is nanoseconds
//! since the Unix epoch, UTC.

use serde::Serialize;

use crate::{header::QueueFlags, sequence::SequenceNumber};

/// Widest record any layout produces.
pub const MAX_INDEX_WIDTH: usize = 20;

const DSN_SIZE: usize = 8;
const LEN_SIZE: usize = 4;
const TIMESTAMP_SIZE: usize = 8;

/// One of the four record shapes. Resolved once per appender or tailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    Dsn,
    DsnSize,
    DsnTimestamp,
    DsnSizeTimestamp,
}

impl IndexLayout {
    pub const fn from_flags(flags: QueueFlags) -> Self {
        match (flags.stores_size(), flags.stores_timestamp()) {
            (false, false) => Self::Dsn,
            (true, false) => Self::DsnSize,
            (false, true) => Self::DsnTimestamp,
            (true, true) => Self::DsnSizeTimestamp,
        }
    }

    /// Record width in bytes.
    pub const fn width(self) -> u64 {
        match self {
            Self::Dsn => 8,
            Self::DsnSize => 12,
            Self::DsnTimestamp => 16,
            Self::DsnSizeTimestamp => 20,
        }
    }

    pub const fn stores_size(self) -> bool { matches!(self, Self::DsnSize | Self::DsnSizeTimestamp) }

    pub const fn stores_timestamp(self) -> bool {
        matches!(self, Self::DsnTimestamp | Self::DsnSizeTimestamp)
    }

    /// Encode `record` into the leading [`width`](Self::width) bytes of the
    /// returned buffer. Fields the layout does not carry are dropped.
    pub fn encode(self, record: &IndexRecord) -> [u8; MAX_INDEX_WIDTH] {
        let mut buf = [0u8; MAX_INDEX_WIDTH];
        buf[..DSN_SIZE].copy_from_slice(&record.dsn.raw().to_le_bytes());
        let mut at = DSN_SIZE;
        if self.stores_size() {
            buf[at..at + LEN_SIZE].copy_from_slice(&record.size.unwrap_or(0).to_le_bytes());
            at += LEN_SIZE;
        }
        if self.stores_timestamp() {
            buf[at..at + TIMESTAMP_SIZE]
                .copy_from_slice(&record.timestamp.unwrap_or(0).to_le_bytes());
        }
        buf
    }

    /// Decode a record from at least [`width`](Self::width) bytes.
    pub fn decode(self, buf: &[u8]) -> IndexRecord {
        let mut dsn = [0u8; DSN_SIZE];
        dsn.copy_from_slice(&buf[..DSN_SIZE]);
        let mut at = DSN_SIZE;

        let size = self.stores_size().then(|| {
            let mut raw = [0u8; LEN_SIZE];
            raw.copy_from_slice(&buf[at..at + LEN_SIZE]);
            at += LEN_SIZE;
            u32::from_le_bytes(raw)
        });
        let timestamp = self.stores_timestamp().then(|| {
            let mut raw = [0u8; TIMESTAMP_SIZE];
            raw.copy_from_slice(&buf[at..at + TIMESTAMP_SIZE]);
            i64::from_le_bytes(raw)
        });

        IndexRecord {
            dsn: SequenceNumber::from_raw(u64::from_le_bytes(dsn)),
            size,
            timestamp,
        }
    }
}

/// A decoded index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Address of the data slot.
    pub dsn:       SequenceNumber,
    /// Payload length, without the slot's length prefix.
    pub size:      Option<u32>,
    /// Enqueue time in Unix nanoseconds.
    pub timestamp: Option<i64>,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(QueueFlags::empty(), IndexLayout::Dsn, 8; "dsn only")]
    #[test_case(QueueFlags::STORE_SIZE, IndexLayout::DsnSize, 12; "with size")]
    #[test_case(QueueFlags::STORE_TIMESTAMP, IndexLayout::DsnTimestamp, 16; "with timestamp")]
    #[test_case(
        QueueFlags::STORE_SIZE | QueueFlags::STORE_TIMESTAMP,
        IndexLayout::DsnSizeTimestamp,
        20;
        "with both"
    )]
    fn test_layout_from_flags(flags: QueueFlags, layout: IndexLayout, width: u64) {
        assert_eq!(IndexLayout::from_flags(flags), layout);
        assert_eq!(layout.width(), width);
    }

    #[test]
    fn test_full_record_layout() {
        let record = IndexRecord {
            dsn:       SequenceNumber::new(2, 394),
            size:      Some(390),
            timestamp: Some(1_700_000_000_000_000_000),
        };
        let buf = IndexLayout::DsnSizeTimestamp.encode(&record);

        assert_eq!(&buf[..8], &SequenceNumber::new(2, 394).raw().to_le_bytes());
        assert_eq!(&buf[8..12], &390u32.to_le_bytes());
        assert_eq!(&buf[12..20], &1_700_000_000_000_000_000i64.to_le_bytes());
        assert_eq!(IndexLayout::DsnSizeTimestamp.decode(&buf), record);
    }

    #[test]
    fn test_timestamp_follows_dsn_without_size() {
        let record = IndexRecord {
            dsn:       SequenceNumber::new(0, 8),
            size:      Some(4),
            timestamp: Some(42),
        };
        let layout = IndexLayout::DsnTimestamp;
        let buf = layout.encode(&record);

        assert_eq!(&buf[8..16], &42i64.to_le_bytes());
        let decoded = layout.decode(&buf[..16]);
        assert_eq!(decoded.size, None);
        assert_eq!(decoded.timestamp, Some(42));
    }
}
