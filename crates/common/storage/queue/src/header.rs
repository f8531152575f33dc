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

//! The head file: queue metadata and the bookmark table.
//!
//! # Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! +--------+---------+----------------------------------+
//! | Offset | Size    | Field                            |
//! +--------+---------+----------------------------------+
//! | 0      | 1       | version                          |
//! | 1      | 1       | flags                            |
//! | 2      | 2       | max data segments (0: unbounded) |
//! | 4      | 4       | data segment size (pages)        |
//! | 8      | 4       | index segment size (pages)       |
//! | 12     | 8       | first valid DSN                  |
//! | 20     | 8       | first valid ISN                  |
//! | 28     | 8       | next available DSN               |
//! | 36     | 8       | next available ISN               |
//! | 44     | 8       | anonymous bookmark ISN           |
//! | 52     | 24 * n  | bookmark table                   |
//! +--------+---------+----------------------------------+
//! ```
//!
//! A bookmark entry is a 16-byte id followed by an 8-byte ISN. A nil id ends
//! the table and an all-ones id marks a freed slot that the next registration
//! may reuse.
//!
//! The head file is shared by every participant through the mapping itself.
//! Pointer and bookmark updates are single in-place writes; anything that
//! needs more than one write runs under the queue lock.

use std::{
    collections::HashMap,
    ops::{BitOr, BitOrAssign},
    path::{Path, PathBuf},
};

use mmap_io::MemoryMappedFile;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    Result,
    error::{
        BookmarkNotFoundSnafu, BookmarkTableFullSnafu, InvalidBookmarkSnafu, InvalidHeaderSnafu,
        MmapSnafu, UnsupportedVersionSnafu,
    },
    page::PageCount,
    sequence::SequenceNumber,
};

/// Format version written by this crate.
pub const HEADER_VERSION: u8 = 1;

/// Size of the fixed fields preceding the bookmark table.
pub const HEADER_SIZE: u64 = 52;

/// Size of one bookmark table entry.
pub const BOOKMARK_ENTRY_SIZE: u64 = 24;

/// Id marking a freed bookmark slot.
pub const TOMBSTONE: Uuid = Uuid::from_bytes([0xFF; 16]);

const VERSION_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 1;
const MAX_DATA_SEGMENTS_OFFSET: usize = 2;
const DATA_SEGMENT_PAGES_OFFSET: usize = 4;
const INDEX_SEGMENT_PAGES_OFFSET: usize = 8;
const ANONYMOUS_BOOKMARK_OFFSET: u64 = 44;
const BOOKMARK_ID_SIZE: u64 = 16;

/// Options recorded at creation that fix the index record shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueFlags(u8);

impl QueueFlags {
    /// Index records carry the payload size.
    pub const STORE_SIZE: Self = Self(1);
    /// Index records carry the enqueue timestamp.
    pub const STORE_TIMESTAMP: Self = Self(2);

    const ALL: u8 = Self::STORE_SIZE.0 | Self::STORE_TIMESTAMP.0;

    pub const fn empty() -> Self { Self(0) }

    pub const fn bits(self) -> u8 { self.0 }

    /// Rebuild flags from disk, dropping bits this version does not know.
    pub const fn from_bits_truncate(bits: u8) -> Self { Self(bits & Self::ALL) }

    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub const fn stores_size(self) -> bool { self.contains(Self::STORE_SIZE) }

    pub const fn stores_timestamp(self) -> bool { self.contains(Self::STORE_TIMESTAMP) }
}

impl BitOr for QueueFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl BitOrAssign for QueueFlags {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

/// The sequence-number fields that change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    FirstValidDsn,
    FirstValidIsn,
    NextDsn,
    NextIsn,
}

impl HeaderField {
    const fn offset(self) -> u64 {
        match self {
            Self::FirstValidDsn => 12,
            Self::FirstValidIsn => 20,
            Self::NextDsn => 28,
            Self::NextIsn => 36,
        }
    }
}

/// A decoded copy of the fixed header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version:            u8,
    pub flags:              QueueFlags,
    pub max_data_segments:  u16,
    pub data_segment_size:  PageCount,
    pub index_segment_size: PageCount,
    pub first_valid_dsn:    SequenceNumber,
    pub first_valid_isn:    SequenceNumber,
    pub next_dsn:           SequenceNumber,
    pub next_isn:           SequenceNumber,
    pub anonymous_bookmark: SequenceNumber,
}

impl Header {
    /// A fresh header: every pointer at `0:0`.
    pub const fn new(
        flags: QueueFlags,
        max_data_segments: u16,
        data_segment_size: PageCount,
        index_segment_size: PageCount,
    ) -> Self {
        Self {
            version: HEADER_VERSION,
            flags,
            max_data_segments,
            data_segment_size,
            index_segment_size,
            first_valid_dsn: SequenceNumber::ZERO,
            first_valid_isn: SequenceNumber::ZERO,
            next_dsn: SequenceNumber::ZERO,
            next_isn: SequenceNumber::ZERO,
            anonymous_bookmark: SequenceNumber::ZERO,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[VERSION_OFFSET] = self.version;
        buf[FLAGS_OFFSET] = self.flags.bits();
        buf[MAX_DATA_SEGMENTS_OFFSET..DATA_SEGMENT_PAGES_OFFSET]
            .copy_from_slice(&self.max_data_segments.to_le_bytes());
        buf[DATA_SEGMENT_PAGES_OFFSET..INDEX_SEGMENT_PAGES_OFFSET]
            .copy_from_slice(&self.data_segment_size.pages().to_le_bytes());
        buf[INDEX_SEGMENT_PAGES_OFFSET..12]
            .copy_from_slice(&self.index_segment_size.pages().to_le_bytes());

        for (field, sn) in [
            (HeaderField::FirstValidDsn, self.first_valid_dsn),
            (HeaderField::FirstValidIsn, self.first_valid_isn),
            (HeaderField::NextDsn, self.next_dsn),
            (HeaderField::NextIsn, self.next_isn),
        ] {
            put_sn(&mut buf, field.offset(), sn);
        }
        put_sn(&mut buf, ANONYMOUS_BOOKMARK_OFFSET, self.anonymous_bookmark);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= HEADER_SIZE as usize,
            InvalidHeaderSnafu {
                reason: format!("{} bytes, need {HEADER_SIZE}", buf.len()),
            }
        );

        let version = buf[VERSION_OFFSET];
        ensure!(
            version == HEADER_VERSION,
            UnsupportedVersionSnafu {
                version,
                expected: HEADER_VERSION,
            }
        );

        let header = Self {
            version,
            flags: QueueFlags::from_bits_truncate(buf[FLAGS_OFFSET]),
            max_data_segments: u16::from_le_bytes([buf[2], buf[3]]),
            data_segment_size: PageCount::new(get_u32(buf, DATA_SEGMENT_PAGES_OFFSET)),
            index_segment_size: PageCount::new(get_u32(buf, INDEX_SEGMENT_PAGES_OFFSET)),
            first_valid_dsn: get_sn(buf, HeaderField::FirstValidDsn.offset()),
            first_valid_isn: get_sn(buf, HeaderField::FirstValidIsn.offset()),
            next_dsn: get_sn(buf, HeaderField::NextDsn.offset()),
            next_isn: get_sn(buf, HeaderField::NextIsn.offset()),
            anonymous_bookmark: get_sn(buf, ANONYMOUS_BOOKMARK_OFFSET),
        };

        ensure!(
            header.data_segment_size.pages() > 0 && header.index_segment_size.pages() > 0,
            InvalidHeaderSnafu {
                reason: "segment size of zero pages",
            }
        );
        Ok(header)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn put_sn(buf: &mut [u8], offset: u64, sn: SequenceNumber) {
    let offset = offset as usize;
    buf[offset..offset + 8].copy_from_slice(&sn.raw().to_le_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn get_sn(buf: &[u8], offset: u64) -> SequenceNumber {
    let offset = offset as usize;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    SequenceNumber::from_raw(u64::from_le_bytes(raw))
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

/// A mapped head file.
///
/// Keeps an id to slot-offset index of the bookmark table. The index is only
/// a cache: the table on disk is authoritative and other processes register
/// and free slots behind our back, so every miss and every mutation rescans.
pub struct HeadFile {
    mmap:      MemoryMappedFile,
    path:      PathBuf,
    bookmarks: RwLock<HashMap<Uuid, u64>>,
}

impl std::fmt::Debug for HeadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadFile")
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish_non_exhaustive()
    }
}

impl HeadFile {
    /// Create the head file at `path` and write `header` into it.
    ///
    /// The file is zero-filled, so the bookmark table starts out terminated.
    pub fn create(path: &Path, header: &Header, size: PageCount) -> Result<Self> {
        let mmap = MemoryMappedFile::create_rw(path, size.bytes()).context(MmapSnafu { path })?;
        mmap.update_region(0, &header.encode())
            .context(MmapSnafu { path })?;
        mmap.flush().context(MmapSnafu { path })?;

        info!(path = ?path, bytes = size.bytes(), "Created head file");
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            bookmarks: RwLock::new(HashMap::new()),
        })
    }

    /// Map an existing head file, validate its version and index the
    /// bookmark table.
    pub fn open(path: &Path) -> Result<Self> {
        let mmap = MemoryMappedFile::open_rw(path).context(MmapSnafu { path })?;
        ensure!(
            mmap.len() >= HEADER_SIZE,
            InvalidHeaderSnafu {
                reason: format!("head file is {} bytes", mmap.len()),
            }
        );

        let head = Self {
            mmap,
            path: path.to_path_buf(),
            bookmarks: RwLock::new(HashMap::new()),
        };
        let header = head.header()?;
        let registered = head.rescan()?;
        debug!(
            path = ?path,
            version = header.version,
            bookmarks = registered,
            "Opened head file"
        );
        Ok(head)
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn len(&self) -> u64 { self.mmap.len() }

    pub fn is_empty(&self) -> bool { self.mmap.len() == 0 }

    /// Decode the fixed fields as they are right now.
    pub fn header(&self) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.read(0, &mut buf)?;
        Header::decode(&buf)
    }

    pub fn get(&self, field: HeaderField) -> Result<SequenceNumber> { self.read_sn(field.offset()) }

    pub fn set(&self, field: HeaderField, sn: SequenceNumber) -> Result<()> {
        self.write_sn(field.offset(), sn)
    }

    /// Number of entries the bookmark table can hold.
    #[allow(clippy::cast_possible_truncation)]
    pub fn bookmark_capacity(&self) -> usize {
        (self.mmap.len().saturating_sub(HEADER_SIZE) / BOOKMARK_ENTRY_SIZE) as usize
    }

    /// Byte offset of `id`'s sequence number.
    ///
    /// The nil id is the anonymous bookmark and always resolves. A cached
    /// offset is only returned while the slot on disk still holds `id`.
    pub fn bookmark_offset(&self, id: Uuid) -> Result<u64> {
        if id.is_nil() {
            return Ok(ANONYMOUS_BOOKMARK_OFFSET);
        }
        let cached = self.bookmarks.read().get(&id).copied();
        if let Some(offset) = cached {
            if self.read_id(offset - BOOKMARK_ID_SIZE)? == id {
                return Ok(offset);
            }
            // Freed, and possibly reused, by another handle.
            debug!(bookmark = %id, offset, "Evicting stale bookmark slot");
            self.bookmarks.write().remove(&id);
        }
        // Possibly registered by another process since we last looked.
        self.rescan()?;
        self.bookmarks
            .read()
            .get(&id)
            .copied()
            .ok_or_else(|| BookmarkNotFoundSnafu { id }.build())
    }

    pub fn bookmark(&self, id: Uuid) -> Result<SequenceNumber> {
        self.read_sn(self.bookmark_offset(id)?)
    }

    pub fn set_bookmark(&self, id: Uuid, sn: SequenceNumber) -> Result<()> {
        self.write_sn(self.bookmark_offset(id)?, sn)
    }

    /// Write a new bookmark positioned at `start` into the first free slot.
    ///
    /// The caller holds the queue lock.
    pub fn register_bookmark(&self, start: SequenceNumber) -> Result<Uuid> {
        self.rescan()?;

        let capacity = self.bookmark_capacity();
        let mut entry = HEADER_SIZE;
        while entry + BOOKMARK_ENTRY_SIZE <= self.mmap.len() {
            let id = self.read_id(entry)?;
            if id.is_nil() || id == TOMBSTONE {
                let new_id = Uuid::new_v4();
                let sn_offset = entry + BOOKMARK_ID_SIZE;
                // Position first: a reader that sees the id must see a valid
                // position with it.
                self.write_sn(sn_offset, start)?;
                self.write(entry, new_id.as_bytes())?;
                self.bookmarks.write().insert(new_id, sn_offset);

                info!(bookmark = %new_id, start = %start, "Registered bookmark");
                return Ok(new_id);
            }
            entry += BOOKMARK_ENTRY_SIZE;
        }

        BookmarkTableFullSnafu { capacity }.fail()
    }

    /// Free `id`'s slot for reuse.
    ///
    /// The caller holds the queue lock.
    pub fn unregister_bookmark(&self, id: Uuid) -> Result<()> {
        ensure!(!id.is_nil() && id != TOMBSTONE, InvalidBookmarkSnafu { id });

        self.rescan()?;
        let sn_offset = self
            .bookmarks
            .write()
            .remove(&id)
            .ok_or_else(|| BookmarkNotFoundSnafu { id }.build())?;
        self.write(sn_offset - BOOKMARK_ID_SIZE, TOMBSTONE.as_bytes())?;

        info!(bookmark = %id, "Unregistered bookmark");
        Ok(())
    }

    /// Every bookmark with its position, the anonymous one first and the rest
    /// in table order.
    pub fn bookmarks(&self) -> Result<Vec<(Uuid, SequenceNumber)>> {
        let mut out = vec![(Uuid::nil(), self.read_sn(ANONYMOUS_BOOKMARK_OFFSET)?)];
        for (id, offset) in self.scan()? {
            out.push((id, self.read_sn(offset)?));
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<()> { self.mmap.flush().context(MmapSnafu { path: &self.path }) }

    /// Rebuild the id index from disk. Returns the number of live entries.
    fn rescan(&self) -> Result<usize> {
        let entries = self.scan()?;
        let count = entries.len();
        *self.bookmarks.write() = entries.into_iter().collect();
        Ok(count)
    }

    /// Live `(id, sn offset)` pairs up to the terminator or the end of the map.
    fn scan(&self) -> Result<Vec<(Uuid, u64)>> {
        let mut entries = Vec::new();
        let mut entry = HEADER_SIZE;
        while entry + BOOKMARK_ENTRY_SIZE <= self.mmap.len() {
            let id = self.read_id(entry)?;
            if id.is_nil() {
                break;
            }
            if id != TOMBSTONE {
                entries.push((id, entry + BOOKMARK_ID_SIZE));
            }
            entry += BOOKMARK_ENTRY_SIZE;
        }
        Ok(entries)
    }

    fn read_id(&self, offset: u64) -> Result<Uuid> {
        let mut raw = [0u8; 16];
        self.read(offset, &mut raw)?;
        Ok(Uuid::from_bytes(raw))
    }

    fn read_sn(&self, offset: u64) -> Result<SequenceNumber> {
        let mut raw = [0u8; 8];
        self.read(offset, &mut raw)?;
        Ok(SequenceNumber::from_raw(u64::from_le_bytes(raw)))
    }

    fn write_sn(&self, offset: u64, sn: SequenceNumber) -> Result<()> {
        self.write(offset, &sn.raw().to_le_bytes())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.mmap
            .read_into(offset, buf)
            .context(MmapSnafu { path: &self.path })
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.mmap
            .update_region(offset, data)
            .context(MmapSnafu { path: &self.path })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::QueueError;

    fn sample_header() -> Header {
        Header::new(
            QueueFlags::STORE_SIZE | QueueFlags::STORE_TIMESTAMP,
            8,
            PageCount::new(2560),
            PageCount::new(2560),
        )
    }

    fn create_head(pages: u32) -> (TempDir, HeadFile) {
        let temp_dir = TempDir::new().unwrap();
        let head = HeadFile::create(
            &temp_dir.path().join("head"),
            &sample_header(),
            PageCount::new(pages),
        )
        .unwrap();
        (temp_dir, head)
    }

    #[test]
    fn test_header_layout() {
        let mut header = sample_header();
        header.next_isn = SequenceNumber::new(1, 20);
        let buf = header.encode();

        assert_eq!(buf[0], HEADER_VERSION);
        assert_eq!(buf[1], 3);
        assert_eq!(&buf[2..4], &8u16.to_le_bytes());
        assert_eq!(&buf[4..8], &2560u32.to_le_bytes());
        assert_eq!(&buf[36..44], &SequenceNumber::new(1, 20).raw().to_le_bytes());
        assert_eq!(Header::decode(&buf).unwrap(), header);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut buf = sample_header().encode();
        buf[0] = 9;
        let err = Header::decode(&buf).unwrap_err();
        assert!(matches!(
            err,
            QueueError::UnsupportedVersion {
                version: 9,
                expected: 1
            }
        ));
    }

    #[test]
    fn test_flags() {
        let flags = QueueFlags::STORE_TIMESTAMP;
        assert!(!flags.stores_size());
        assert!(flags.stores_timestamp());
        assert_eq!(QueueFlags::from_bits_truncate(0xFF).bits(), 3);
        assert_eq!(QueueFlags::default(), QueueFlags::empty());
    }

    #[test]
    fn test_fields_write_through() {
        let (temp_dir, head) = create_head(1);
        head.set(HeaderField::NextDsn, SequenceNumber::new(0, 394))
            .unwrap();
        head.set(HeaderField::NextIsn, SequenceNumber::new(0, 20))
            .unwrap();
        drop(head);

        let head = HeadFile::open(&temp_dir.path().join("head")).unwrap();
        let header = head.header().unwrap();
        assert_eq!(header.next_dsn, SequenceNumber::new(0, 394));
        assert_eq!(header.next_isn, SequenceNumber::new(0, 20));
        assert_eq!(head.get(HeaderField::FirstValidIsn).unwrap(), SequenceNumber::ZERO);
    }

    #[test]
    fn test_anonymous_bookmark_always_resolves() {
        let (_temp_dir, head) = create_head(1);
        assert_eq!(head.bookmark_offset(Uuid::nil()).unwrap(), 44);

        head.set_bookmark(Uuid::nil(), SequenceNumber::new(0, 16))
            .unwrap();
        assert_eq!(head.header().unwrap().anonymous_bookmark, SequenceNumber::new(0, 16));
    }

    #[test]
    fn test_register_lookup_unregister() {
        let (_temp_dir, head) = create_head(1);

        let id = head.register_bookmark(SequenceNumber::new(0, 8)).unwrap();
        assert!(!id.is_nil());
        assert_eq!(head.bookmark_offset(id).unwrap(), HEADER_SIZE + 16);
        assert_eq!(head.bookmark(id).unwrap(), SequenceNumber::new(0, 8));

        let listed = head.bookmarks().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, Uuid::nil());
        assert_eq!(listed[1], (id, SequenceNumber::new(0, 8)));

        head.unregister_bookmark(id).unwrap();
        assert!(matches!(
            head.bookmark(id).unwrap_err(),
            QueueError::BookmarkNotFound { .. }
        ));
        assert_eq!(head.bookmarks().unwrap().len(), 1);
    }

    #[test]
    fn test_tombstoned_slot_is_reused() {
        let (_temp_dir, head) = create_head(1);

        let first = head.register_bookmark(SequenceNumber::ZERO).unwrap();
        let second = head.register_bookmark(SequenceNumber::ZERO).unwrap();
        let second_offset = head.bookmark_offset(second).unwrap();

        head.unregister_bookmark(first).unwrap();
        let third = head.register_bookmark(SequenceNumber::ZERO).unwrap();

        assert_eq!(head.bookmark_offset(third).unwrap(), HEADER_SIZE + 16);
        assert_eq!(head.bookmark_offset(second).unwrap(), second_offset);
    }

    #[test]
    fn test_reserved_ids_cannot_be_unregistered() {
        let (_temp_dir, head) = create_head(1);
        for id in [Uuid::nil(), TOMBSTONE] {
            assert!(matches!(
                head.unregister_bookmark(id).unwrap_err(),
                QueueError::InvalidBookmark { .. }
            ));
        }
    }

    #[test]
    fn test_table_full() {
        let (_temp_dir, head) = create_head(1);
        let capacity = head.bookmark_capacity();
        assert_eq!(capacity, 168);

        for _ in 0..capacity {
            head.register_bookmark(SequenceNumber::ZERO).unwrap();
        }
        let err = head.register_bookmark(SequenceNumber::ZERO).unwrap_err();
        assert!(matches!(err, QueueError::BookmarkTableFull { capacity: 168 }));
        assert_eq!(head.bookmarks().unwrap().len(), capacity + 1);
    }

    #[test]
    fn test_registration_seen_by_other_mapping() {
        let (temp_dir, head) = create_head(1);
        let other = HeadFile::open(&temp_dir.path().join("head")).unwrap();

        let id = head.register_bookmark(SequenceNumber::new(0, 40)).unwrap();
        assert_eq!(other.bookmark(id).unwrap(), SequenceNumber::new(0, 40));

        other.set_bookmark(id, SequenceNumber::new(0, 48)).unwrap();
        assert_eq!(head.bookmark(id).unwrap(), SequenceNumber::new(0, 48));
    }

    #[test]
    fn test_freed_slot_reused_elsewhere_is_not_followed() {
        let (temp_dir, head) = create_head(1);
        let other = HeadFile::open(&temp_dir.path().join("head")).unwrap();

        let stale = head.register_bookmark(SequenceNumber::new(0, 40)).unwrap();
        assert_eq!(other.bookmark(stale).unwrap(), SequenceNumber::new(0, 40));

        head.unregister_bookmark(stale).unwrap();
        let reused = head.register_bookmark(SequenceNumber::new(0, 80)).unwrap();
        assert_eq!(
            head.bookmark_offset(reused).unwrap(),
            HEADER_SIZE + BOOKMARK_ID_SIZE
        );

        assert!(matches!(
            other.bookmark(stale).unwrap_err(),
            QueueError::BookmarkNotFound { .. }
        ));
        assert!(matches!(
            other
                .set_bookmark(stale, SequenceNumber::new(0, 8))
                .unwrap_err(),
            QueueError::BookmarkNotFound { .. }
        ));
        assert_eq!(other.bookmark(reused).unwrap(), SequenceNumber::new(0, 80));
        assert_eq!(head.bookmark(reused).unwrap(), SequenceNumber::new(0, 80));
    }
}
