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

//! Queue handle and lifecycle.
//!
//! The [`Queue`] is the entry point of the library. It owns the mapping of the
//! head file and hands out:
//! - [`Appender`]s, which reserve, write and publish items
//! - [`Tailer`]s, which follow a bookmark and read what was published
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/path/to/queue").create()?;
//!
//! let mut appender = queue.create_appender(WriterSettings::default());
//! let isn = appender.append(b"hello")?;
//!
//! let mut tailer = queue.create_tailer(ReaderSettings::default())?;
//! while let Some(payload) = tailer.dequeue_one()? {
//!     println!("{payload:?}");
//! }
//! ```
//!
//! A `Queue` is a cheap handle: clones share one head mapping. Separate
//! processes open their own handle and meet in the files.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::{ResultExt, ensure};
use tracing::info;
use uuid::Uuid;

use crate::{
    QueueConfig, Result,
    appender::Appender,
    config::{ReaderSettings, WriterSettings},
    cursor::ReaderCursor,
    error::{HeadMissingSnafu, InvalidConfigSnafu, IoSnafu, QueueExistsSnafu},
    file,
    header::{BOOKMARK_ENTRY_SIZE, HEADER_SIZE, HeadFile, Header, HeaderField, QueueFlags},
    index::IndexLayout,
    lock::{DEFAULT_LOCK_TIMEOUT, GlobalLock},
    message::SLOT_LENGTH_SIZE,
    page::PageCount,
    path::{SegmentKind, head_file_path, queue_lock_path, segment_file_path},
    sequence::SequenceNumber,
    tailer::Tailer,
};

#[derive(Debug)]
struct QueueShared {
    base:   PathBuf,
    head:   HeadFile,
    /// Fields fixed at creation. The moving pointers are always read from
    /// `head`.
    header: Header,
    layout: IndexLayout,
}

/// A persistent, segmented, append-only queue.
#[derive(Debug, Clone)]
pub struct Queue {
    shared: Arc<QueueShared>,
}

impl Queue {
    /// Create a new queue in `config.base_path`.
    ///
    /// Fails with [`QueueExists`](crate::QueueError::QueueExists) if a head
    /// file is already there.
    pub(crate) fn create(config: QueueConfig) -> Result<Self> {
        validate(&config)?;
        let base = config.base_path;
        std::fs::create_dir_all(&base).context(IoSnafu { path: &base })?;

        let head_path = head_file_path(&base);
        // Held across the existence check and the head write so two creators
        // cannot both succeed, and openers never see a half-written head.
        let _lock = GlobalLock::acquire(&queue_lock_path(&base), DEFAULT_LOCK_TIMEOUT)?;
        ensure!(!head_path.exists(), QueueExistsSnafu { path: &base });

        let layout = IndexLayout::from_flags(config.flags);
        let index_segment_size = config.index_segment_size.aligned_to(layout.width());
        let header = Header::new(
            config.flags,
            config.max_data_segments,
            config.data_segment_size,
            index_segment_size,
        );

        file::create_locked(
            &segment_file_path(&base, SegmentKind::Index, 0),
            index_segment_size,
        )?;
        for segment in 0..config.write_ahead_segments.max(1) {
            file::create_locked(
                &segment_file_path(&base, SegmentKind::Data, segment),
                config.data_segment_size,
            )?;
        }
        let head = HeadFile::create(&head_path, &header, config.head_size)?;

        info!(
            path = ?base,
            data_segment_pages = config.data_segment_size.pages(),
            index_segment_pages = index_segment_size.pages(),
            index_width = layout.width(),
            max_data_segments = config.max_data_segments,
            "Queue created"
        );

        Ok(Self {
            shared: Arc::new(QueueShared {
                base,
                head,
                header,
                layout,
            }),
        })
    }

    /// Open the queue at `base`.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        let head_path = head_file_path(&base);
        ensure!(head_path.exists(), HeadMissingSnafu { path: &head_path });

        let head = {
            let _lock = GlobalLock::acquire(&queue_lock_path(&base), DEFAULT_LOCK_TIMEOUT)?;
            HeadFile::open(&head_path)?
        };
        let header = head.header()?;
        let layout = IndexLayout::from_flags(header.flags);

        info!(
            path = ?base,
            next_isn = %header.next_isn,
            next_dsn = %header.next_dsn,
            "Queue opened"
        );

        Ok(Self {
            shared: Arc::new(QueueShared {
                base,
                head,
                header,
                layout,
            }),
        })
    }

    /// Open the queue at `base` and return an appender for it.
    pub fn open_writer(base: impl Into<PathBuf>, settings: WriterSettings) -> Result<Appender> {
        Ok(Self::open(base)?.create_appender(settings))
    }

    /// Open the queue at `base` and return a tailer for it.
    pub fn open_reader(base: impl Into<PathBuf>, settings: ReaderSettings) -> Result<Tailer> {
        Self::open(base)?.create_tailer(settings)
    }

    #[must_use]
    pub fn create_appender(&self, settings: WriterSettings) -> Appender {
        Appender::new(self.clone(), &settings)
    }

    /// Create a tailer with the cursor `settings` ask for.
    ///
    /// A durable cursor on a bookmark that is not registered fails with
    /// [`BookmarkNotFound`](crate::QueueError::BookmarkNotFound).
    pub fn create_tailer(&self, settings: ReaderSettings) -> Result<Tailer> {
        Tailer::new(self.clone(), settings)
    }

    /// Create a tailer driven by a caller-supplied cursor.
    #[must_use]
    pub fn create_tailer_with_cursor(
        &self,
        cursor: Box<dyn ReaderCursor>,
        settings: &ReaderSettings,
    ) -> Tailer {
        Tailer::with_cursor(self.clone(), cursor, settings)
    }

    pub fn path(&self) -> &Path { &self.shared.base }

    pub fn head_path(&self) -> PathBuf { head_file_path(&self.shared.base) }

    pub fn data_segment_path(&self, segment: u16) -> PathBuf {
        segment_file_path(&self.shared.base, SegmentKind::Data, segment)
    }

    pub fn index_segment_path(&self, segment: u16) -> PathBuf {
        segment_file_path(&self.shared.base, SegmentKind::Index, segment)
    }

    pub fn version(&self) -> u8 { self.shared.header.version }

    pub fn flags(&self) -> QueueFlags { self.shared.header.flags }

    pub fn index_layout(&self) -> IndexLayout { self.shared.layout }

    pub fn data_segment_size(&self) -> PageCount { self.shared.header.data_segment_size }

    pub fn index_segment_size(&self) -> PageCount { self.shared.header.index_segment_size }

    /// 0 means unbounded.
    pub fn max_data_segments(&self) -> u16 { self.shared.header.max_data_segments }

    /// Current header, pointers included.
    pub fn header(&self) -> Result<Header> { self.shared.head.header() }

    pub fn first_valid_dsn(&self) -> Result<SequenceNumber> {
        self.shared.head.get(HeaderField::FirstValidDsn)
    }

    pub fn first_valid_isn(&self) -> Result<SequenceNumber> {
        self.shared.head.get(HeaderField::FirstValidIsn)
    }

    pub fn next_available_dsn(&self) -> Result<SequenceNumber> {
        self.shared.head.get(HeaderField::NextDsn)
    }

    /// The published write position. Items before it are visible to readers.
    pub fn next_available_isn(&self) -> Result<SequenceNumber> {
        self.shared.head.get(HeaderField::NextIsn)
    }

    pub(crate) fn set_next_available_dsn(&self, dsn: SequenceNumber) -> Result<()> {
        self.shared.head.set(HeaderField::NextDsn, dsn)
    }

    pub(crate) fn set_next_available_isn(&self, isn: SequenceNumber) -> Result<()> {
        self.shared.head.set(HeaderField::NextIsn, isn)
    }

    /// Position of bookmark `id`. `Uuid::nil()` is the anonymous bookmark.
    pub fn bookmark_sn(&self, id: Uuid) -> Result<SequenceNumber> { self.shared.head.bookmark(id) }

    pub fn set_bookmark(&self, id: Uuid, isn: SequenceNumber) -> Result<()> {
        self.shared.head.set_bookmark(id, isn)
    }

    /// Move the anonymous bookmark to `isn`.
    pub fn rewind(&self, isn: SequenceNumber) -> Result<()> {
        info!(isn = %isn, "Rewinding anonymous bookmark");
        self.shared.head.set_bookmark(Uuid::nil(), isn)
    }

    /// Register a new bookmark at `start`, or at the first valid ISN.
    pub fn register_bookmark(&self, start: Option<SequenceNumber>) -> Result<Uuid> {
        let start = match start {
            Some(sn) => sn,
            None => self.first_valid_isn()?,
        };
        let _lock = GlobalLock::acquire(&queue_lock_path(&self.shared.base), DEFAULT_LOCK_TIMEOUT)?;
        self.shared.head.register_bookmark(start)
    }

    pub fn unregister_bookmark(&self, id: Uuid) -> Result<()> {
        let _lock = GlobalLock::acquire(&queue_lock_path(&self.shared.base), DEFAULT_LOCK_TIMEOUT)?;
        self.shared.head.unregister_bookmark(id)
    }

    /// All bookmarks, the anonymous one first.
    pub fn bookmarks(&self) -> Result<Vec<(Uuid, SequenceNumber)>> { self.shared.head.bookmarks() }

    /// Number of items before `isn` in the index stream.
    pub fn items_before(&self, isn: SequenceNumber) -> u64 {
        let width = self.shared.layout.width();
        let per_segment = self.shared.header.index_segment_size.bytes() / width;
        u64::from(isn.segment()) * per_segment + isn.offset() / width
    }

    /// Items ever published.
    pub fn total_items(&self) -> Result<u64> {
        Ok(self.items_before(self.next_available_isn()?))
    }

    /// Items bookmark `id` has not consumed yet.
    pub fn depth(&self, id: Uuid) -> Result<u64> {
        let published = self.total_items()?;
        let consumed = self.items_before(self.bookmark_sn(id)?);
        Ok(published.saturating_sub(consumed))
    }

    pub fn flush(&self) -> Result<()> { self.shared.head.flush() }
}

fn validate(config: &QueueConfig) -> Result<()> {
    ensure!(
        config.data_segment_size.bytes() > SLOT_LENGTH_SIZE,
        InvalidConfigSnafu {
            reason: "data segment size must be at least one page",
        }
    );
    ensure!(
        config.index_segment_size.pages() > 0,
        InvalidConfigSnafu {
            reason: "index segment size must be at least one page",
        }
    );
    ensure!(
        config.head_size.bytes() >= HEADER_SIZE + BOOKMARK_ENTRY_SIZE,
        InvalidConfigSnafu {
            reason: "head file must hold the header and one bookmark",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{QueueBuilder, QueueError};

    #[test]
    fn test_create_lays_out_files() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("q");
        let queue = QueueBuilder::new(&base)
            .data_segment_size(PageCount::new(1))
            .index_segment_size(PageCount::new(1))
            .write_ahead_segments(3)
            .create()
            .unwrap();

        assert!(queue.head_path().exists());
        assert!(queue.index_segment_path(0).exists());
        for segment in 0..3 {
            assert!(queue.data_segment_path(segment).exists());
        }
        assert!(!queue.data_segment_path(3).exists());
        assert_eq!(queue.version(), 1);
        assert_eq!(queue.next_available_isn().unwrap(), SequenceNumber::ZERO);
    }

    #[test]
    fn test_create_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        QueueBuilder::new(temp_dir.path()).create().unwrap();

        let err = QueueBuilder::new(temp_dir.path()).create().unwrap_err();
        assert!(matches!(err, QueueError::QueueExists { .. }));
    }

    #[test]
    fn test_open_without_head_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = Queue::open(temp_dir.path()).unwrap_err();
        assert!(matches!(err, QueueError::HeadMissing { .. }));
    }

    #[test]
    fn test_index_segment_aligned_to_record_width() {
        let temp_dir = TempDir::new().unwrap();
        let queue = QueueBuilder::new(temp_dir.path())
            .index_segment_size(PageCount::new(1))
            .store_size_in_index(true)
            .create()
            .unwrap();

        // 4096 is not a multiple of 12; three pages are.
        assert_eq!(queue.index_layout().width(), 12);
        assert_eq!(queue.index_segment_size().pages(), 3);
        assert_eq!(
            std::fs::metadata(queue.index_segment_path(0)).unwrap().len(),
            3 * 4096
        );
    }

    #[test]
    fn test_reopen_keeps_settings() {
        let temp_dir = TempDir::new().unwrap();
        QueueBuilder::new(temp_dir.path())
            .data_segment_size(PageCount::new(8))
            .store_timestamp_in_index(true)
            .max_data_segments(4)
            .create()
            .unwrap();

        let queue = Queue::open(temp_dir.path()).unwrap();
        assert_eq!(queue.data_segment_size().pages(), 8);
        assert_eq!(queue.index_layout(), IndexLayout::DsnTimestamp);
        assert_eq!(queue.max_data_segments(), 4);
    }

    #[test]
    fn test_bookmarks_and_depth() {
        let temp_dir = TempDir::new().unwrap();
        let queue = QueueBuilder::new(temp_dir.path()).create().unwrap();
        let id = queue.register_bookmark(None).unwrap();

        queue.set_next_available_isn(SequenceNumber::new(0, 40)).unwrap();
        assert_eq!(queue.total_items().unwrap(), 5);
        assert_eq!(queue.depth(id).unwrap(), 5);
        assert_eq!(queue.depth(Uuid::nil()).unwrap(), 5);

        queue.set_bookmark(id, SequenceNumber::new(0, 16)).unwrap();
        assert_eq!(queue.depth(id).unwrap(), 3);

        queue.rewind(SequenceNumber::new(0, 32)).unwrap();
        assert_eq!(queue.depth(Uuid::nil()).unwrap(), 1);

        let listed = queue.bookmarks().unwrap();
        assert_eq!(listed.len(), 2);
        queue.unregister_bookmark(id).unwrap();
        assert!(queue.depth(id).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let err = QueueBuilder::new(temp_dir.path())
            .data_segment_size(PageCount::new(0))
            .create()
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidConfig { .. }));
    }
}
