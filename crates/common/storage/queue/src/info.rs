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

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    Queue, Result,
    index::IndexLayout,
    page::PageCount,
    path::{SegmentKind, scan_segments},
    sequence::SequenceNumber,
};

/// Whether the data chain is meant to be bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMode {
    Unbounded,
    /// A bound is recorded. It is reported, not enforced.
    Circular,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookmarkInfo {
    pub id:        Uuid,
    pub anonymous: bool,
    pub position:  SequenceNumber,
    /// Published items not read yet.
    pub depth:     u64,
}

/// Point-in-time report of a queue's header and bookmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub path:                       PathBuf,
    pub version:                    u8,
    pub growth:                     GrowthMode,
    pub max_data_segments:          u16,
    pub data_segment_size:          PageCount,
    pub index_segment_size:         PageCount,
    pub index_layout:               IndexLayout,
    pub index_record_width:         u64,
    pub active_data_segment:        u16,
    pub active_index_segment:       u16,
    pub data_segment_free_bytes:    u64,
    pub index_segment_free_entries: u64,
    /// Segment files present in the directory, including write-ahead ones.
    pub data_segments_on_disk:      usize,
    pub index_segments_on_disk:     usize,
    pub total_items:                u64,
    pub first_valid_dsn:            SequenceNumber,
    pub first_valid_isn:            SequenceNumber,
    pub next_available_dsn:         SequenceNumber,
    pub next_available_isn:         SequenceNumber,
    pub bookmarks:                  Vec<BookmarkInfo>,
}

impl Queue {
    /// Snapshot the header and every bookmark.
    ///
    /// Fields are read one by one while writers may be running, so the
    /// snapshot is not atomic.
    pub fn info(&self) -> Result<QueueInfo> {
        let header = self.header()?;
        let layout = self.index_layout();
        let width = layout.width();
        let data_capacity = header.data_segment_size.bytes();
        let index_capacity = header.index_segment_size.bytes();
        let total_items = self.items_before(header.next_isn);

        let bookmarks = self
            .bookmarks()?
            .into_iter()
            .map(|(id, position)| BookmarkInfo {
                id,
                anonymous: id.is_nil(),
                position,
                depth: total_items.saturating_sub(self.items_before(position)),
            })
            .collect();

        Ok(QueueInfo {
            path: self.path().to_path_buf(),
            version: header.version,
            growth: if header.max_data_segments == 0 {
                GrowthMode::Unbounded
            } else {
                GrowthMode::Circular
            },
            max_data_segments: header.max_data_segments,
            data_segment_size: header.data_segment_size,
            index_segment_size: header.index_segment_size,
            index_layout: layout,
            index_record_width: width,
            active_data_segment: header.next_dsn.segment(),
            active_index_segment: header.next_isn.segment(),
            data_segment_free_bytes: data_capacity.saturating_sub(header.next_dsn.offset()),
            index_segment_free_entries: index_capacity.saturating_sub(header.next_isn.offset())
                / width,
            data_segments_on_disk: scan_segments(self.path(), SegmentKind::Data)?.len(),
            index_segments_on_disk: scan_segments(self.path(), SegmentKind::Index)?.len(),
            total_items,
            first_valid_dsn: header.first_valid_dsn,
            first_valid_isn: header.first_valid_isn,
            next_available_dsn: header.next_dsn,
            next_available_isn: header.next_isn,
            bookmarks,
        })
    }
}
