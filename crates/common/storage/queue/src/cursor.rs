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

//! Read positions.

use uuid::Uuid;

use crate::{Queue, Result, sequence::SequenceNumber};

/// Where a [`Tailer`](crate::Tailer) reads next.
pub trait ReaderCursor: Send {
    /// ISN of the next record to read.
    fn current(&self) -> Result<SequenceNumber>;

    /// Published boundary: records at or past it are not readable yet.
    fn max(&self) -> Result<SequenceNumber>;

    /// Record that the record at `isn` has been consumed. Returns the new
    /// position.
    fn advance(&mut self, isn: SequenceNumber) -> Result<SequenceNumber>;
}

/// Record width and index segment size, for stepping over records with the
/// writer's rollover rule.
#[derive(Debug, Clone, Copy)]
struct Stride {
    width:    u64,
    capacity: u64,
}

impl Stride {
    fn of(queue: &Queue) -> Self {
        Self {
            width:    queue.index_layout().width(),
            capacity: queue.index_segment_size().bytes(),
        }
    }

    const fn next(self, isn: SequenceNumber) -> SequenceNumber {
        isn.next_record(self.width, self.capacity)
    }
}

/// A cursor stored in a head file bookmark. Survives restarts.
#[derive(Debug, Clone)]
pub struct DurableCursor {
    queue:    Queue,
    bookmark: Uuid,
    stride:   Stride,
}

impl DurableCursor {
    /// Follow `bookmark`, which must be registered. `Uuid::nil()` follows the
    /// anonymous bookmark.
    pub fn new(queue: Queue, bookmark: Uuid) -> Result<Self> {
        // Fails early on an unknown id.
        queue.bookmark_sn(bookmark)?;
        Ok(Self {
            stride: Stride::of(&queue),
            queue,
            bookmark,
        })
    }

    pub const fn bookmark(&self) -> Uuid { self.bookmark }
}

impl ReaderCursor for DurableCursor {
    fn current(&self) -> Result<SequenceNumber> { self.queue.bookmark_sn(self.bookmark) }

    fn max(&self) -> Result<SequenceNumber> { self.queue.next_available_isn() }

    fn advance(&mut self, isn: SequenceNumber) -> Result<SequenceNumber> {
        let next = self.stride.next(isn);
        self.queue.set_bookmark(self.bookmark, next)?;
        Ok(next)
    }
}

/// A cursor held in memory only.
#[derive(Debug, Clone)]
pub struct EphemeralCursor {
    queue:    Queue,
    position: SequenceNumber,
    stride:   Stride,
}

impl EphemeralCursor {
    /// Start at `start`, or at the queue's first valid ISN.
    pub fn new(queue: Queue, start: Option<SequenceNumber>) -> Result<Self> {
        let position = match start {
            Some(isn) => isn,
            None => queue.first_valid_isn()?,
        };
        Ok(Self {
            stride: Stride::of(&queue),
            queue,
            position,
        })
    }
}

impl ReaderCursor for EphemeralCursor {
    fn current(&self) -> Result<SequenceNumber> { Ok(self.position) }

    fn max(&self) -> Result<SequenceNumber> { self.queue.next_available_isn() }

    fn advance(&mut self, isn: SequenceNumber) -> Result<SequenceNumber> {
        self.position = self.stride.next(isn);
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{QueueBuilder, QueueError, page::PageCount};

    fn queue(temp_dir: &TempDir) -> Queue {
        QueueBuilder::new(temp_dir.path())
            .index_segment_size(PageCount::new(1))
            .store_size_in_index(true)
            .create()
            .unwrap()
    }

    #[test]
    fn test_durable_cursor_persists_in_bookmark() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue(&temp_dir);
        let id = queue.register_bookmark(None).unwrap();

        let mut cursor = DurableCursor::new(queue.clone(), id).unwrap();
        assert_eq!(cursor.current().unwrap(), SequenceNumber::ZERO);
        assert_eq!(
            cursor.advance(SequenceNumber::ZERO).unwrap(),
            SequenceNumber::new(0, 12)
        );
        assert_eq!(queue.bookmark_sn(id).unwrap(), SequenceNumber::new(0, 12));
        assert_eq!(queue.bookmark_sn(Uuid::nil()).unwrap(), SequenceNumber::ZERO);
    }

    #[test]
    fn test_durable_cursor_rejects_unknown_bookmark() {
        let temp_dir = TempDir::new().unwrap();
        let err = DurableCursor::new(queue(&temp_dir), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, QueueError::BookmarkNotFound { .. }));
    }

    #[test]
    fn test_advance_rolls_like_the_writer() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue(&temp_dir);
        // Three pages hold exactly 1024 twelve-byte records.
        let last = SequenceNumber::new(0, 3 * 4096 - 12);

        let mut cursor = EphemeralCursor::new(queue, Some(last)).unwrap();
        assert_eq!(cursor.current().unwrap(), last);
        assert_eq!(cursor.advance(last).unwrap(), SequenceNumber::new(1, 0));
    }

    #[test]
    fn test_ephemeral_cursor_starts_at_first_valid() {
        let temp_dir = TempDir::new().unwrap();
        let queue = queue(&temp_dir);
        queue.set_next_available_isn(SequenceNumber::new(0, 24)).unwrap();

        let cursor = EphemeralCursor::new(queue.clone(), None).unwrap();
        assert_eq!(cursor.current().unwrap(), SequenceNumber::ZERO);
        assert_eq!(cursor.max().unwrap(), SequenceNumber::new(0, 24));
        // Never touches the head file.
        assert_eq!(queue.bookmark_sn(Uuid::nil()).unwrap(), SequenceNumber::ZERO);
    }
}
