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

//! Message writer (appender) for producing to the queue.
//!
//! An append goes through four steps:
//! 1. Size the slot (4-byte length prefix + payload).
//! 2. Under the writer lock, reserve the slot by advancing the next available
//!    DSN, rolling to the next data segment if the slot does not fit.
//! 3. Outside the lock, write the slot. Nobody else can reserve the same
//!    bytes and no reader can see them until they are indexed.
//! 4. Under the lock again, reserve an index record the same way, write it,
//!    then advance the next available ISN. That last write publishes the
//!    item.
//!
//! A crash between 3 and 4 leaves bytes nothing ever points at. They are
//! simply skipped.

use chrono::Utc;
use snafu::ensure;
use tracing::{trace, warn};

use crate::{
    Queue, Result,
    config::WriterSettings,
    error::PayloadTooLargeSnafu,
    file::Access,
    index::{IndexLayout, IndexRecord},
    lock::WriterLock,
    message::{SLOT_LENGTH_SIZE, slot_size},
    path::{SegmentKind, queue_lock_path},
    sequence::SequenceNumber,
    view::MemoryView,
};

/// A writer for appending messages to the queue.
///
/// Owns its windows, so it is not shared between threads: give each thread
/// its own appender. Appenders of one queue, in any process, coordinate
/// through the lock mode in their [`WriterSettings`].
#[derive(Debug)]
pub struct Appender {
    queue:          Queue,
    lock:           WriterLock,
    data:           MemoryView,
    index:          MemoryView,
    layout:         IndexLayout,
    data_capacity:  u64,
    index_capacity: u64,
    max_payload:    u64,
}

impl Appender {
    pub(crate) fn new(queue: Queue, settings: &WriterSettings) -> Self {
        let data_size = queue.data_segment_size();
        let index_size = queue.index_segment_size();
        let layout = queue.index_layout();

        let data = MemoryView::new(
            queue.path(),
            SegmentKind::Data,
            data_size,
            settings.view_size,
            Access::ReadWrite,
            settings.retry,
        );
        let index = MemoryView::new(
            queue.path(),
            SegmentKind::Index,
            index_size,
            settings.view_size,
            Access::ReadWrite,
            settings.retry,
        );
        let lock = WriterLock::new(
            settings.lock_mode,
            queue_lock_path(queue.path()),
            settings.lock_timeout,
        );

        Self {
            lock,
            data,
            index,
            layout,
            data_capacity: data_size.bytes(),
            index_capacity: index_size.bytes(),
            max_payload: (data_size.bytes() - SLOT_LENGTH_SIZE).min(u64::from(u32::MAX)),
            queue,
        }
    }

    /// Append one payload. Returns the ISN that addresses it.
    ///
    /// # Errors
    ///
    /// [`PayloadTooLarge`](crate::QueueError::PayloadTooLarge) if the slot
    /// cannot fit into an empty data segment, or a lock or I/O failure.
    #[allow(clippy::cast_possible_truncation)]
    pub fn append(&mut self, payload: impl AsRef<[u8]>) -> Result<SequenceNumber> {
        let payload = payload.as_ref();
        let len = payload.len() as u64;
        ensure!(
            len <= self.max_payload,
            PayloadTooLargeSnafu {
                size:     len,
                capacity: self.data_capacity,
            }
        );
        let slot = slot_size(len);

        let dsn = self.reserve_data(slot)?;
        self.data
            .write(dsn, &[&(len as u32).to_le_bytes(), payload])?;

        let record = IndexRecord {
            dsn,
            size: Some(len as u32),
            timestamp: self
                .layout
                .stores_timestamp()
                .then(|| Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)),
        };
        let isn = self.publish(&record)?;

        trace!(isn = %isn, dsn = %dsn, len, "Appended");
        Ok(isn)
    }

    /// Append several payloads one after another.
    ///
    /// Not atomic: each payload is published on its own and a failure leaves
    /// the earlier ones in the queue.
    pub fn append_batch<I>(&mut self, payloads: I) -> Result<Vec<SequenceNumber>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        payloads.into_iter().map(|p| self.append(p)).collect()
    }

    /// Flush the current windows to disk.
    pub fn flush(&self) -> Result<()> {
        self.data.flush()?;
        self.index.flush()?;
        self.queue.flush()
    }

    pub const fn queue(&self) -> &Queue { &self.queue }

    fn reserve_data(&self, slot: u64) -> Result<SequenceNumber> {
        let (queue, capacity) = (&self.queue, self.data_capacity);
        self.lock.run(|| {
            let next = queue.next_available_dsn()?;
            let dsn = next.with_rollover(slot, capacity);
            if dsn.segment() != next.segment() {
                let max = queue.max_data_segments();
                if max > 0 && dsn.segment() >= max {
                    warn!(
                        segment = dsn.segment(),
                        max_data_segments = max,
                        "Data segments beyond the configured bound, old segments are not reclaimed"
                    );
                }
            }
            queue.set_next_available_dsn(dsn.advance(slot))?;
            Ok(dsn)
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn publish(&mut self, record: &IndexRecord) -> Result<SequenceNumber> {
        let Self {
            queue,
            lock,
            index,
            layout,
            index_capacity,
            ..
        } = self;
        let width = layout.width();
        let encoded = layout.encode(record);

        lock.run(|| {
            let isn = queue
                .next_available_isn()?
                .with_rollover(width, *index_capacity);
            index.write(isn, &[&encoded[..width as usize]])?;
            queue.set_next_available_isn(isn.advance(width))?;
            Ok(isn)
        })
    }
}
