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

//! Message reader (tailer) for consuming from the queue.
//!
//! The [`Tailer`] follows a [`ReaderCursor`] through the index stream. It
//! supports:
//! - Synchronous reads via [`dequeue_one`](Tailer::dequeue_one), which reads
//!   the record at the cursor and advances it
//! - Random access via [`dequeue`](Tailer::dequeue) and
//!   [`read`](Tailer::read), which leave the cursor alone
//! - Background polling via [`start`](Tailer::start) and
//!   [`stop`](Tailer::stop)
//!
//! A record is readable once its ISN is below the published next available
//! ISN. The writer publishes only after the slot and the index record are
//! fully written, so nothing here needs a lock.

use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, RecvTimeoutError, Sender, TryRecvError};
use snafu::{ResultExt, ensure};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    Queue, Result,
    config::{CursorKind, ReaderSettings},
    cursor::{DurableCursor, EphemeralCursor, ReaderCursor},
    error::{IoSnafu, TailerPoisonedSnafu, TailerRunningSnafu},
    file::Access,
    index::{IndexLayout, MAX_INDEX_WIDTH},
    message::{Message, SLOT_LENGTH_SIZE},
    path::SegmentKind,
    sequence::SequenceNumber,
    view::MemoryView,
};

/// Where the payload length comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthSource {
    IndexRecord,
    SlotPrefix,
}

/// Everything a read needs. Moves into the poller thread while it runs.
struct TailerCore {
    cursor: Box<dyn ReaderCursor>,
    index:  MemoryView,
    data:   MemoryView,
    layout: IndexLayout,
    length: LengthSource,
}

impl TailerCore {
    fn new(queue: &Queue, cursor: Box<dyn ReaderCursor>, settings: &ReaderSettings) -> Self {
        let layout = queue.index_layout();
        Self {
            cursor,
            index: MemoryView::new(
                queue.path(),
                SegmentKind::Index,
                queue.index_segment_size(),
                settings.view_size,
                Access::ReadOnly,
                settings.retry,
            ),
            data: MemoryView::new(
                queue.path(),
                SegmentKind::Data,
                queue.data_segment_size(),
                settings.view_size,
                Access::ReadOnly,
                settings.retry,
            ),
            layout,
            length: if layout.stores_size() {
                LengthSource::IndexRecord
            } else {
                LengthSource::SlotPrefix
            },
        }
    }

    /// The record at the cursor, without advancing. `None` when caught up.
    fn peek(&mut self) -> Result<Option<Message>> {
        let current = self.cursor.current()?;
        if current >= self.cursor.max()? {
            return Ok(None);
        }
        self.read(current).map(Some)
    }

    fn take_next(&mut self) -> Result<Option<Message>> {
        let message = self.peek()?;
        if let Some(message) = &message {
            self.cursor.advance(message.isn)?;
        }
        Ok(message)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read(&mut self, isn: SequenceNumber) -> Result<Message> {
        let width = self.layout.width() as usize;
        let mut raw = [0u8; MAX_INDEX_WIDTH];
        self.index.read(isn, &mut raw[..width])?;
        let record = self.layout.decode(&raw[..width]);

        let len = match (self.length, record.size) {
            (LengthSource::IndexRecord, Some(size)) => size,
            _ => self.data.read_u32(record.dsn)?,
        };
        let payload = self
            .data
            .read_bytes(record.dsn.advance(SLOT_LENGTH_SIZE), u64::from(len))?;

        Ok(Message {
            isn,
            dsn: record.dsn,
            timestamp: record.timestamp.map(DateTime::<Utc>::from_timestamp_nanos),
            payload,
        })
    }

    fn close(&mut self) {
        self.index.close();
        self.data.close();
    }
}

struct Poller {
    stop:   Sender<()>,
    handle: JoinHandle<TailerCore>,
}

/// A reader for consuming messages from the queue.
///
/// Tailers never block each other or the writers. Each one owns its windows,
/// so use one per thread.
pub struct Tailer {
    queue:         Queue,
    core:          Option<TailerCore>,
    poller:        Option<Poller>,
    poll_interval: Duration,
    poisoned:      bool,
}

impl std::fmt::Debug for Tailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tailer")
            .field("queue", &self.queue.path())
            .field("running", &self.is_running())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Tailer {
    pub(crate) fn new(queue: Queue, settings: ReaderSettings) -> Result<Self> {
        let cursor: Box<dyn ReaderCursor> = match settings.cursor {
            CursorKind::Durable { bookmark } => {
                Box::new(DurableCursor::new(queue.clone(), bookmark)?)
            }
            CursorKind::Anonymous => Box::new(DurableCursor::new(queue.clone(), Uuid::nil())?),
            CursorKind::Ephemeral { start } => Box::new(EphemeralCursor::new(queue.clone(), start)?),
        };
        Ok(Self::with_cursor(queue, cursor, &settings))
    }

    pub(crate) fn with_cursor(
        queue: Queue,
        cursor: Box<dyn ReaderCursor>,
        settings: &ReaderSettings,
    ) -> Self {
        Self {
            core: Some(TailerCore::new(&queue, cursor, settings)),
            poller: None,
            poll_interval: settings.poll_interval,
            poisoned: false,
            queue,
        }
    }

    /// Read the record at the cursor and advance past it.
    ///
    /// Returns `Ok(None)` when the cursor has caught up with the writers; the
    /// cursor is not moved in that case.
    pub fn dequeue_one(&mut self) -> Result<Option<Bytes>> {
        Ok(self.next_message()?.map(|m| m.payload))
    }

    /// Like [`dequeue_one`](Self::dequeue_one), with the record's metadata.
    pub fn next_message(&mut self) -> Result<Option<Message>> { self.core_mut()?.take_next() }

    /// Payload of the record at `isn`. The cursor does not move.
    ///
    /// `isn` must address a published record.
    pub fn dequeue(&mut self, isn: SequenceNumber) -> Result<Bytes> {
        Ok(self.read(isn)?.payload)
    }

    /// The record at `isn`. The cursor does not move.
    pub fn read(&mut self, isn: SequenceNumber) -> Result<Message> { self.core_mut()?.read(isn) }

    /// ISN the next [`dequeue_one`](Self::dequeue_one) will read.
    pub fn position(&self) -> Result<SequenceNumber> {
        ensure!(!self.poisoned, TailerPoisonedSnafu);
        match &self.core {
            Some(core) => core.cursor.current(),
            None => TailerRunningSnafu.fail(),
        }
    }

    pub const fn is_running(&self) -> bool { self.poller.is_some() }

    /// Start polling in a background thread.
    ///
    /// Every `poll_interval` the thread drains all published records, calling
    /// `callback` once per record and advancing the cursor after each call.
    /// Synchronous reads fail with
    /// [`TailerRunning`](crate::QueueError::TailerRunning) until
    /// [`stop`](Self::stop). Starting a running tailer does nothing.
    ///
    /// A panicking callback takes the cursor down with the thread: `stop` and
    /// every later call fail with
    /// [`TailerPoisoned`](crate::QueueError::TailerPoisoned).
    pub fn start<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(Message) + Send + 'static,
    {
        ensure!(!self.poisoned, TailerPoisonedSnafu);
        if self.poller.is_some() {
            return Ok(());
        }
        let Some(core) = self.core.take() else {
            return TailerRunningSnafu.fail();
        };

        let (stop, stop_rx) = channel::bounded::<()>(0);
        let interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name("queue-tailer-poller".into())
            .spawn(move || poll(core, callback, &stop_rx, interval))
            .context(IoSnafu {
                path: self.queue.path(),
            })?;

        info!(path = ?self.queue.path(), ?interval, "Tailer polling started");
        self.poller = Some(Poller { stop, handle });
        Ok(())
    }

    /// Stop polling and wait for the thread to finish its current record.
    ///
    /// Stopping a tailer that is not running does nothing.
    pub fn stop(&mut self) -> Result<()> {
        let Some(Poller { stop, handle }) = self.poller.take() else {
            return Ok(());
        };
        drop(stop);

        let Ok(core) = handle.join() else {
            self.poisoned = true;
            error!(path = ?self.queue.path(), "Tailer poller panicked");
            return TailerPoisonedSnafu.fail();
        };
        self.core = Some(core);

        info!(path = ?self.queue.path(), "Tailer polling stopped");
        Ok(())
    }

    pub const fn queue(&self) -> &Queue { &self.queue }

    fn core_mut(&mut self) -> Result<&mut TailerCore> {
        ensure!(!self.poisoned, TailerPoisonedSnafu);
        ensure!(self.poller.is_none(), TailerRunningSnafu);
        match &mut self.core {
            Some(core) => Ok(core),
            None => TailerRunningSnafu.fail(),
        }
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Failed to stop tailer poller");
        }
        if let Some(core) = self.core.as_mut() {
            core.close();
        }
    }
}

/// Poller loop. Returns the core so the tailer can be read synchronously
/// again.
///
/// The stop signal is the sender being dropped. It is checked on every tick
/// and between records, never during a callback.
fn poll<F>(
    mut core: TailerCore,
    mut callback: F,
    stop: &channel::Receiver<()>,
    interval: Duration,
) -> TailerCore
where
    F: FnMut(Message),
{
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let mut dispatched = 0u64;
        loop {
            if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                debug!(dispatched, "Poller stopping mid-drain");
                return core;
            }
            match core.peek() {
                Ok(Some(message)) => {
                    let isn = message.isn;
                    callback(message);
                    if let Err(e) = core.cursor.advance(isn) {
                        error!(isn = %isn, error = %e, "Failed to advance cursor");
                        break;
                    }
                    dispatched += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read from queue");
                    break;
                }
            }
        }
        if dispatched > 0 {
            debug!(dispatched, "Poller drained records");
        }
    }
    core
}
