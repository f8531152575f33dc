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

use std::{io, path::PathBuf, time::Duration};

use snafu::Snafu;
use uuid::Uuid;

use crate::sequence::SequenceNumber;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// A queue head file is already present at the target path.
    #[snafu(display("Queue already exists at {}", path.display()))]
    QueueExists { path: PathBuf },

    /// Opening a queue whose head file is absent.
    #[snafu(display("Queue head file not found at {}", path.display()))]
    HeadMissing { path: PathBuf },

    #[snafu(display("Unsupported queue format version {version}, expected {expected}"))]
    UnsupportedVersion { version: u8, expected: u8 },

    #[snafu(display("Invalid queue header: {reason}"))]
    InvalidHeader { reason: String },

    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// Filesystem I/O failure.
    #[snafu(display("IO error on {}: {source}", path.display()))]
    Io { path: PathBuf, source: io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed on {}: {source}", path.display()))]
    Mmap {
        path:   PathBuf,
        source: mmap_io::MmapIoError,
    },

    /// A payload whose slot cannot fit into an empty data segment.
    #[snafu(display("Payload of {size} bytes exceeds segment capacity of {capacity} bytes"))]
    PayloadTooLarge { size: u64, capacity: u64 },

    /// A window was requested past the end of a segment. The caller sized the
    /// slot wrong before reserving it.
    #[snafu(display(
        "Window for {size} bytes at {address} does not fit into a segment of {capacity} bytes"
    ))]
    WindowOutOfBounds {
        address:  SequenceNumber,
        size:     u64,
        capacity: u64,
    },

    #[snafu(display("Window at {address} is mapped read-only"))]
    ReadOnlyWindow { address: SequenceNumber },

    /// Retry budget exhausted while opening or creating a segment.
    #[snafu(display("Segment {} unavailable after {attempts} attempts", path.display()))]
    SegmentUnavailable { path: PathBuf, attempts: u32 },

    #[snafu(display("Timed out after {timeout:?} waiting for lock {}", path.display()))]
    LockTimeout { path: PathBuf, timeout: Duration },

    #[snafu(display("Bookmark {id} is not registered"))]
    BookmarkNotFound { id: Uuid },

    #[snafu(display("Bookmark id {id} is reserved"))]
    InvalidBookmark { id: Uuid },

    #[snafu(display("Bookmark table is full ({capacity} entries)"))]
    BookmarkTableFull { capacity: usize },

    /// Synchronous reads are not allowed while the poller owns the cursor.
    #[snafu(display("Tailer is polling in the background"))]
    TailerRunning,

    /// A callback panicked in the poller; the cursor went down with it.
    #[snafu(display("Tailer poller panicked; the tailer is unusable"))]
    TailerPoisoned,

    #[snafu(display("Backup target {} does not exist", path.display()))]
    BackupTargetMissing { path: PathBuf },

    #[snafu(display("Internal error: {message}"))]
    Internal { message: String },
}

/// Result type for queue operations.
pub type Result<T, E = QueueError> = std::result::Result<T, E>;
