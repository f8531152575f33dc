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

//! A persistent, append-only, segmented queue over memory-mapped files.
//!
//! Writers and readers in any number of threads and processes share one
//! directory. There is no broker: the head file carries the published
//! pointers and the reader bookmarks, and the segment files carry the data.

pub mod appender;
mod backup;
pub mod builder;
pub mod config;
pub mod cursor;
pub mod error;
pub mod file;
pub mod header;
pub mod index;
mod info;
pub mod lock;
pub mod message;
pub mod page;
pub mod path;
mod queue;
pub mod sequence;
pub mod tailer;
pub mod view;

pub use appender::Appender;
pub use backup::BackupReport;
pub use builder::QueueBuilder;
pub use config::{CursorKind, QueueConfig, ReaderSettings, RetryPolicy, WriterSettings};
pub use cursor::{DurableCursor, EphemeralCursor, ReaderCursor};
pub use error::{QueueError, Result};
pub use header::QueueFlags;
pub use index::IndexLayout;
pub use info::{BookmarkInfo, GrowthMode, QueueInfo};
pub use lock::LockMode;
pub use message::Message;
pub use page::PageCount;
pub use queue::Queue;
pub use sequence::SequenceNumber;
pub use tailer::Tailer;
