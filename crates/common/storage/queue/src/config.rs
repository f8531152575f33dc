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

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use uuid::Uuid;

use crate::{
    header::QueueFlags,
    lock::{DEFAULT_LOCK_TIMEOUT, LockMode},
    page::PageCount,
    sequence::SequenceNumber,
};

/// Default segment capacity: 2560 pages, 10MB.
pub const DEFAULT_SEGMENT_PAGES: u32 = 2560;

/// Default window size: 25600 pages, 100MB. Clipped to the segment size.
pub const DEFAULT_VIEW_PAGES: u32 = 25600;

/// Default head file size. Bounds the bookmark table to 680 entries.
pub const DEFAULT_HEAD_PAGES: u32 = 4;

/// Default interval between poller ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Parameters fixed when a queue is created.
#[derive(Debug, Clone, SmartDefault)]
pub struct QueueConfig {
    #[default(_code = "PathBuf::from(\"./queue_data\")")]
    pub base_path:            PathBuf,
    #[default(_code = "PageCount::new(DEFAULT_SEGMENT_PAGES)")]
    pub data_segment_size:    PageCount,
    #[default(_code = "PageCount::new(DEFAULT_SEGMENT_PAGES)")]
    pub index_segment_size:   PageCount,
    pub flags:                QueueFlags,
    /// 0 means unbounded growth.
    pub max_data_segments:    u16,
    /// Data segments to create up front, counting segment 0.
    pub write_ahead_segments: u16,
    #[default(_code = "PageCount::new(DEFAULT_HEAD_PAGES)")]
    pub head_size:            PageCount,
}

/// Bounded retry with logarithmic backoff for segment races.
///
/// Attempt `n` (0-based) sleeps `scale * log10(n + 1)`, so the first retry is
/// immediate and later ones grow slowly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct RetryPolicy {
    #[default = 40]
    pub attempts: u32,
    #[default(Duration::from_millis(250))]
    #[serde(with = "humantime_serde")]
    pub scale:    Duration,
}

impl RetryPolicy {
    #[allow(clippy::cast_precision_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.scale.mul_f64(f64::from(attempt + 1).log10())
    }
}

/// Settings of one [`Appender`](crate::Appender).
#[derive(Debug, Clone, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct WriterSettings {
    #[builder(default)]
    pub lock_mode:    LockMode,
    /// Wait limit for the cross-process lock. Zero waits forever.
    #[builder(default = DEFAULT_LOCK_TIMEOUT)]
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
    /// Default data window size.
    #[builder(default = PageCount::new(DEFAULT_VIEW_PAGES))]
    pub view_size:    PageCount,
    #[builder(default)]
    pub retry:        RetryPolicy,
}

impl Default for WriterSettings {
    fn default() -> Self { Self::builder().build() }
}

/// Where a tailer keeps its read position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorKind {
    /// A bookmark persisted in the head file. `Uuid::nil()` is the anonymous
    /// bookmark every queue has.
    Durable { bookmark: Uuid },
    /// An in-memory position starting at `start`, or at the first valid ISN.
    Ephemeral { start: Option<SequenceNumber> },
    #[default]
    Anonymous,
}

/// Settings of one [`Tailer`](crate::Tailer).
#[derive(Debug, Clone, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct ReaderSettings {
    #[builder(default)]
    pub cursor:        CursorKind,
    /// Default data window size.
    #[builder(default = PageCount::new(DEFAULT_VIEW_PAGES))]
    pub view_size:     PageCount,
    #[builder(default = DEFAULT_POLL_INTERVAL)]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[builder(default)]
    pub retry:         RetryPolicy,
}

impl Default for ReaderSettings {
    fn default() -> Self { Self::builder().build() }
}
