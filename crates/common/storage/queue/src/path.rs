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

use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::{Result, error::IoSnafu};

/// Name of the queue metadata file.
pub const HEAD_FILE_NAME: &str = "head";

/// Lock file serializing appenders and bookmark registration.
pub const QUEUE_LOCK_FILE_NAME: &str = "head.lock";

/// Lock file serializing segment creation.
pub const SEGMENT_LOCK_FILE_NAME: &str = "segments.lock";

/// The two independently numbered segment chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Data,
    Index,
}

impl SegmentKind {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Index => "index",
        }
    }
}

/// Returns path to the head file: `base/head`.
pub fn head_file_path<P: AsRef<Path>>(base: P) -> PathBuf { base.as_ref().join(HEAD_FILE_NAME) }

/// Returns path to the appender lock file: `base/head.lock`.
pub fn queue_lock_path<P: AsRef<Path>>(base: P) -> PathBuf {
    base.as_ref().join(QUEUE_LOCK_FILE_NAME)
}

/// Returns path to the segment creation lock guarding `segment`'s directory.
pub fn segment_lock_path(segment: &Path) -> PathBuf {
    segment
        .parent()
        .map_or_else(|| PathBuf::from(SEGMENT_LOCK_FILE_NAME), |dir| {
            dir.join(SEGMENT_LOCK_FILE_NAME)
        })
}

/// Generates a segment file name: `NNNNNNNNNN.data` or `NNNNNNNNNN.index`.
pub fn segment_file_name(kind: SegmentKind, segment: u16) -> String {
    format!("{segment:010}.{}", kind.extension())
}

/// Returns full path to a segment file: `base/NNNNNNNNNN.<kind>`.
pub fn segment_file_path<P: AsRef<Path>>(base: P, kind: SegmentKind, segment: u16) -> PathBuf {
    base.as_ref().join(segment_file_name(kind, segment))
}

/// Parses a segment number back out of a file name produced by
/// [`segment_file_name`].
pub fn parse_segment_file_name(name: &str, kind: SegmentKind) -> Option<u16> {
    let stem = name.strip_suffix(kind.extension())?.strip_suffix('.')?;
    if stem.len() != 10 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Lists the segment numbers of one kind present under `base`, ascending.
pub fn scan_segments<P: AsRef<Path>>(base: P, kind: SegmentKind) -> Result<Vec<u16>> {
    let base = base.as_ref();
    let mut segments = Vec::new();

    if !base.exists() {
        return Ok(segments);
    }

    for entry in std::fs::read_dir(base).context(IoSnafu { path: base })? {
        let entry = entry.context(IoSnafu { path: base })?;
        if let Some(n) = entry
            .file_name()
            .to_str()
            .and_then(|name| parse_segment_file_name(name, kind))
        {
            segments.push(n);
        }
    }

    segments.sort_unstable();
    Ok(segments)
}
