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

//! Hot copy of a live queue.
//!
//! The head is copied first. Everything the copied head publishes was fully
//! written before the head was read, so the segments copied afterwards hold
//! at least that much. Bytes written after the head copy are beyond its
//! pointers and are ignored when the copy is opened.

use std::path::{Path, PathBuf};

use snafu::{ResultExt, ensure};
use tracing::{debug, info};

use crate::{
    Queue, Result,
    error::{BackupTargetMissingSnafu, IoSnafu},
    path::{SegmentKind, head_file_path, segment_file_name},
};

/// Files written by [`Queue::backup_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub files: Vec<PathBuf>,
    pub bytes: u64,
}

impl Queue {
    /// Copy the head file, then the index segments from the first valid
    /// through the active one, then the data segments likewise, into
    /// `target`.
    ///
    /// `target` must be an existing directory. Files already there are
    /// overwritten.
    pub fn backup_to(&self, target: impl AsRef<Path>) -> Result<BackupReport> {
        let target = target.as_ref();
        ensure!(target.is_dir(), BackupTargetMissingSnafu { path: target });

        self.flush()?;
        let mut report = BackupReport::default();
        copy(&self.head_path(), &head_file_path(target), &mut report)?;

        // Bounds come from the live head, read after the copy above: they
        // cover at least the segments the copied head refers to.
        let header = self.header()?;
        for (kind, first, active) in [
            (
                SegmentKind::Index,
                header.first_valid_isn.segment(),
                header.next_isn.segment(),
            ),
            (
                SegmentKind::Data,
                header.first_valid_dsn.segment(),
                header.next_dsn.segment(),
            ),
        ] {
            for segment in first..=active {
                let name = segment_file_name(kind, segment);
                let source = self.path().join(&name);
                if !source.exists() {
                    // Reserved past but never written, e.g. after a crash.
                    debug!(path = ?source, "Skipping missing segment");
                    continue;
                }
                copy(&source, &target.join(&name), &mut report)?;
            }
        }

        info!(
            source = ?self.path(),
            target = ?target,
            files = report.files.len(),
            bytes = report.bytes,
            "Backup complete"
        );
        Ok(report)
    }
}

fn copy(from: &Path, to: &Path, report: &mut BackupReport) -> Result<()> {
    let bytes = std::fs::copy(from, to).context(IoSnafu { path: from })?;
    report.files.push(to.to_path_buf());
    report.bytes += bytes;
    Ok(())
}
