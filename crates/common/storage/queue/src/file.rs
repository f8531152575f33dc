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

//! Segment file access shared by racing threads and processes.
//!
//! Any appender may be the first to touch a new segment, so creation is
//! contended. [`open_or_create`] resolves the race with a double-checked
//! create under the directory's segment lock, and every open tolerates a file
//! that another process has created but not yet sized.

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::{
    Result,
    config::RetryPolicy,
    error::{IoSnafu, SegmentUnavailableSnafu},
    lock::{DEFAULT_LOCK_TIMEOUT, GlobalLock},
    page::PageCount,
    path::segment_lock_path,
};

/// How a segment file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// An open, fully sized segment file.
///
/// Windows are mapped from it on demand; the file handle itself is never
/// read or written directly.
#[derive(Debug)]
pub struct SegmentFile {
    file:   File,
    path:   PathBuf,
    len:    u64,
    access: Access,
}

impl SegmentFile {
    pub const fn file(&self) -> &File { &self.file }

    pub fn path(&self) -> &Path { &self.path }

    pub const fn len(&self) -> u64 { self.len }

    pub const fn is_empty(&self) -> bool { self.len == 0 }

    pub const fn access(&self) -> Access { self.access }
}

/// Open a segment for writing, creating it with `capacity` if it is absent.
///
/// A fully sized file is opened without locking. Anything else (absent, or
/// present but short) is settled by [`create_locked`]. Failed rounds sleep
/// per `retry`.
pub fn open_or_create(path: &Path, capacity: PageCount, retry: &RetryPolicy) -> Result<SegmentFile> {
    for attempt in 0..retry.attempts {
        if path.exists()
            && let Some(file) = try_open(path, Access::ReadWrite, capacity.bytes())?
        {
            return Ok(file);
        }
        match create_locked(path, capacity) {
            Ok(file) => return Ok(file),
            Err(e) => warn!(path = ?path, attempt, error = %e, "Segment creation failed"),
        }
        thread::sleep(retry.backoff(attempt));
    }

    SegmentUnavailableSnafu {
        path,
        attempts: retry.attempts,
    }
    .fail()
}

/// Open a segment that must already exist.
///
/// A missing file fails immediately: segments are created and sized under
/// the segment lock before any header pointer names them, so an absent file
/// is never a creation in progress. A file that is present but not yet sized
/// to `min_len`, or briefly inaccessible, is retried per `retry`.
pub fn open_existing(
    path: &Path,
    access: Access,
    min_len: u64,
    retry: &RetryPolicy,
) -> Result<SegmentFile> {
    for attempt in 0..retry.attempts {
        if !path.exists() {
            return Err(io::Error::from(io::ErrorKind::NotFound)).context(IoSnafu { path });
        }
        if let Some(file) = try_open(path, access, min_len)? {
            return Ok(file);
        }
        thread::sleep(retry.backoff(attempt));
    }

    SegmentUnavailableSnafu {
        path,
        attempts: retry.attempts,
    }
    .fail()
}

/// Create and size a segment while holding the directory's segment lock.
///
/// The existence check is repeated under the lock: whoever got there first
/// already created the file, and this call just opens it. A file left shorter
/// than `capacity` by a creator that died mid-way is extended.
pub fn create_locked(path: &Path, capacity: PageCount) -> Result<SegmentFile> {
    let _lock = GlobalLock::acquire(&segment_lock_path(path), DEFAULT_LOCK_TIMEOUT)?;

    let existed = path.exists();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .context(IoSnafu { path })?;

    let len = file.metadata().context(IoSnafu { path })?.len();
    if len < capacity.bytes() {
        if existed {
            warn!(path = ?path, len, "Extending short segment left by an interrupted creator");
        }
        file.set_len(capacity.bytes()).context(IoSnafu { path })?;
        info!(path = ?path, bytes = capacity.bytes(), "Created segment");
    } else {
        debug!(path = ?path, "Segment created concurrently, opening it");
    }

    Ok(SegmentFile {
        file,
        path: path.to_path_buf(),
        len: capacity.bytes().max(len),
        access: Access::ReadWrite,
    })
}

/// One open attempt. `Ok(None)` means "transient, try again".
fn try_open(path: &Path, access: Access, min_len: u64) -> Result<Option<SegmentFile>> {
    let opened = match access {
        Access::ReadOnly => File::open(path),
        Access::ReadWrite => OpenOptions::new().read(true).write(true).open(path),
    };

    let file = match opened {
        Ok(file) => file,
        Err(e) if is_transient(&e) => {
            debug!(path = ?path, error = %e, "Segment not accessible yet");
            return Ok(None);
        }
        Err(e) => return Err(e).context(IoSnafu { path }),
    };

    let len = file.metadata().context(IoSnafu { path })?.len();
    if len == 0 || len < min_len {
        debug!(path = ?path, len, min_len, "Segment not sized yet");
        return Ok(None);
    }

    Ok(Some(SegmentFile {
        file,
        path: path.to_path_buf(),
        len,
        access,
    }))
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::QueueError;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            scale:    Duration::from_millis(1),
        }
    }

    #[test]
    fn test_create_sizes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0000000000.data");

        let file = open_or_create(&path, PageCount::new(2), &fast_retry()).unwrap();
        assert_eq!(file.len(), 8192);
        assert_eq!(file.access(), Access::ReadWrite);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8192);
    }

    #[test]
    fn test_open_existing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0000000000.data");
        create_locked(&path, PageCount::new(1)).unwrap();

        let file = open_existing(&path, Access::ReadOnly, 4096, &fast_retry()).unwrap();
        assert_eq!(file.len(), 4096);
        assert_eq!(file.path(), path);
    }

    #[test]
    fn test_open_missing_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0000000009.data");

        let err = open_existing(&path, Access::ReadOnly, 0, &RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, QueueError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_unsized_file_exhausts_retries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0000000000.index");
        File::create(&path).unwrap();

        let err = open_existing(&path, Access::ReadOnly, 4096, &fast_retry()).unwrap_err();
        assert!(matches!(
            err,
            QueueError::SegmentUnavailable { attempts: 5, .. }
        ));
    }

    #[test]
    fn test_create_repairs_short_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0000000000.data");
        File::create(&path).unwrap();

        let file = create_locked(&path, PageCount::new(1)).unwrap();
        assert_eq!(file.len(), 4096);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn test_concurrent_open_or_create() {
        let temp_dir = TempDir::new().unwrap();
        let path = Arc::new(temp_dir.path().join("0000000003.data"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    open_or_create(&path, PageCount::new(4), &RetryPolicy::default())
                        .map(|f| f.len())
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap().unwrap(), 4 * 4096);
        }
        assert_eq!(std::fs::metadata(path.as_ref()).unwrap().len(), 4 * 4096);
    }
}
